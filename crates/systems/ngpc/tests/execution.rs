mod common;

use common::{boot, demo_program, run, Program};
use emu_core::frameskip::{AudioBufferStatus, FrameSkipMode, SkipPolicy, FRAMESKIP_MAX};
use emu_core::System;
use emu_ngpc::input::{BUTTON_A, BUTTON_RIGHT};
use emu_ngpc::CYCLES_PER_FRAME;

/// Longest instruction or interrupt entry the test programs can produce
const MAX_STEP_COST: u64 = 64;

fn scripted_input(frame: usize) -> u8 {
    match frame % 7 {
        0 => BUTTON_A,
        3 => BUTTON_A | BUTTON_RIGHT,
        _ => 0,
    }
}

#[test]
fn test_runs_are_deterministic() {
    let image = demo_program().cartridge(0x8_0000);
    let mut a = boot(&image);
    let mut b = boot(&image);

    let first = run(&mut a, 30, scripted_input);
    let second = run(&mut b, 30, scripted_input);
    assert_eq!(first, second);
    assert_eq!(a.cycles(), b.cycles());
}

#[test]
fn test_demo_program_output() {
    let image = demo_program().cartridge(0x8_0000);
    let mut sys = boot(&image);
    let out = run(&mut sys, 3, |_| 0);
    let last = out.last().unwrap();

    // Red background in RGB565 over the whole screen
    assert!(last.pixels.iter().all(|&p| p == 0xF800));
    // DAC replaces the PSG: 0xC0 and 0x40 sit 0x40 either side of the midpoint
    assert_eq!(&last.audio[..2], &[0x40 << 6, -(0x40 << 6)]);
    assert_eq!(last.audio.len(), 735 * 2);
}

#[test]
fn test_cycle_budget_is_conserved() {
    let image = demo_program().cartridge(0x8_0000);
    let mut sys = boot(&image);

    let frames = 240u64;
    for n in 1..=frames {
        let result = sys.step_frame().unwrap();
        assert!((result.cycles as u64) < CYCLES_PER_FRAME as u64 + MAX_STEP_COST);

        // Overshoot is carried, so the total never drifts past one step
        let expected = n * CYCLES_PER_FRAME as u64;
        assert!(sys.cycles() >= expected);
        assert!(sys.cycles() - expected < MAX_STEP_COST);
    }
}

#[test]
fn test_skip_ceiling_under_sustained_underrun() {
    let image = demo_program().cartridge(0x8_0000);
    let mut sys = boot(&image);
    sys.set_audio_status(AudioBufferStatus {
        active: true,
        occupancy: 0,
        underrun_likely: true,
    });
    let policy = SkipPolicy {
        mode: FrameSkipMode::Auto,
        threshold: 33,
    };

    let mut run_length = 0;
    let mut paints = 0;
    for _ in 0..300 {
        let result = sys.run_frame(CYCLES_PER_FRAME, &policy);
        if result.painted {
            paints += 1;
            run_length = 0;
        } else {
            run_length += 1;
            assert!(run_length <= FRAMESKIP_MAX);
        }
        // Audio keeps flowing whether or not the frame painted
        assert_eq!(sys.audio().len(), 735 * 2);
    }
    assert!(paints >= 4);
}

#[test]
fn test_skipping_does_not_change_machine_state() {
    let image = demo_program().cartridge(0x8_0000);
    let mut painted = boot(&image);
    let mut skipped = boot(&image);
    skipped.set_audio_status(AudioBufferStatus {
        active: true,
        occupancy: 0,
        underrun_likely: true,
    });
    let auto = SkipPolicy {
        mode: FrameSkipMode::Auto,
        threshold: 33,
    };

    for _ in 0..20 {
        painted.run_frame(CYCLES_PER_FRAME, &SkipPolicy::default());
        skipped.run_frame(CYCLES_PER_FRAME, &auto);
        assert_eq!(painted.audio(), skipped.audio());
    }
    assert_eq!(painted.cycles(), skipped.cycles());
    assert_eq!(painted.debug_state()["pc"], skipped.debug_state()["pc"]);
}

#[test]
fn test_undefined_opcode_is_not_fatal() {
    // 0x01 has no instruction; execution continues past it
    let image = Program::new().ei(0).spin().cartridge(0x1000);
    let mut patched = image.clone();
    patched[0x40] = 0x01;
    patched[0x41] = 0x00;
    let mut sys = boot(&patched);
    for _ in 0..5 {
        sys.step_frame().unwrap();
    }
    assert!(sys.cycles() >= 5 * CYCLES_PER_FRAME as u64);
}
