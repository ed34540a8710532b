use super::*;

/// 64 KiB of RAM mirrored across the 24-bit space, plus scripted device hooks
struct TestBus {
    ram: Vec<u8>,
    pending: Option<InterruptRequest>,
    acknowledged: Vec<u8>,
    dma_requests: Vec<usize>,
    dma_ends: Vec<usize>,
    ticked: u64,
    trap_enabled: bool,
    render_skip: bool,
}

impl TestBus {
    fn new() -> Self {
        Self {
            ram: vec![0; 0x10000],
            pending: None,
            acknowledged: Vec::new(),
            dma_requests: Vec::new(),
            dma_ends: Vec::new(),
            ticked: 0,
            trap_enabled: false,
            render_skip: false,
        }
    }
}

impl MemoryTlcs900h for TestBus {
    fn read8(&mut self, addr: u32) -> u8 {
        self.ram[(addr & 0xFFFF) as usize]
    }

    fn write8(&mut self, addr: u32, val: u8) {
        self.ram[(addr & 0xFFFF) as usize] = val;
    }

    fn tick(&mut self, cycles: u32) {
        self.ticked += cycles as u64;
    }

    fn set_render_skip(&mut self, skip: bool) {
        self.render_skip = skip;
    }

    fn pending_interrupt(&mut self, mask: u8) -> Option<InterruptRequest> {
        self.pending.filter(|r| r.level != 0 && r.level >= mask)
    }

    fn acknowledge_interrupt(&mut self, vector: u8) {
        self.pending = None;
        self.acknowledged.push(vector);
    }

    fn take_dma_request(&mut self) -> Option<usize> {
        self.dma_requests.pop()
    }

    fn raise_dma_end(&mut self, channel: usize) {
        self.dma_ends.push(channel);
    }

    fn hle_trap(&mut self, regs: &mut Registers) -> Option<u32> {
        if !self.trap_enabled {
            return None;
        }
        regs.set_reg8(1, 0x5A);
        Some(10)
    }
}

const ORIGIN: u32 = 0x1000;

fn cpu_with(program: &[u8]) -> CpuTlcs900h<TestBus> {
    let mut cpu = CpuTlcs900h::new(TestBus::new());
    let start = ORIGIN as usize;
    cpu.memory.ram[start..start + program.len()].copy_from_slice(program);
    cpu.regs.pc = ORIGIN;
    cpu.regs.set_xsp(0x8000);
    cpu
}

fn width_prefix(base: u8, width: Width) -> u8 {
    base + 0x10 * width.index() as u8
}

#[test]
fn test_nop() {
    let mut cpu = cpu_with(&[0x00]);
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);
    assert_eq!(cpu.memory.ticked, 2);
}

#[test]
fn test_load_immediates() {
    // LD A,0x42 / LD BC,0x1234 / LD XHL,0x00123456
    let mut cpu = cpu_with(&[0x21, 0x42, 0x31, 0x34, 0x12, 0x43, 0x56, 0x34, 0x12, 0x00]);
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.reg8(1), 0x42);
    assert_eq!(cpu.regs.reg16(1), 0x1234);
    assert_eq!(cpu.regs.reg32(3), 0x0012_3456);
}

#[test]
fn test_add_immediate_sets_flags() {
    // LD A,0xFF / ADD A,1
    let mut cpu = cpu_with(&[0x21, 0xFF, 0xC9, 0xC8, 0x01]);
    cpu.step();
    assert_eq!(cpu.step(), 3);
    assert_eq!(cpu.regs.reg8(1), 0);
    assert!(cpu.regs.flag(FLAG_Z));
    assert!(cpu.regs.flag(FLAG_C));
}

#[test]
fn test_memory_load_and_store() {
    // LD XHL,0x2000 / LD A,0x77 / LD (XHL),A / LD B,(XHL)
    let mut cpu = cpu_with(&[
        0x43, 0x00, 0x20, 0x00, 0x00, 0x21, 0x77, 0xB3, 0x41, 0x83, 0x22,
    ]);
    for _ in 0..4 {
        cpu.step();
    }
    assert_eq!(cpu.memory.ram[0x2000], 0x77);
    assert_eq!(cpu.regs.reg8(2), 0x77);
}

#[test]
fn test_push_pop_word() {
    // LD BC,0xBEEF / PUSH BC / POP DE
    let mut cpu = cpu_with(&[0x31, 0xEF, 0xBE, 0x29, 0x4A]);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.xsp(), 0x7FFE);
    assert_eq!(cpu.memory.ram[0x7FFE], 0xEF);
    cpu.step();
    assert_eq!(cpu.regs.reg16(2), 0xBEEF);
    assert_eq!(cpu.regs.xsp(), 0x8000);
}

#[test]
fn test_call_and_ret() {
    // CALL 0x1010 ... at 0x1010: RET
    let mut program = vec![0x1C, 0x10, 0x10];
    program.resize(0x10, 0x00);
    program.push(0x0E);
    let mut cpu = cpu_with(&program);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.pc, 0x1010);
    assert_eq!(cpu.regs.xsp(), 0x7FFC);
    assert_eq!(cpu.step(), 9);
    assert_eq!(cpu.regs.pc, ORIGIN + 3);
}

#[test]
fn test_djnz_loop() {
    // LD B,3 / loop: DJNZ B,loop
    let mut cpu = cpu_with(&[0x22, 0x03, 0xCA, 0x1C, 0xFD]);
    cpu.step();
    assert_eq!(cpu.step(), 7 + 4);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
    assert_eq!(cpu.step(), 7 + 4);
    assert_eq!(cpu.step(), 7);
    assert_eq!(cpu.regs.reg8(2), 0);
    assert_eq!(cpu.regs.pc, ORIGIN + 5);
}

#[test]
fn test_jr_taken_and_not_taken() {
    // JR Z,+2 with Z clear, then JR T,-4
    let mut cpu = cpu_with(&[0x66, 0x02, 0x68, 0xFC]);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.pc, ORIGIN);
}

#[test]
fn test_ldir_copies_block() {
    let mut cpu = cpu_with(&[0x83, 0x11]);
    cpu.memory.ram[0x2000..0x2004].copy_from_slice(&[1, 2, 3, 4]);
    cpu.regs.set_reg32(3, 0x2000); // XHL source
    cpu.regs.set_reg32(2, 0x3000); // XDE destination
    cpu.regs.set_reg16(1, 4); // BC count
    assert_eq!(cpu.step(), 10 + 3 * 10);
    assert_eq!(&cpu.memory.ram[0x3000..0x3004], &[1, 2, 3, 4]);
    assert_eq!(cpu.regs.reg16(1), 0);
    assert!(!cpu.regs.flag(FLAG_V));
}

#[test]
fn test_cpir_stops_on_match() {
    let mut cpu = cpu_with(&[0x83, 0x15]);
    cpu.memory.ram[0x2000..0x2004].copy_from_slice(&[9, 8, 7, 6]);
    cpu.regs.set_reg32(3, 0x2000);
    cpu.regs.set_reg16(1, 4);
    cpu.regs.set_reg8(1, 7);
    cpu.step();
    assert!(cpu.regs.flag(FLAG_Z));
    assert_eq!(cpu.regs.reg32(3), 0x2003);
    assert_eq!(cpu.regs.reg16(1), 1);
}

#[test]
fn test_pre_decrement_and_post_increment() {
    // LD A,(XIX+) / LD (-XIY),A
    let mut cpu = cpu_with(&[0xC5, 0xF0, 0x21, 0xF4, 0xF4, 0x41]);
    cpu.regs.index[0] = 0x2000;
    cpu.regs.index[1] = 0x3000;
    cpu.memory.ram[0x2000] = 0xAB;
    cpu.step();
    assert_eq!(cpu.regs.reg8(1), 0xAB);
    assert_eq!(cpu.regs.index[0], 0x2001);
    cpu.step();
    assert_eq!(cpu.regs.index[1], 0x2FFF);
    assert_eq!(cpu.memory.ram[0x2FFF], 0xAB);
}

#[test]
fn test_indexed_register_displacement() {
    // LD A,(XIX+0x0010) via the C3 mode byte
    let mut cpu = cpu_with(&[0xC3, 0xF1, 0x10, 0x00, 0x21]);
    cpu.regs.index[0] = 0x2000;
    cpu.memory.ram[0x2010] = 0x5C;
    cpu.step();
    assert_eq!(cpu.regs.reg8(1), 0x5C);
}

#[test]
fn test_ldar_is_pc_relative() {
    // LDAR XHL,$+4+0x20
    let mut cpu = cpu_with(&[0xF3, 0x13, 0x20, 0x00, 0x33]);
    cpu.step();
    assert_eq!(cpu.regs.reg32(3), ORIGIN + 4 + 0x20);
}

#[test]
fn test_extended_register_prefix() {
    // LD RW3,0x99 through C7 with code 0x31
    let mut cpu = cpu_with(&[0xC7, 0x31, 0x03, 0x99]);
    assert_eq!(cpu.step(), 1 + 3);
    assert_eq!(cpu.regs.banks[3][0] & 0xFF00, 0x9900);
}

#[test]
fn test_mul_and_div() {
    // LD WA,0x0010 / LD B,0x03 / MUL WA,B  (C8+2, 40+1)
    let mut cpu = cpu_with(&[0x30, 0x10, 0x00, 0x22, 0x03, 0xCA, 0x41]);
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.reg16(0), 0x30);

    // DIV WA,B: 0x0064 / 7 = 14 r 2
    let mut cpu = cpu_with(&[0x30, 0x64, 0x00, 0x22, 0x07, 0xCA, 0x51]);
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.reg16(0), 0x020E);
    assert!(!cpu.regs.flag(FLAG_V));
}

#[test]
fn test_bank_switch_instructions() {
    // LDF 2 / LD A,5 / INCF / DECF
    let mut cpu = cpu_with(&[0x17, 0x02, 0x21, 0x05, 0x0C, 0x0D]);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.banks[2][0] & 0xFF, 0x05);
    cpu.step();
    assert_eq!(cpu.regs.rfp(), 3);
    cpu.step();
    assert_eq!(cpu.regs.rfp(), 2);
}

#[test]
fn test_undefined_opcode_is_two_state_nop() {
    let mut cpu = cpu_with(&[0x01, 0x00]);
    let before = cpu.regs.clone();
    assert_eq!(cpu.step(), UNDEFINED_COST);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);
    let mut after = cpu.regs.clone();
    after.pc = before.pc;
    assert_eq!(after, before);
}

#[test]
fn test_undefined_second_byte_costs_prefix_plus_two() {
    // Register prefix with an unassigned second byte
    let mut cpu = cpu_with(&[0xC8, 0x00]);
    assert_eq!(cpu.step(), UNDEFINED_COST);
    // CPL is undefined at long width
    let mut cpu = cpu_with(&[0xE8, 0x06]);
    assert_eq!(cpu.step(), UNDEFINED_COST);
    // (#16) source prefix adds its addressing cost
    let mut cpu = cpu_with(&[0xC1, 0x00, 0x20, 0x00]);
    assert_eq!(cpu.step(), 1 + UNDEFINED_COST);
}

#[test]
fn test_interrupt_service_and_reti() {
    let mut cpu = cpu_with(&[0x00, 0x00]);
    cpu.memory.ram[0x1200] = 0x07; // RETI
    // Vector 0x2C points at 0x1200
    cpu.memory.ram[0xFF2C..0xFF30].copy_from_slice(&[0x00, 0x12, 0x00, 0x00]);
    cpu.regs.set_iff(2);
    cpu.regs.set_flags(FLAG_C);
    cpu.memory.pending = Some(InterruptRequest { vector: 0x2C, level: 4 });

    assert_eq!(cpu.step(), INTERRUPT_COST);
    assert_eq!(cpu.regs.pc, 0x1200);
    assert_eq!(cpu.regs.iff(), 5);
    assert_eq!(cpu.regs.xsp(), 0x8000 - 6);
    assert_eq!(cpu.memory.acknowledged, vec![0x2C]);

    cpu.regs.set_flags(0);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.pc, ORIGIN);
    assert_eq!(cpu.regs.iff(), 2);
    assert!(cpu.regs.flag(FLAG_C));
    assert_eq!(cpu.regs.xsp(), 0x8000);
}

#[test]
fn test_interrupt_masked_below_iff() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.regs.set_iff(5);
    cpu.memory.pending = Some(InterruptRequest { vector: 0x40, level: 3 });
    assert_eq!(cpu.step(), 2);
    assert_eq!(cpu.regs.pc, ORIGIN + 1);
    assert!(cpu.memory.pending.is_some());
}

#[test]
fn test_interrupt_level_seven_caps_mask() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.regs.set_iff(0);
    cpu.memory.pending = Some(InterruptRequest { vector: 0x08, level: 7 });
    cpu.step();
    assert_eq!(cpu.regs.iff(), 7);
}

#[test]
fn test_halt_waits_for_interrupt() {
    let mut cpu = cpu_with(&[0x05, 0x00]);
    cpu.regs.set_iff(0);
    cpu.step();
    assert!(cpu.halted);
    let pc = cpu.regs.pc;
    assert_eq!(cpu.step(), HALT_IDLE_COST);
    assert_eq!(cpu.regs.pc, pc);

    cpu.memory.pending = Some(InterruptRequest { vector: 0x2C, level: 4 });
    cpu.step();
    assert!(!cpu.halted);
}

#[test]
fn test_swi_uses_vector_table() {
    let mut cpu = cpu_with(&[0xF9]); // SWI 1
    cpu.memory.ram[0xFF04..0xFF08].copy_from_slice(&[0x00, 0x13, 0x00, 0x00]);
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.pc, 0x1300);
    assert_eq!(cpu.regs.xsp(), 0x8000 - 6);
}

#[test]
fn test_bios_trap_hook() {
    let mut cpu = cpu_with(&[0x1F, 0x1F]);
    assert_eq!(cpu.step(), UNDEFINED_COST);
    cpu.memory.trap_enabled = true;
    assert_eq!(cpu.step(), 10);
    assert_eq!(cpu.regs.reg8(1), 0x5A);
}

#[test]
fn test_micro_dma_transfer() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.memory.ram[0x2000] = 0x42;
    cpu.regs.dma[1] = DmaChannel {
        source: 0x2000,
        dest: 0x3000,
        count: 1,
        mode: 0x00, // destination increment, byte
    };
    cpu.memory.dma_requests.push(1);
    assert_eq!(cpu.step(), DMA_TRANSFER_COST + 2);
    assert_eq!(cpu.memory.ram[0x3000], 0x42);
    assert_eq!(cpu.regs.dma[1].dest, 0x3001);
    assert_eq!(cpu.regs.dma[1].count, 0);
    assert_eq!(cpu.memory.dma_ends, vec![1]);
}

#[test]
fn test_ldc_programs_dma_registers() {
    // LD XWA,0x2000 / LDC DMAS0,XWA
    let mut cpu = cpu_with(&[0x40, 0x00, 0x20, 0x00, 0x00, 0xE8, 0x2E, 0x00]);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.dma[0].source, 0x2000);
}

#[test]
fn test_execute_carries_overshoot() {
    // JP to self costs 7 states
    let mut cpu = cpu_with(&[0x1A, 0x00, 0x10]);
    assert_eq!(cpu.execute(10, false), 14);
    assert_eq!(cpu.overshoot, 4);
    assert_eq!(cpu.execute(10, false), 7);
    assert_eq!(cpu.overshoot, 1);

    let mut total = 14 + 7;
    for _ in 0..1000 {
        total += cpu.execute(10, false) as u64;
    }
    let requested = 10 * 1002;
    assert!(total >= requested && total < requested + 7);
    assert_eq!(total - requested, cpu.overshoot as u64);
}

#[test]
fn test_execute_skips_when_overshoot_covers_budget() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.overshoot = 25;
    assert_eq!(cpu.execute(10, true), 0);
    assert_eq!(cpu.overshoot, 15);
    assert!(cpu.memory.render_skip);
    assert_eq!(cpu.regs.pc, ORIGIN);
}

#[test]
fn test_state_round_trip() {
    let mut cpu = cpu_with(&[0x21, 0x11, 0x00, 0x00]);
    cpu.step();
    let saved = cpu.save_state();
    cpu.step();
    cpu.regs.set_reg8(1, 0);
    cpu.load_state(&saved);
    assert_eq!(cpu.regs.reg8(1), 0x11);
    assert_eq!(cpu.regs.pc, ORIGIN + 2);
    assert_eq!(cpu.save_state(), saved);
}

// --- Declared cost equals measured cost for every table entry ---

fn fresh_for_timing(program: &[u8]) -> CpuTlcs900h<TestBus> {
    let mut padded = program.to_vec();
    padded.resize(program.len() + 8, 0);
    let mut cpu = cpu_with(&padded);
    cpu.regs.set_reg32(2, 0x3000); // XDE
    cpu.regs.set_reg32(3, 0x3100); // XHL
    cpu.regs.set_reg16(1, 1); // BC: block transfers run once
    cpu
}

/// With F = 0 a condition holds exactly when bit 3 is set.
fn taken_with_clear_flags(cc: u8) -> bool {
    cc & 8 != 0
}

#[test]
fn test_primary_costs_match_measured() {
    for opcode in 0..=255u8 {
        let desc = PRIMARY[opcode as usize];
        let expected = match desc.kind {
            Primary::Src(..) | Primary::Dst(_) | Primary::Reg(_) | Primary::ExtReg(_) => continue,
            Primary::BiosTrap | Primary::Undefined => UNDEFINED_COST,
            Primary::Jr | Primary::Jrl if taken_with_clear_flags(opcode) => {
                desc.cycles[0] as u32 + desc.taken as u32
            }
            _ => desc.cycles[0] as u32,
        };
        let mut cpu = fresh_for_timing(&[opcode]);
        assert_eq!(cpu.step(), expected, "{} ({:02X})", desc.mnemonic, opcode);
    }
}

#[test]
fn test_register_costs_match_measured() {
    for width in [Width::Byte, Width::Word, Width::Long] {
        let prefix = width_prefix(0xC8, width);
        let prefix_cost = PRIMARY[prefix as usize].cycles[0] as u32;
        for second in 0..=255u8 {
            let desc = REG_OPS[second as usize];
            if desc.kind == RegOp::Djnz {
                continue;
            }
            let expected = if desc.defined(width) {
                prefix_cost + desc.cost(width) as u32
            } else {
                prefix_cost + UNDEFINED_COST
            };
            let mut cpu = fresh_for_timing(&[prefix, second]);
            assert_eq!(
                cpu.step(),
                expected,
                "{} ({:02X} {:02X})",
                desc.mnemonic,
                prefix,
                second
            );
        }
    }
}

#[test]
fn test_source_costs_match_measured() {
    for width in [Width::Byte, Width::Word, Width::Long] {
        // (XHL) source prefix
        let prefix = width_prefix(0x83, width);
        let prefix_cost = PRIMARY[prefix as usize].cycles[0] as u32;
        for second in 0..=255u8 {
            let desc = SRC_OPS[second as usize];
            let expected = if desc.defined(width) {
                prefix_cost + desc.cost(width) as u32
            } else {
                prefix_cost + UNDEFINED_COST
            };
            let mut cpu = fresh_for_timing(&[prefix, second]);
            assert_eq!(
                cpu.step(),
                expected,
                "{} ({:02X} {:02X})",
                desc.mnemonic,
                prefix,
                second
            );
        }
    }
}

#[test]
fn test_destination_costs_match_measured() {
    for prefix in [0xB3u8, 0xBB, 0xF1] {
        let prefix_cost = PRIMARY[prefix as usize].cycles[0] as u32;
        for second in 0..=255u8 {
            let desc = DST_OPS[second as usize];
            let expected = if desc.kind == DstOp::Undefined {
                prefix_cost + UNDEFINED_COST
            } else if desc.taken != 0 && taken_with_clear_flags(second) {
                prefix_cost + desc.cost(Width::Byte) as u32 + desc.taken as u32
            } else {
                prefix_cost + desc.cost(Width::Byte) as u32
            };
            // Operand bytes for (XHL+d8) and (#16) come before the second byte.
            let program: Vec<u8> = match prefix {
                0xBB => vec![prefix, 0x00, second],
                0xF1 => vec![prefix, 0x00, 0x20, second],
                _ => vec![prefix, second],
            };
            let mut cpu = fresh_for_timing(&program);
            assert_eq!(
                cpu.step(),
                expected,
                "{} ({:02X} {:02X})",
                desc.mnemonic,
                prefix,
                second
            );
        }
    }
}
