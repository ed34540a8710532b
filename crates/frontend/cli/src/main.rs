use anyhow::{Context, Result};
use clap::Parser;
use emu_core::logging::LogConfig;
use emu_core::System;
use emu_ngpc::{CoreConfig, NgpcSystem};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Headless Neo Geo Pocket runner
#[derive(Parser)]
struct Args {
    /// Cartridge image (.ngp / .ngc)
    rom: PathBuf,

    /// Flash save file; read when present, written back if the game changed flash
    #[arg(long)]
    save: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Joypad bitmask held for the whole run
    #[arg(long, default_value_t = 0)]
    input: u8,

    /// Core configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host option pairs such as ngpc_language=japanese (repeatable)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Restore this snapshot before running
    #[arg(long)]
    load_snapshot: Option<PathBuf>,

    /// Write a snapshot here after the last frame
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Core log filter, e.g. "warn,bios=debug,flash=trace"
    #[arg(long)]
    core_log: Option<String>,

    /// Write core log output to this file instead of stderr
    #[arg(long)]
    core_log_file: Option<PathBuf>,

    /// Maximum core log messages per second per category
    #[arg(long)]
    core_log_rate: Option<usize>,

    /// Print a framebuffer digest every frame instead of only at the end
    #[arg(long, default_value_t = false)]
    every_frame: bool,

    /// Print the machine debug state at the end
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<CoreConfig> {
    if let Some(path) = &args.config {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        return Ok(CoreConfig::from_json(&text)?);
    }
    let pairs = args
        .options
        .iter()
        .map(|opt| {
            opt.split_once('=')
                .with_context(|| format!("option {opt:?} is not KEY=VALUE"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CoreConfig::from_options(pairs)?)
}

fn digest(pixels: &[u16]) -> String {
    let mut hasher = Sha256::new();
    for p in pixels {
        hasher.update(p.to_le_bytes());
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let core_log = LogConfig::global();
    if let Some(filter) = &args.core_log {
        for rejected in core_log.apply_filter(filter) {
            warn!("ignoring core log filter entry {rejected:?}");
        }
    }
    if let Some(rate) = args.core_log_rate {
        core_log.set_rate_limit(rate);
    }
    if let Some(path) = &args.core_log_file {
        core_log
            .set_log_file(path.clone())
            .with_context(|| format!("opening {}", path.display()))?;
    }

    let result = run(&args);
    core_log.clear_log_file();
    result
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let image = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    let save = match &args.save {
        Some(path) if path.exists() => {
            Some(fs::read(path).with_context(|| format!("reading {}", path.display()))?)
        }
        _ => None,
    };

    let mut sys = NgpcSystem::load_content(&image, save.as_deref(), config)?;
    info!(
        "{} (id {:04X}, v{}, {})",
        sys.header().title,
        sys.header().game_id,
        sys.header().version,
        if sys.header().color { "colour" } else { "monochrome" }
    );

    if let Some(path) = &args.load_snapshot {
        let buf = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        sys.load_state(&buf)?;
        info!("restored snapshot {}", path.display());
    }

    for n in 1..=args.frames {
        sys.poll_input(args.input);
        let result = sys.step_frame()?;
        if args.every_frame {
            println!(
                "frame {n}: {} {}",
                digest(&sys.frame().pixels),
                if result.painted { "" } else { "(skipped)" }
            );
        }
        if sys.shutdown_requested() {
            info!("game requested power off after {n} frames");
            break;
        }
    }
    println!("framebuffer {}", digest(&sys.read_framebuffer().pixels));

    if let Some(path) = &args.snapshot {
        let mut buf = vec![0u8; sys.state_size()];
        sys.save_state(&mut buf)?;
        fs::write(path, &buf).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {} byte snapshot to {}", buf.len(), path.display());
    }

    if args.debug {
        println!("{}", serde_json::to_string_pretty(&sys.debug_state())?);
    }

    if let Some(flash) = sys.shutdown() {
        match &args.save {
            Some(path) => {
                fs::write(path, &flash).with_context(|| format!("writing {}", path.display()))?;
                info!("saved flash to {}", path.display());
            }
            None => warn!("flash was modified but no --save path was given"),
        }
    }

    Ok(())
}
