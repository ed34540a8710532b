//! Centralized logging for the emulator core.
//!
//! The core never prints directly. Components call [`log`] with a category and
//! a level, and the message closure is only evaluated when that category is
//! enabled, so disabled logging costs one relaxed atomic load.
//!
//! # Architecture
//!
//! - **LogConfig**: process-wide configuration held in atomics
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: CPU, Bus, Video, Sound, Interrupts, Flash, Bios, Stubs
//! - **log()**: lazy, rate-limited output to stderr or a background file writer
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::CPU, LogLevel::Debug, || {
//!     format!("undefined opcode 0x{:02X} at PC={:06X}", 0x50, 0x200040)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the emulated components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution, decode anomalies
    CPU,
    /// Memory map, open-bus accesses
    Bus,
    /// Display engine register writes and rendering
    Video,
    /// Sound chip, DAC and sample queue
    Sound,
    /// Interrupt latching, servicing and micro-DMA
    Interrupts,
    /// Flash command state machine and persistence
    Flash,
    /// High-level BIOS traps and system calls
    Bios,
    /// Unimplemented hardware features
    Stubs,
}

const CATEGORY_COUNT: usize = 8;

impl LogCategory {
    /// Every category, in index order
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::CPU,
        LogCategory::Bus,
        LogCategory::Video,
        LogCategory::Sound,
        LogCategory::Interrupts,
        LogCategory::Flash,
        LogCategory::Bios,
        LogCategory::Stubs,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::CPU => 0,
            LogCategory::Bus => 1,
            LogCategory::Video => 2,
            LogCategory::Sound => 3,
            LogCategory::Interrupts => 4,
            LogCategory::Flash => 5,
            LogCategory::Bios => 6,
            LogCategory::Stubs => 7,
        }
    }

    /// Parse a category name as used on command lines ("cpu", "video", ...)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(LogCategory::CPU),
            "bus" => Some(LogCategory::Bus),
            "video" | "k2ge" => Some(LogCategory::Video),
            "sound" | "psg" => Some(LogCategory::Sound),
            "interrupts" | "irq" => Some(LogCategory::Interrupts),
            "flash" => Some(LogCategory::Flash),
            "bios" => Some(LogCategory::Bios),
            "stubs" => Some(LogCategory::Stubs),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-category sliding window limiter.
struct RateLimiter {
    max_logs_per_second: AtomicUsize,
    window: Duration,
    timestamps: Mutex<[VecDeque<Instant>; CATEGORY_COUNT]>,
    dropped: Mutex<[usize; CATEGORY_COUNT]>,
    last_drop_report: Mutex<[Option<Instant>; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second: AtomicUsize::new(max_logs_per_second),
            window: Duration::from_secs(1),
            timestamps: Mutex::new(Default::default()),
            dropped: Mutex::new([0; CATEGORY_COUNT]),
            last_drop_report: Mutex::new([None; CATEGORY_COUNT]),
        }
    }

    /// Returns (allowed, dropped_count); `dropped_count` is set when a drop
    /// summary is due for this category.
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let idx = category.index();

        let mut timestamps = lock(&self.timestamps);
        let mut dropped = lock(&self.dropped);
        let mut last_report = lock(&self.last_drop_report);

        let window = &mut timestamps[idx];
        while let Some(&front) = window.front() {
            if now.duration_since(front) > self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_logs_per_second.load(Ordering::Relaxed) {
            window.push_back(now);
            let count = std::mem::take(&mut dropped[idx]);
            if count > 0 {
                last_report[idx] = Some(now);
                return (true, Some(count));
            }
            return (true, None);
        }

        dropped[idx] += 1;
        let due = match last_report[idx] {
            None => true,
            Some(last) => now.duration_since(last) >= self.window,
        };
        if due {
            last_report[idx] = Some(now);
            (false, Some(std::mem::take(&mut dropped[idx])))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    log_writer: Mutex<Option<JoinHandle<()>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging off, 60 messages per second per category.
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            log_sender: Mutex::new(None),
            log_writer: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    /// Set the level used by categories without their own override
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Override the level for one category; `Off` falls back to the global level
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category override wins over the global level when it is not `Off`.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Apply a filter such as `"warn,cpu=trace,flash=debug"`.
    ///
    /// Unknown entries are ignored and reported back to the caller.
    pub fn apply_filter(&self, filter: &str) -> Vec<String> {
        let mut rejected = Vec::new();
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((name, level)) => {
                    match (LogCategory::from_str(name), LogLevel::from_str(level)) {
                        (Some(category), Some(level)) => self.set_level(category, level),
                        _ => rejected.push(entry.to_string()),
                    }
                }
                None => match LogLevel::from_str(entry) {
                    Some(level) => self.set_global_level(level),
                    None => rejected.push(entry.to_string()),
                },
            }
        }
        rejected
    }

    /// Set the maximum logs per second per category
    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .max_logs_per_second
            .store(max_logs_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_logs_per_second.load(Ordering::Relaxed)
    }

    /// Route output to a file written by a background thread. Replaces any
    /// previous log file.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.clear_log_file();
        let (sender, receiver) = channel::<String>();

        let writer = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        *lock(&self.log_sender) = Some(sender);
        *lock(&self.log_writer) = Some(writer);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop writing to the log file and wait for queued messages to land.
    /// Output returns to stderr.
    pub fn clear_log_file(&self) {
        self.file_logging_enabled.store(false, Ordering::Relaxed);
        lock(&self.log_sender).take();
        if let Some(writer) = lock(&self.log_writer).take() {
            let _ = writer.join();
        }
    }

    fn write_message(&self, message: String) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = lock(&self.log_sender).as_ref() {
                if let Err(failed) = sender.send(message) {
                    eprintln!("{}", failed.0);
                }
                return;
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message with the specified category and level.
///
/// The closure is only called when the category is enabled at `level` and the
/// per-category rate limit has room. Dropped messages are summarised once per
/// second.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped.filter(|&c| c > 0) {
        config.write_message(format!(
            "[{:?}] WARNING: rate limit exceeded, {} message(s) dropped",
            category, count
        ));
    }
    if allowed {
        config.write_message(format!("[{:?}] {}", category, message_fn()));
    }
}
