//! Real-time clock (SFR 0x90-0x97)
//!
//! The clock counts emulated CPU states from 2000-01-01 00:00:00 rather than
//! reading the host clock, so two runs of the same input always observe the
//! same date.
//!
//! | Addr | Contents |
//! |------|----------|
//! | 0x90 | control |
//! | 0x91 | year (BCD, 00 = 2000) |
//! | 0x92 | month (BCD) |
//! | 0x93 | day (BCD) |
//! | 0x94 | hour (BCD) |
//! | 0x95 | minute (BCD) |
//! | 0x96 | second (BCD) |
//! | 0x97 | high nibble: years since leap year, low nibble: weekday (0 = Sunday) |

use crate::CPU_CLOCK_HZ;
use serde::{Deserialize, Serialize};

/// 2000-01-01 was a Saturday
const EPOCH_WEEKDAY: u64 = 6;

/// Broken-down calendar time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rtc {
    control: u8,
    elapsed: u64,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn tick(&mut self, cycles: u32) {
        self.elapsed += cycles as u64;
    }

    pub fn seconds(&self) -> u64 {
        self.elapsed / CPU_CLOCK_HZ as u64
    }

    pub fn now(&self) -> DateTime {
        let secs = self.seconds();
        let days = secs / 86_400;
        let rem = secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        DateTime {
            year,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem / 60 % 60) as u8,
            second: (rem % 60) as u8,
            weekday: ((days + EPOCH_WEEKDAY) % 7) as u8,
        }
    }

    /// The seven BCD bytes at 0x91-0x97
    pub fn registers(&self) -> [u8; 7] {
        let t = self.now();
        [
            bcd((t.year % 100) as u8),
            bcd(t.month),
            bcd(t.day),
            bcd(t.hour),
            bcd(t.minute),
            bcd(t.second),
            (((t.year % 4) as u8) << 4) | t.weekday,
        ]
    }

    pub fn read(&self, addr: u8) -> u8 {
        match addr {
            0x90 => self.control,
            0x91..=0x97 => self.registers()[(addr - 0x91) as usize],
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u8, val: u8) {
        if addr == 0x90 {
            self.control = val;
        }
    }
}

pub fn bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// Days since 2000-01-01 to (year, month, day)
fn civil_from_days(days: u64) -> (u32, u8, u8) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of a year.
    let z = days + 730_425;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = (yoe + era * 400) as u32 + (month <= 2) as u32;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_seconds(rtc: &mut Rtc, secs: u64) {
        rtc.elapsed += secs * CPU_CLOCK_HZ as u64;
    }

    #[test]
    fn test_epoch() {
        let rtc = Rtc::new();
        let t = rtc.now();
        assert_eq!((t.year, t.month, t.day), (2000, 1, 1));
        assert_eq!(t.weekday, 6);
        assert_eq!(rtc.read(0x91), 0x00);
        assert_eq!(rtc.read(0x92), 0x01);
        assert_eq!(rtc.read(0x97), 0x06);
    }

    #[test]
    fn test_leap_day_and_rollover() {
        let mut rtc = Rtc::new();
        // 2000 is a leap year: day 59 is Feb 29
        advance_seconds(&mut rtc, 59 * 86_400 + 3600 * 23 + 60 * 59 + 59);
        let t = rtc.now();
        assert_eq!((t.year, t.month, t.day), (2000, 2, 29));
        assert_eq!(rtc.read(0x94), 0x23);
        assert_eq!(rtc.read(0x95), 0x59);
        assert_eq!(rtc.read(0x96), 0x59);

        advance_seconds(&mut rtc, 1);
        let t = rtc.now();
        assert_eq!((t.month, t.day, t.hour), (3, 1, 0));
    }

    #[test]
    fn test_year_registers() {
        let mut rtc = Rtc::new();
        advance_seconds(&mut rtc, 366 * 86_400);
        assert_eq!(rtc.now().year, 2001);
        assert_eq!(rtc.read(0x91), 0x01);
        assert_eq!(rtc.read(0x97) >> 4, 1);
    }

    #[test]
    fn test_tick_accumulates_states() {
        let mut rtc = Rtc::new();
        for _ in 0..60 {
            rtc.tick(CPU_CLOCK_HZ / 60);
        }
        assert_eq!(rtc.read(0x96), 0x01);
    }
}
