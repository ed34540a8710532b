//! Frame-skip policy driven by host audio buffer pressure.
//!
//! The scheduler always runs the full CPU budget for a frame; skipping only
//! elides the display paint. The decision is taken from the host's view of its
//! audio buffer and is capped so video can never stall indefinitely.

use serde::{Deserialize, Serialize};

/// Longest run of consecutive skipped frames before a paint is forced.
pub const FRAMESKIP_MAX: u32 = 60;

/// Default occupancy threshold (percent) for [`FrameSkipMode::Manual`].
pub const DEFAULT_SKIP_THRESHOLD: u8 = 33;

/// How skip decisions are made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSkipMode {
    /// Paint every frame
    #[default]
    Off,
    /// Skip when the host reports an imminent underrun
    Auto,
    /// Skip when buffer occupancy drops below the threshold
    Manual,
}

impl FrameSkipMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "disabled" => Some(FrameSkipMode::Off),
            "auto" => Some(FrameSkipMode::Auto),
            "manual" => Some(FrameSkipMode::Manual),
            _ => None,
        }
    }
}

/// Skip mode plus its manual threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipPolicy {
    pub mode: FrameSkipMode,
    /// Occupancy percentage under which manual mode skips
    pub threshold: u8,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            mode: FrameSkipMode::Off,
            threshold: DEFAULT_SKIP_THRESHOLD,
        }
    }
}

/// Host-reported audio buffer state, refreshed every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioBufferStatus {
    /// False when the host cannot report buffer state; disables skipping
    pub active: bool,
    /// Fill level in percent
    pub occupancy: u8,
    pub underrun_likely: bool,
}

/// Consecutive-skip bookkeeping
#[derive(Debug, Clone)]
pub struct FrameSkipper {
    consecutive: u32,
    ceiling: u32,
}

impl FrameSkipper {
    pub fn new() -> Self {
        Self::with_ceiling(FRAMESKIP_MAX)
    }

    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            consecutive: 0,
            ceiling,
        }
    }

    /// Decide whether the upcoming frame skips its paint.
    pub fn decide(&mut self, policy: &SkipPolicy, status: &AudioBufferStatus) -> bool {
        let wants_skip = status.active
            && match policy.mode {
                FrameSkipMode::Off => false,
                FrameSkipMode::Auto => status.underrun_likely,
                FrameSkipMode::Manual => status.occupancy < policy.threshold,
            };

        if !wants_skip || self.consecutive >= self.ceiling {
            self.consecutive = 0;
            false
        } else {
            self.consecutive += 1;
            true
        }
    }

    /// Number of frames skipped in a row so far
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

impl Default for FrameSkipper {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio latency a host should request when frame skipping is enabled:
/// six frames, rounded up to a multiple of 32 ms.
pub fn audio_latency_ms(frame_rate_hz: f64) -> u32 {
    let frame_time_ms = 1000.0 / frame_rate_hz;
    let latency = (6.0 * frame_time_ms + 0.5) as u32;
    (latency + 0x1F) & !0x1F
}

/// Stereo frames produced per emulated frame, truncated.
pub fn samples_per_frame(sample_rate: u32, frame_rate_hz: u32) -> usize {
    (sample_rate / frame_rate_hz.max(1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn underrun() -> AudioBufferStatus {
        AudioBufferStatus {
            active: true,
            occupancy: 0,
            underrun_likely: true,
        }
    }

    #[test]
    fn test_off_never_skips() {
        let mut skipper = FrameSkipper::new();
        let policy = SkipPolicy::default();
        for _ in 0..10 {
            assert!(!skipper.decide(&policy, &underrun()));
        }
    }

    #[test]
    fn test_inactive_status_never_skips() {
        let mut skipper = FrameSkipper::new();
        let policy = SkipPolicy {
            mode: FrameSkipMode::Auto,
            threshold: DEFAULT_SKIP_THRESHOLD,
        };
        let status = AudioBufferStatus {
            active: false,
            ..underrun()
        };
        assert!(!skipper.decide(&policy, &status));
    }

    #[test]
    fn test_manual_threshold() {
        let mut skipper = FrameSkipper::new();
        let policy = SkipPolicy {
            mode: FrameSkipMode::Manual,
            threshold: 33,
        };
        let mut status = AudioBufferStatus {
            active: true,
            occupancy: 32,
            underrun_likely: false,
        };
        assert!(skipper.decide(&policy, &status));
        status.occupancy = 33;
        assert!(!skipper.decide(&policy, &status));
        assert_eq!(skipper.consecutive(), 0);
    }

    #[test]
    fn test_ceiling_forces_paint_under_sustained_underrun() {
        let mut skipper = FrameSkipper::new();
        let policy = SkipPolicy {
            mode: FrameSkipMode::Auto,
            threshold: DEFAULT_SKIP_THRESHOLD,
        };

        let mut run = 0;
        for _ in 0..500 {
            if skipper.decide(&policy, &underrun()) {
                run += 1;
                assert!(run <= FRAMESKIP_MAX);
            } else {
                assert_eq!(run, FRAMESKIP_MAX);
                run = 0;
            }
        }
    }

    #[test]
    fn test_audio_latency_rounding() {
        // 6 * 16.67 ms = 100 ms -> 128 ms
        assert_eq!(audio_latency_ms(60.0), 128);
        assert_eq!(audio_latency_ms(60.25), 128);
        assert_eq!(audio_latency_ms(30.0) % 32, 0);
    }

    #[test]
    fn test_samples_per_frame() {
        assert_eq!(samples_per_frame(44_100, 60), 735);
        assert_eq!(samples_per_frame(48_000, 60), 800);
        assert_eq!(samples_per_frame(22_050, 60), 367);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(FrameSkipMode::from_str("AUTO"), Some(FrameSkipMode::Auto));
        assert_eq!(FrameSkipMode::from_str("disabled"), Some(FrameSkipMode::Off));
        assert_eq!(FrameSkipMode::from_str("sometimes"), None);
    }
}
