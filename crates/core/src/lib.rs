//! Core emulator primitives and traits.

pub mod apu;
pub mod cpu_tlcs900h;
pub mod frameskip;
pub mod graphics;
pub mod logging;
pub mod ppu;
pub mod snapshot;
pub mod types {
    use serde::{Deserialize, Serialize};

    /// A finished video frame in packed RGB565.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u16>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }

    /// Outcome of one scheduled frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameResult {
        /// False when the display paint was elided by frame skipping
        pub painted: bool,
        /// CPU states actually consumed, including overshoot
        pub cycles: u32,
    }

    pub type AudioSample = i16;
}

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to the power-on state of the loaded content
    fn reset(&mut self);

    /// Run one frame of emulation with the system's configured budget and skip policy.
    fn step_frame(&mut self) -> Result<types::FrameResult, Self::Error>;

    /// Most recently painted frame. Skipped frames leave it untouched.
    fn frame(&self) -> &types::Frame;

    /// Interleaved stereo samples produced by the last frame.
    fn audio(&self) -> &[types::AudioSample];

    /// Size in bytes of a save state for the loaded content.
    fn state_size(&self) -> usize;

    /// Serialize the full machine state into `buf` (exactly `state_size()` bytes).
    fn save_state(&self, buf: &mut [u8]) -> Result<(), snapshot::SnapshotError>;

    /// Restore a state produced by `save_state`. On error the machine is unchanged.
    fn load_state(&mut self, buf: &[u8]) -> Result<(), snapshot::SnapshotError>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapshot::{SnapshotError, SnapshotFormat};

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    const MOCK_FORMAT: SnapshotFormat = SnapshotFormat {
        magic: *b"MOCK",
        version: 1,
    };

    struct MockSystem {
        frame: types::Frame,
        counter: u32,
    }

    impl System for MockSystem {
        type Error = std::convert::Infallible;

        fn reset(&mut self) {
            self.counter = 0;
        }

        fn step_frame(&mut self) -> Result<types::FrameResult, Self::Error> {
            self.counter += 1;
            Ok(types::FrameResult {
                painted: true,
                cycles: 100,
            })
        }

        fn frame(&self) -> &types::Frame {
            &self.frame
        }

        fn audio(&self) -> &[types::AudioSample] {
            &[]
        }

        fn state_size(&self) -> usize {
            MOCK_FORMAT.encoded_len(&self.counter).unwrap_or(0)
        }

        fn save_state(&self, buf: &mut [u8]) -> Result<(), SnapshotError> {
            MOCK_FORMAT.encode_into(&self.counter, buf)
        }

        fn load_state(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
            self.counter = MOCK_FORMAT.decode(buf)?;
            Ok(())
        }
    }

    #[test]
    fn mock_system_save_load_roundtrip() {
        let mut sys = MockSystem {
            frame: types::Frame::new(2, 2),
            counter: 0,
        };
        for _ in 0..3 {
            sys.step_frame().expect("infallible");
        }
        let mut buf = vec![0u8; sys.state_size()];
        sys.save_state(&mut buf).expect("save");

        sys.reset();
        assert_eq!(sys.counter, 0);
        sys.load_state(&buf).expect("load");
        assert_eq!(sys.counter, 3);
    }

    #[test]
    fn test_system_supports_save_states_default() {
        let sys = MockSystem {
            frame: types::Frame::new(1, 1),
            counter: 0,
        };
        assert!(!sys.supports_save_states());
        assert_eq!(sys.frame().pixels.len(), 1);
    }
}
