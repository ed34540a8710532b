//! Core APU (Audio Processing Unit) components.
//!
//! Sound hardware for the handheld target is a T6W28, Toshiba's stereo
//! derivative of the TI SN76489 programmable sound generator, plus a pair of
//! 8-bit DACs driven directly by software.
//!
//! ## Components
//!
//! - **T6W28**: 3 square-wave tone channels and 1 noise channel with separate
//!   left/right attenuation
//! - **DAC**: two unsigned 8-bit output latches
//! - **AudioChip trait**: common interface for register-driven synthesizers
//!
//! Everything here is integer-only so that identical register writes and
//! identical tick counts always produce identical samples.

pub mod audio_chip;
pub mod dac;
pub mod t6w28;

pub use audio_chip::{AudioChip, StereoSample};
pub use dac::Dac;
pub use t6w28::T6w28;
