//! Reusable graphics utilities for emulator systems
//!
//! Colour helpers shared by display engines that output packed RGB565.

pub mod color;

pub use color::ColorOps;
