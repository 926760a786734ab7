//! Core constants and timing utilities for the Ember engine.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Frame pipelining constants
//! - Frame timing and FPS statistics

pub mod timer;

pub use timer::{FrameStats, FrameTimer};

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    ///
    /// Each in-flight slot owns one command buffer, one semaphore pair and one
    /// fence, so this also bounds how many of those exist.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
}

pub use constants::MAX_FRAMES_IN_FLIGHT;
