//! Test support for the Ember engine.
//!
//! Provides a [`RecordingDevice`] that fakes every device operation of the
//! frame lifecycle and a [`ScriptedWindow`], so the swapchain builder and
//! frame orchestrator can be exercised without a GPU.

pub mod device;
pub mod window;

pub use device::{DeviceCall, DeviceProbe, FailPoint, RecordingDevice};
pub use window::ScriptedWindow;

use ember_gpu::GpuError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    #[error("No recorded call matches: {0}")]
    MissingCall(String),
}

pub type Result<T> = std::result::Result<T, TestError>;
