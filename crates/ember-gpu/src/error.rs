//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The surface currently has a zero-sized extent (e.g. a minimized window).
    ///
    /// Never fatal: the frame orchestrator waits for a usable extent and retries.
    #[error("Surface extent {width}x{height} is degenerate")]
    DegenerateExtent { width: u32, height: u32 },

    /// A rebuilt swapchain no longer matches the formats pipelines were compiled against.
    #[error(
        "Swapchain format changed across rebuild: color {old_color:?} -> {new_color:?}, depth {old_depth:?} -> {new_depth:?}"
    )]
    FormatDrift {
        old_color: vk::Format,
        new_color: vk::Format,
        old_depth: vk::Format,
        new_depth: vk::Format,
    },

    /// Descriptor allocation or update failed.
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
