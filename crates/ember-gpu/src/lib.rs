//! Vulkan abstraction layer for the Ember engine.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Descriptor set helpers
//! - The swapchain lifecycle: surface generations, per-frame synchronization,
//!   command buffers and the frame orchestrator

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan;
pub mod window;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{CommandBufferPool, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder};
pub use device::{
    AcquireOutcome, DepthAttachment, FrameSubmission, PresentDevice, PresentOutcome,
    RenderPassBegin, SurfaceSupport, SwapchainDesc,
};
pub use error::{GpuError, Result};
pub use frame::{FrameConfig, FrameOrchestrator, FrameState};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use surface::SurfaceContext;
pub use swapchain::{SurfaceGeneration, SurfaceInfo};
pub use sync::{FrameSync, ImageFenceTable, SyncSet};
pub use vulkan::VulkanDevice;
pub use window::PresentationWindow;
