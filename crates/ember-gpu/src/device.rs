//! The device operations the frame lifecycle issues.
//!
//! [`PresentDevice`] is the seam between the frame orchestrator and Vulkan.
//! [`VulkanDevice`](crate::vulkan::VulkanDevice) implements it on top of ash;
//! tests substitute a recording fake so that acquire/present outcomes and
//! surface capabilities can be scripted.

use crate::error::Result;
use crate::memory::GpuImage;
use ash::vk;

/// Surface properties queried before each swapchain build.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Raw surface capabilities (image count bounds, extents, transform).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Parameters for a swapchain create call.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Depth image shared by every framebuffer of a surface generation.
pub struct DepthAttachment {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

/// Everything needed to record `vkCmdBeginRenderPass` for one frame.
#[derive(Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    /// Color clear value followed by the depth/stencil clear value.
    pub clear_values: [vk::ClearValue; 2],
}

/// One queue submission of a frame's command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Result of asking the presentation engine for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` images can still be rendered to.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; no image was acquired.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be rebuilt after this present.
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Device, queue, surface and command pool operations used by the frame lifecycle.
///
/// Handles passed in must have been created by the same device and must not
/// be in use by the GPU when destroyed. Errors other than the out-of-date
/// outcomes are fatal to the caller.
pub trait PresentDevice {
    /// Query the surface's capabilities, formats and present modes.
    fn surface_support(&self) -> Result<SurfaceSupport>;

    /// Pick a depth format supported as a depth/stencil attachment.
    fn depth_format(&self) -> Result<vk::Format>;

    /// Create a swapchain, handing over `old_swapchain` (may be null).
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR>;

    /// Images owned by `swapchain`, in presentation-engine index order.
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_color_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView>;

    fn destroy_image_view(&self, view: vk::ImageView);

    /// Allocate a device-local depth image and its view.
    fn create_depth_attachment(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<DepthAttachment>;

    fn destroy_depth_attachment(&self, attachment: DepthAttachment);

    /// Create the single-subpass color + depth render pass for a generation.
    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<vk::RenderPass>;

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_semaphore(&self) -> Result<vk::Semaphore>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;

    fn destroy_fence(&self, fence: vk::Fence);

    /// Block until `fence` is signaled, without a timeout.
    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()>;

    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    /// Allocate `count` primary command buffers from the device's pool in one call.
    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>>;

    /// Return command buffers to the device's pool in one call.
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    /// Begin recording. Resets the buffer implicitly.
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin);

    /// Set a full-extent viewport (depth 0..1) and scissor.
    fn cmd_set_viewport_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Acquire the next presentable image with an unbounded timeout.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome>;

    fn submit(&self, submission: &FrameSubmission) -> Result<()>;

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;
}
