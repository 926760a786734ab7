//! [`PresentDevice`] implementation backed by ash.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::device::{
    AcquireOutcome, DepthAttachment, FrameSubmission, PresentDevice, PresentOutcome,
    RenderPassBegin, SurfaceSupport, SwapchainDesc,
};
use crate::error::{GpuError, Result};
use crate::render_pass::{
    create_framebuffer, create_swapchain_render_pass, has_stencil, DEPTH_FORMAT_CANDIDATES,
};
use crate::surface::SurfaceContext;
use ash::vk;
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Vulkan device, window surface and the command pool frames record from.
pub struct VulkanDevice {
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    command_pool: CommandPool,
}

impl VulkanDevice {
    /// Create a surface for `window` and a resettable command pool on the graphics queue.
    ///
    /// # Safety
    /// The window must have valid handles and outlive the device.
    pub unsafe fn new<W>(gpu: Arc<GpuContext>, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let surface = SurfaceContext::from_window(&gpu, window)?;

        let command_pool = match CommandPool::new(
            gpu.device(),
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ) {
            Ok(pool) => pool,
            Err(e) => {
                surface.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            gpu,
            surface,
            command_pool,
        })
    }

    /// The shared GPU context.
    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.gpu.wait_idle();
            self.command_pool.destroy(self.gpu.device());
            self.surface.destroy();
        }
    }
}

impl PresentDevice for VulkanDevice {
    fn surface_support(&self) -> Result<SurfaceSupport> {
        self.surface.support(&self.gpu)
    }

    fn depth_format(&self) -> Result<vk::Format> {
        self.gpu.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR> {
        let queue_families = [self.gpu.graphics_queue_family()];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.surface
                .swapchain_loader
                .create_swapchain(&create_info, None)?
        };
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let images = unsafe { self.surface.swapchain_loader.get_swapchain_images(swapchain)? };
        Ok(images)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.surface
                .swapchain_loader
                .destroy_swapchain(swapchain, None);
        }
    }

    fn create_color_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
        create_image_view(self.device(), image, format, vk::ImageAspectFlags::COLOR)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) };
    }

    fn create_depth_attachment(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<DepthAttachment> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image =
            self.gpu
                .allocator()
                .lock()
                .create_image(&create_info, MemoryLocation::GpuOnly, "depth")?;

        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }

        match create_image_view(self.device(), image.image, format, aspect) {
            Ok(view) => Ok(DepthAttachment { image, view }),
            Err(e) => {
                if let Err(free_err) = self.gpu.allocator().lock().free_image(&mut image) {
                    tracing::warn!("Failed to free depth image: {free_err}");
                }
                Err(e)
            }
        }
    }

    fn destroy_depth_attachment(&self, attachment: DepthAttachment) {
        let DepthAttachment { mut image, view } = attachment;
        unsafe { self.device().destroy_image_view(view, None) };
        if let Err(e) = self.gpu.allocator().lock().free_image(&mut image) {
            tracing::warn!("Failed to free depth image: {e}");
        }
    }

    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<vk::RenderPass> {
        unsafe { create_swapchain_render_pass(self.device(), color_format, depth_format) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device().destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        unsafe { create_framebuffer(self.device(), render_pass, attachments, extent) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device().destroy_framebuffer(framebuffer, None) };
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device().create_semaphore(&create_info, None)? };
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device().create_fence(&create_info, None)? };
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) };
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device().wait_for_fences(&[fence], true, u64::MAX)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device().reset_fences(&[fence])? };
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        unsafe {
            self.command_pool
                .allocate_command_buffers(self.device(), count)
        }
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.command_pool
                .free_command_buffers(self.device(), command_buffers);
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device()
                .begin_command_buffer(command_buffer, &begin_info)?;
        }
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { self.device().end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&begin.clear_values);

        unsafe {
            self.device().cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_set_viewport_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device().cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device().cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(command_buffer) };
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.surface.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            // No image was acquired and the semaphore is left unsignaled
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn submit(&self, submission: &FrameSubmission) -> Result<()> {
        let command_buffers = [submission.command_buffer];
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let signal_semaphores = [submission.signal_semaphore];

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device().queue_submit(
                self.gpu.graphics_queue(),
                &[submit_info],
                submission.fence,
            )?;
        }
        Ok(())
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.surface
                .swapchain_loader
                .queue_present(self.gpu.graphics_queue(), &present_info)
        };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(view)
}
