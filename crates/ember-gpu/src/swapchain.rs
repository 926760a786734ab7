//! Swapchain management.
//!
//! A [`SurfaceGeneration`] bundles everything whose lifetime is tied to one
//! swapchain: the presentable images and their views, the shared depth
//! buffer, the render pass and one framebuffer per image. A generation is
//! either fully built or not built at all.

use crate::device::{DepthAttachment, PresentDevice, SurfaceSupport, SwapchainDesc};
use crate::error::{GpuError, Result};
use crate::window::is_degenerate;
use ash::vk;

/// Select the best surface format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SurfaceCreation("Surface reports no formats".to_string()))
}

/// Select the best present mode.
///
/// Mailbox is preferred for low latency unless vsync is requested. FIFO is
/// always supported and serves as the fallback.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> Result<vk::PresentModeKHR> {
    if available.is_empty() {
        return Err(GpuError::SurfaceCreation(
            "Surface reports no present modes".to_string(),
        ));
    }

    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        return Ok(vk::PresentModeKHR::MAILBOX);
    }

    Ok(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more image than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Render pass, extent and formats of a surface generation.
///
/// Handed to pipeline owners when the generation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub generation: u64,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub image_count: usize,
}

/// Swapchain and every object sized or formatted by it.
pub struct SurfaceGeneration {
    id: u64,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Option<DepthAttachment>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    color_format: vk::Format,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl SurfaceGeneration {
    fn empty(id: u64) -> Self {
        Self {
            id,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            color_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        }
    }

    /// Build a new generation for `desired_extent`.
    ///
    /// When `previous` is given its swapchain is handed to the driver as the
    /// old swapchain; the caller remains responsible for destroying it.
    /// Anything created before a failure is destroyed before returning.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn build<D: PresentDevice>(
        device: &D,
        desired_extent: vk::Extent2D,
        previous: Option<&Self>,
        vsync: bool,
        id: u64,
    ) -> Result<Self> {
        let SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        } = device.surface_support()?;

        let surface_format = select_surface_format(&formats)?;
        let present_mode = select_present_mode(&present_modes, vsync)?;
        let extent = calculate_extent(&capabilities, desired_extent);
        if is_degenerate(extent) {
            return Err(GpuError::DegenerateExtent {
                width: extent.width,
                height: extent.height,
            });
        }
        let depth_format = device.depth_format()?;

        let desc = SwapchainDesc {
            min_image_count: choose_image_count(&capabilities),
            surface_format,
            present_mode,
            extent,
            pre_transform: capabilities.current_transform,
        };
        let old_swapchain = previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain);

        let mut generation = Self::empty(id);
        generation.color_format = surface_format.format;
        generation.depth_format = depth_format;
        generation.present_mode = present_mode;
        generation.extent = extent;

        if let Err(e) = generation.create_objects(device, &desc, old_swapchain) {
            generation.destroy(device);
            return Err(e);
        }

        tracing::info!(
            generation = id,
            width = extent.width,
            height = extent.height,
            images = generation.images.len(),
            color_format = ?generation.color_format,
            depth_format = ?generation.depth_format,
            present_mode = ?present_mode,
            "Built swapchain"
        );

        Ok(generation)
    }

    fn create_objects<D: PresentDevice>(
        &mut self,
        device: &D,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        self.swapchain = device
            .create_swapchain(desc, old_swapchain)
            .map_err(|e| match e {
                GpuError::Vulkan(result) => GpuError::SwapchainCreation(result.to_string()),
                other => other,
            })?;
        self.images = device.swapchain_images(self.swapchain)?;

        for &image in &self.images {
            let view = device.create_color_view(image, self.color_format)?;
            self.image_views.push(view);
        }

        let depth = self
            .depth
            .insert(device.create_depth_attachment(self.extent, self.depth_format)?);
        let depth_view = depth.view;

        self.render_pass = device.create_render_pass(self.color_format, self.depth_format)?;

        for &view in &self.image_views {
            let framebuffer =
                device.create_framebuffer(self.render_pass, &[view, depth_view], self.extent)?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Whether both generations use the same color and depth formats.
    pub fn compare_formats(&self, other: &Self) -> bool {
        self.color_format == other.color_format && self.depth_format == other.depth_format
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Framebuffer for swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width over height of the current extent.
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Snapshot of the render pass, extent and formats.
    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            generation: self.id,
            render_pass: self.render_pass,
            extent: self.extent,
            color_format: self.color_format,
            depth_format: self.depth_format,
            image_count: self.images.len(),
        }
    }

    /// Destroy every object of this generation.
    ///
    /// The GPU must no longer be using any of them.
    pub fn destroy<D: PresentDevice>(mut self, device: &D) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass);
        }
        if let Some(depth) = self.depth.take() {
            device.destroy_depth_attachment(depth);
        }
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view);
        }
        // Images belong to the swapchain
        if self.swapchain != vk::SwapchainKHR::null() {
            device.destroy_swapchain(self.swapchain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_bgra() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn srgb_format_needs_nonlinear_color_space() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(matches!(
            select_surface_format(&[]),
            Err(GpuError::SurfaceCreation(_))
        ));
    }

    #[test]
    fn present_mode_prefers_mailbox_without_vsync() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&modes, false).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&modes, true).unwrap(),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            select_present_mode(&modes, false).unwrap(),
            vk::PresentModeKHR::FIFO
        );
        assert!(select_present_mode(&[], false).is_err());
    }

    #[test]
    fn extent_uses_current_extent_when_defined() {
        let mut capabilities = caps(2, 3);
        capabilities.current_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        let extent = calculate_extent(
            &capabilities,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn extent_is_clamped_when_undefined() {
        let extent = calculate_extent(
            &caps(2, 3),
            vk::Extent2D {
                width: 10_000,
                height: 600,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 600));
    }

    #[test]
    fn image_count_stays_within_bounds() {
        for (min, max) in [(1, 0), (2, 3), (2, 2), (3, 8), (1, 1)] {
            let capabilities = caps(min, max);
            let count = choose_image_count(&capabilities);
            assert!(count >= min);
            if max > 0 {
                assert!(count <= max);
            }
        }
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
    }
}
