//! A [`PresentDevice`] that fabricates handles and records every call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ash::vk::{self, Handle};
use ember_gpu::memory::GpuImage;
use ember_gpu::{
    AcquireOutcome, DepthAttachment, FrameSubmission, GpuError, PresentDevice, PresentOutcome,
    RenderPassBegin, SurfaceSupport, SwapchainDesc,
};
use parking_lot::Mutex;

use crate::{Result, TestError};

/// One operation issued against the device, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    SurfaceSupport,
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        old_swapchain: vk::SwapchainKHR,
        extent: vk::Extent2D,
        min_image_count: u32,
        format: vk::Format,
        present_mode: vk::PresentModeKHR,
    },
    DestroySwapchain(vk::SwapchainKHR),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateDepthAttachment {
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
    },
    DestroyDepthAttachment {
        image: vk::Image,
        view: vk::ImageView,
    },
    CreateRenderPass {
        render_pass: vk::RenderPass,
        color_format: vk::Format,
        depth_format: vk::Format,
    },
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        attachments: Vec<vk::ImageView>,
        extent: vk::Extent2D,
    },
    DestroyFramebuffer(vk::Framebuffer),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateFence {
        fence: vk::Fence,
        signaled: bool,
    },
    DestroyFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    AllocateCommandBuffers(Vec<vk::CommandBuffer>),
    FreeCommandBuffers(Vec<vk::CommandBuffer>),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    SetViewportScissor {
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    },
    EndRenderPass(vk::CommandBuffer),
    Acquire {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        outcome: AcquireOutcome,
    },
    Submit(FrameSubmission),
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
        outcome: PresentOutcome,
    },
    WaitIdle,
    DestroyCommandPool,
}

/// Device operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Acquire,
    CreateSwapchain,
    CreateDepthAttachment,
    CreateRenderPass,
    CreateFramebuffer,
    CreateFence,
    Submit,
    Present,
}

struct State {
    calls: Vec<DeviceCall>,
    next_handle: u64,
    live: HashSet<u64>,
    unknown_releases: Vec<u64>,

    support: SurfaceSupport,
    depth_format: vk::Format,
    swapchain_images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,

    acquire_count: usize,
    present_count: usize,
    next_image: u32,
    scripted_acquires: HashMap<usize, AcquireOutcome>,
    scripted_presents: HashMap<usize, PresentOutcome>,
    failures: HashSet<FailPoint>,
}

impl State {
    fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 0x1000,
            live: HashSet::new(),
            unknown_releases: Vec::new(),
            support: default_support(),
            depth_format: vk::Format::D32_SFLOAT,
            swapchain_images: HashMap::new(),
            acquire_count: 0,
            present_count: 0,
            next_image: 0,
            scripted_acquires: HashMap::new(),
            scripted_presents: HashMap::new(),
            failures: HashSet::new(),
        }
    }

    fn record(&mut self, call: DeviceCall) {
        tracing::trace!(?call, "device call");
        self.calls.push(call);
    }

    /// Fabricate a fresh handle and track it as live.
    fn create<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        H::from_raw(self.next_handle)
    }

    fn release<H: Handle>(&mut self, handle: H) {
        let raw = handle.as_raw();
        if !self.live.remove(&raw) {
            self.unknown_releases.push(raw);
        }
    }

    fn check(&mut self, point: FailPoint) -> ember_gpu::Result<()> {
        if self.failures.remove(&point) {
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        } else {
            Ok(())
        }
    }
}

/// Surface support of a well-behaved windowed surface: 2..=3 images, an
/// undefined current extent, sRGB BGRA and both FIFO and mailbox.
fn default_support() -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
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
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

/// Fake device handed to the code under test.
///
/// Owns the command pool; dropping it records [`DeviceCall::DestroyCommandPool`].
pub struct RecordingDevice {
    state: Arc<Mutex<State>>,
}

/// Shared view of a [`RecordingDevice`] used to script it and inspect calls.
#[derive(Clone)]
pub struct DeviceProbe {
    state: Arc<Mutex<State>>,
}

impl RecordingDevice {
    pub fn new() -> (Self, DeviceProbe) {
        let state = Arc::new(Mutex::new(State::new()));
        (
            Self {
                state: state.clone(),
            },
            DeviceProbe { state },
        )
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        self.state.lock().record(DeviceCall::DestroyCommandPool);
    }
}

impl DeviceProbe {
    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Index of the first recorded call matching `pred`.
    pub fn position(&self, what: &str, pred: impl Fn(&DeviceCall) -> bool) -> Result<usize> {
        self.state
            .lock()
            .calls
            .iter()
            .position(pred)
            .ok_or_else(|| TestError::MissingCall(what.to_string()))
    }

    /// Index of the last recorded call matching `pred`.
    pub fn last_position(&self, what: &str, pred: impl Fn(&DeviceCall) -> bool) -> Result<usize> {
        self.state
            .lock()
            .calls
            .iter()
            .rposition(pred)
            .ok_or_else(|| TestError::MissingCall(what.to_string()))
    }

    /// Extents of every swapchain create call, in order.
    pub fn swapchain_extents(&self) -> Vec<vk::Extent2D> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::CreateSwapchain { extent, .. } => Some(*extent),
                _ => None,
            })
            .collect()
    }

    /// Number of handles created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Raw handles destroyed that were never created or were destroyed twice.
    pub fn unknown_releases(&self) -> Vec<u64> {
        self.state.lock().unknown_releases.clone()
    }

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        self.state.lock().support = support;
    }

    pub fn set_image_count_bounds(&self, min: u32, max: u32) {
        let mut state = self.state.lock();
        state.support.capabilities.min_image_count = min;
        state.support.capabilities.max_image_count = max;
    }

    /// Set the surface's current extent. `None` leaves it undefined so the
    /// requested extent is used.
    pub fn set_current_extent(&self, extent: Option<vk::Extent2D>) {
        self.state.lock().support.capabilities.current_extent = extent.unwrap_or(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state.lock().support.formats = formats;
    }

    pub fn set_depth_format(&self, format: vk::Format) {
        self.state.lock().depth_format = format;
    }

    /// Make the `n`th acquire call (0-based) return `outcome`.
    pub fn script_acquire(&self, n: usize, outcome: AcquireOutcome) {
        self.state.lock().scripted_acquires.insert(n, outcome);
    }

    /// Make the `n`th present call (0-based) return `outcome`.
    pub fn script_present(&self, n: usize, outcome: PresentOutcome) {
        self.state.lock().scripted_presents.insert(n, outcome);
    }

    /// Make the next call of the given kind fail with out-of-memory.
    pub fn fail_next(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }
}

impl PresentDevice for RecordingDevice {
    fn surface_support(&self) -> ember_gpu::Result<SurfaceSupport> {
        let mut state = self.state.lock();
        state.record(DeviceCall::SurfaceSupport);
        Ok(state.support.clone())
    }

    fn depth_format(&self) -> ember_gpu::Result<vk::Format> {
        Ok(self.state.lock().depth_format)
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> ember_gpu::Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateSwapchain)?;

        let swapchain: vk::SwapchainKHR = state.create();
        // Images are owned by the swapchain, not tracked as live objects
        let images = (0..desc.min_image_count)
            .map(|i| vk::Image::from_raw(swapchain.as_raw() * 0x100 + u64::from(i)))
            .collect();
        state.swapchain_images.insert(swapchain, images);
        state.next_image = 0;

        state.record(DeviceCall::CreateSwapchain {
            swapchain,
            old_swapchain,
            extent: desc.extent,
            min_image_count: desc.min_image_count,
            format: desc.surface_format.format,
            present_mode: desc.present_mode,
        });
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> ember_gpu::Result<Vec<vk::Image>> {
        self.state
            .lock()
            .swapchain_images
            .get(&swapchain)
            .cloned()
            .ok_or_else(|| GpuError::InvalidState(format!("Unknown swapchain {swapchain:?}")))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.swapchain_images.remove(&swapchain);
        state.release(swapchain);
        state.record(DeviceCall::DestroySwapchain(swapchain));
    }

    fn create_color_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> ember_gpu::Result<vk::ImageView> {
        let mut state = self.state.lock();
        let view = state.create();
        state.record(DeviceCall::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock();
        state.release(view);
        state.record(DeviceCall::DestroyImageView(view));
    }

    fn create_depth_attachment(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> ember_gpu::Result<DepthAttachment> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateDepthAttachment)?;

        let image = state.create();
        let view = state.create();
        state.record(DeviceCall::CreateDepthAttachment {
            image,
            view,
            format,
        });

        Ok(DepthAttachment {
            image: GpuImage {
                image,
                allocation: None,
                format,
                extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            },
            view,
        })
    }

    fn destroy_depth_attachment(&self, attachment: DepthAttachment) {
        let mut state = self.state.lock();
        let image = attachment.image.image;
        state.release(attachment.view);
        state.release(image);
        state.record(DeviceCall::DestroyDepthAttachment {
            image,
            view: attachment.view,
        });
    }

    fn create_render_pass(
        &self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> ember_gpu::Result<vk::RenderPass> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateRenderPass)?;

        let render_pass = state.create();
        state.record(DeviceCall::CreateRenderPass {
            render_pass,
            color_format,
            depth_format,
        });
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.lock();
        state.release(render_pass);
        state.record(DeviceCall::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> ember_gpu::Result<vk::Framebuffer> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateFramebuffer)?;

        let framebuffer = state.create();
        state.record(DeviceCall::CreateFramebuffer {
            framebuffer,
            attachments: attachments.to_vec(),
            extent,
        });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        state.release(framebuffer);
        state.record(DeviceCall::DestroyFramebuffer(framebuffer));
    }

    fn create_semaphore(&self) -> ember_gpu::Result<vk::Semaphore> {
        let mut state = self.state.lock();
        let semaphore = state.create();
        state.record(DeviceCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        state.release(semaphore);
        state.record(DeviceCall::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> ember_gpu::Result<vk::Fence> {
        let mut state = self.state.lock();
        state.check(FailPoint::CreateFence)?;

        let fence = state.create();
        state.record(DeviceCall::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.release(fence);
        state.record(DeviceCall::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> ember_gpu::Result<()> {
        self.state.lock().record(DeviceCall::WaitForFence(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> ember_gpu::Result<()> {
        self.state.lock().record(DeviceCall::ResetFence(fence));
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> ember_gpu::Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| state.create()).collect();
        state.record(DeviceCall::AllocateCommandBuffers(buffers.clone()));
        Ok(buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for &buffer in command_buffers {
            state.release(buffer);
        }
        state.record(DeviceCall::FreeCommandBuffers(command_buffers.to_vec()));
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> ember_gpu::Result<()> {
        self.state
            .lock()
            .record(DeviceCall::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> ember_gpu::Result<()> {
        self.state
            .lock()
            .record(DeviceCall::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state.lock().record(DeviceCall::BeginRenderPass {
            command_buffer,
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            extent: begin.extent,
        });
    }

    fn cmd_set_viewport_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        self.state.lock().record(DeviceCall::SetViewportScissor {
            command_buffer,
            extent,
        });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state
            .lock()
            .record(DeviceCall::EndRenderPass(command_buffer));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> ember_gpu::Result<AcquireOutcome> {
        let mut state = self.state.lock();
        state.check(FailPoint::Acquire)?;
        let n = state.acquire_count;
        state.acquire_count += 1;

        let outcome = match state.scripted_acquires.remove(&n) {
            Some(outcome) => outcome,
            None => {
                let image_count = state
                    .swapchain_images
                    .get(&swapchain)
                    .map_or(0, Vec::len) as u32;
                if image_count == 0 {
                    return Err(GpuError::InvalidState(format!(
                        "Acquire from unknown swapchain {swapchain:?}"
                    )));
                }
                let image_index = state.next_image % image_count;
                state.next_image += 1;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }
        };

        state.record(DeviceCall::Acquire {
            swapchain,
            semaphore: signal,
            outcome,
        });
        Ok(outcome)
    }

    fn submit(&self, submission: &FrameSubmission) -> ember_gpu::Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Submit)?;
        state.record(DeviceCall::Submit(*submission));
        Ok(())
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ember_gpu::Result<PresentOutcome> {
        let mut state = self.state.lock();
        state.check(FailPoint::Present)?;

        let n = state.present_count;
        state.present_count += 1;
        let outcome = state
            .scripted_presents
            .remove(&n)
            .unwrap_or(PresentOutcome::Presented);

        state.record(DeviceCall::Present {
            swapchain,
            image_index,
            wait,
            outcome,
        });
        Ok(outcome)
    }

    fn wait_idle(&self) -> ember_gpu::Result<()> {
        self.state.lock().record(DeviceCall::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroying_unknown_handles_is_reported() {
        let (device, probe) = RecordingDevice::new();
        let semaphore = device.create_semaphore().unwrap();
        assert_eq!(probe.live_objects(), 1);

        device.destroy_semaphore(semaphore);
        device.destroy_semaphore(semaphore);
        assert_eq!(probe.live_objects(), 0);
        assert_eq!(probe.unknown_releases(), vec![semaphore.as_raw()]);
    }

    #[test]
    fn failure_points_fire_once() {
        let (device, probe) = RecordingDevice::new();
        probe.fail_next(FailPoint::CreateFence);

        assert!(device.create_fence(true).is_err());
        assert!(device.create_fence(true).is_ok());
    }

    #[test]
    fn acquire_cycles_images_unless_scripted() {
        let (device, probe) = RecordingDevice::new();
        let support = device.surface_support().unwrap();
        let desc = SwapchainDesc {
            min_image_count: 3,
            surface_format: support.formats[0],
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        };
        let swapchain = device
            .create_swapchain(&desc, vk::SwapchainKHR::null())
            .unwrap();
        let semaphore = device.create_semaphore().unwrap();
        probe.script_acquire(1, AcquireOutcome::OutOfDate);

        let outcomes: Vec<_> = (0..4)
            .map(|_| device.acquire_next_image(swapchain, semaphore).unwrap())
            .collect();
        let indices: Vec<_> = outcomes
            .iter()
            .map(|outcome| match outcome {
                AcquireOutcome::Acquired { image_index, .. } => Some(*image_index),
                AcquireOutcome::OutOfDate => None,
            })
            .collect();
        assert_eq!(indices, vec![Some(0), None, Some(1), Some(2)]);
    }

    #[test]
    fn dropping_the_device_destroys_the_pool() {
        let (device, probe) = RecordingDevice::new();
        drop(device);
        assert_eq!(probe.calls(), vec![DeviceCall::DestroyCommandPool]);
    }
}
