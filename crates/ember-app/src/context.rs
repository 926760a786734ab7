//! Application context.

use std::sync::Arc;

use ember_core::FrameTimer;
use ember_gpu::{FrameConfig, FrameOrchestrator, GpuContext, VulkanDevice};
use ember_platform::WinitSurface;
use ember_render::{Camera, FrameResources, Lighting};
use winit::window::Window;

/// The frame orchestrator as driven by the application runner.
pub type Frames = FrameOrchestrator<VulkanDevice, WinitSurface>;

/// Application context shared across all app methods.
pub struct AppContext {
    /// GPU context with device and queues.
    pub gpu: Arc<GpuContext>,
    /// Swapchain, per-frame synchronization and command buffers.
    pub frames: Frames,
    /// Per-frame scene uniform buffers and descriptor sets.
    pub resources: FrameResources,
    /// Camera uploaded into the scene uniforms every frame.
    pub camera: Camera,
    pub lighting: Lighting,
    pub timer: FrameTimer,
    /// Total frames submitted.
    pub frame_count: u64,
}

impl AppContext {
    /// Create the surface, swapchain and per-frame resources for `window`.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: Arc<GpuContext>,
        config: FrameConfig,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles; the surface
        // keeps the window alive for as long as the device exists
        let device = unsafe { VulkanDevice::new(gpu.clone(), window.as_ref())? };
        let frames = FrameOrchestrator::new(device, WinitSurface::new(window), config)?;
        let resources = FrameResources::new(&gpu)?;

        let mut camera = Camera::default();
        camera.set_aspect(frames.aspect_ratio());

        Ok(Self {
            gpu,
            frames,
            resources,
            camera,
            lighting: Lighting::default(),
            timer: FrameTimer::new(),
            frame_count: 0,
        })
    }

    /// The window handle.
    pub fn window(&self) -> &Arc<Window> {
        self.frames.window().window()
    }

    /// Get the aspect ratio (width / height) of the swapchain.
    pub fn aspect_ratio(&self) -> f32 {
        self.frames.aspect_ratio()
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::error!("Failed to wait idle: {e}");
        }
        self.resources.destroy(&self.gpu);
    }
}
