//! `EmberApp` trait definition.

use crate::context::AppContext;
use ember_gpu::SurfaceInfo;
use ember_render::FrameContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Trait for Ember applications.
///
/// Implement this trait to create a new application using the Ember engine.
/// The framework handles window creation, GPU initialization, the swapchain
/// lifecycle and the event loop.
pub trait EmberApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and first swapchain exist.
    /// Pipelines can be built against `ctx.frames.render_pass()` here.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering. The camera in `ctx` is uploaded to
    /// the frame's uniform buffer after this returns.
    ///
    /// # Arguments
    /// * `ctx` - Application context with GPU and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Record draw commands for one frame.
    ///
    /// Called inside the swapchain render pass with viewport and scissor
    /// already set. The frame's scene uniforms are bound to
    /// `frame.global_descriptor_set`.
    fn render(&mut self, ctx: &AppContext, frame: &FrameContext<'_>) -> anyhow::Result<()>;

    /// Called after the swapchain was rebuilt.
    ///
    /// Pipelines created against the previous render pass should be
    /// recreated here. The camera aspect ratio has already been updated.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_surface_rebuilt(
        &mut self,
        ctx: &mut AppContext,
        surface: &SurfaceInfo,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Called for each window event. Return `true` if the event was
    /// handled and should not be processed further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Cleanup resources before shutdown.
    ///
    /// Called when the application is about to exit. The GPU will be
    /// idle when this is called, so it's safe to destroy GPU resources.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
