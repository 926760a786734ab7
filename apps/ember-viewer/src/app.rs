//! Viewer application: clear-only rendering with an orbiting camera.

use glam::Vec3;
use tracing::info;

use ember_app::{AppContext, EmberApp, FrameContext, SurfaceInfo};

/// Orbit radius around the origin.
const ORBIT_RADIUS: f32 = 6.0;

/// Orbit angular speed in radians per second.
const ORBIT_SPEED: f32 = 0.4;

/// Camera height above the orbit plane.
const ORBIT_HEIGHT: f32 = 2.0;

/// Viewer application state.
pub struct Viewer {
    /// Current orbit angle in radians.
    angle: f32,
    /// Swapchain generations seen so far, including the first.
    rebuilds: u64,
}

impl Viewer {
    fn orbit_position(&self) -> Vec3 {
        Vec3::new(
            ORBIT_RADIUS * self.angle.cos(),
            ORBIT_HEIGHT,
            ORBIT_RADIUS * self.angle.sin(),
        )
    }
}

impl EmberApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let extent = ctx.frames.extent();
        info!(
            width = extent.width,
            height = extent.height,
            images = ctx.frames.image_count(),
            color_format = ?ctx.frames.color_format(),
            depth_format = ?ctx.frames.depth_format(),
            "Viewer initialized"
        );

        let viewer = Self {
            angle: 0.0,
            rebuilds: 1,
        };
        ctx.camera.set_aspect(ctx.aspect_ratio());
        ctx.camera
            .set_view_target(viewer.orbit_position(), Vec3::ZERO, Vec3::Y);

        Ok(viewer)
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        self.angle = (self.angle + ORBIT_SPEED * dt) % std::f32::consts::TAU;
        ctx.camera
            .set_view_target(self.orbit_position(), Vec3::ZERO, Vec3::Y);
        ctx.lighting.light_position = self.orbit_position() + Vec3::Y * ORBIT_HEIGHT;
    }

    fn render(&mut self, _ctx: &AppContext, _frame: &FrameContext<'_>) -> anyhow::Result<()> {
        // The render pass clears the swapchain; nothing else to draw
        Ok(())
    }

    fn on_surface_rebuilt(
        &mut self,
        _ctx: &mut AppContext,
        surface: &SurfaceInfo,
    ) -> anyhow::Result<()> {
        self.rebuilds += 1;
        info!(
            generation = surface.generation,
            width = surface.extent.width,
            height = surface.extent.height,
            rebuilds = self.rebuilds,
            "Swapchain recreated"
        );
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!(
            frames = ctx.frame_count,
            generations = self.rebuilds,
            "Viewer shutting down"
        );
    }
}
