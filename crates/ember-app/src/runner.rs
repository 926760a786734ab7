//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use ember_gpu::{FrameConfig, GpuContextBuilder};
use ember_platform::{create_window, PlatformConfig};
use ember_render::{FrameContext, SceneUniforms};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::app::EmberApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Swapchain clear color.
    pub clear_color: [f32; 4],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            clear_color: FrameConfig::default().clear_color,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the color the swapchain is cleared to each frame.
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: true,
        }
    }

    fn frame(&self) -> FrameConfig {
        FrameConfig {
            vsync: self.vsync,
            clear_color: self.clear_color,
        }
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run an `EmberApp` with the given configuration.
///
/// This function initializes logging, creates the window and GPU context,
/// and runs the event loop until the application exits.
pub fn run_app<A: EmberApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    event_loop
        .run_app(&mut runner)
        .context("Event loop error")?;

    Ok(())
}

fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,ember_app=trace,ember_render=trace,ember_gpu=trace,ember_viewer=trace")
        });
        let tracy_layer = tracing_tracy::TracyLayer::default();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracy_layer)
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: EmberApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: EmberApp> {
    // Declared first so the app is dropped before the context it was built from
    app: A,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
}

impl<A: EmberApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &self.state {
                    debug!(width = size.width, height = size.height, "Window resized");
                    state.ctx.frames.window().mark_resized();
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window().request_redraw();
        }
    }
}

impl<A: EmberApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window = create_window(event_loop, &self.config.platform())?;

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()
            .context("Failed to create GPU context")?;

        // SAFETY: the window was just created by the running event loop
        let mut ctx = unsafe { AppContext::new(window, Arc::new(gpu), self.config.frame())? };

        // The initial swapchain is reported to the app through init
        let _ = ctx.frames.take_generation_changed();

        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            target_frame_time: self.config.target_frame_time(),
        })
    }
}

impl<A: EmberApp> AppState<A> {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let size = self.ctx.window().inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized; nothing to present
            return Ok(());
        }

        let dt = self.ctx.timer.tick();
        self.app.update(&mut self.ctx, dt);

        let Some(command_buffer) = self
            .ctx
            .frames
            .begin_frame()
            .context("Failed to begin frame")?
        else {
            debug!("Frame skipped after swapchain rebuild");
            return self.handle_surface_change();
        };

        let frame_index = self.ctx.frames.frame_index();
        let uniforms = SceneUniforms::new(&self.ctx.camera, &self.ctx.lighting);
        self.ctx
            .resources
            .write(frame_index, &uniforms)
            .context("Failed to write scene uniforms")?;

        self.ctx.frames.begin_render_pass(command_buffer);
        {
            let frame = FrameContext {
                frame_index,
                frame_time: dt,
                command_buffer,
                global_descriptor_set: self.ctx.resources.descriptor_set(frame_index),
                camera: &self.ctx.camera,
            };
            self.app.render(&self.ctx, &frame)?;
        }
        self.ctx.frames.end_render_pass(command_buffer);

        self.ctx.frames.end_frame().context("Failed to end frame")?;
        self.ctx.frame_count += 1;

        self.handle_surface_change()?;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    /// Propagate a swapchain rebuild to the camera and the application.
    fn handle_surface_change(&mut self) -> anyhow::Result<()> {
        let Some(surface) = self.ctx.frames.take_generation_changed() else {
            return Ok(());
        };

        info!(
            generation = surface.generation,
            width = surface.extent.width,
            height = surface.extent.height,
            "Surface rebuilt"
        );

        self.ctx.camera.set_aspect(self.ctx.frames.aspect_ratio());
        self.app
            .on_surface_rebuilt(&mut self.ctx, &surface)
            .context("Application failed to handle surface rebuild")
    }

    fn cleanup(&mut self) {
        let stats = self.ctx.timer.stats();
        if let Some(avg_fps) = stats.average_fps() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", stats.min_fps);
            info!("  Max: {:.1}", stats.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        info!("Cleanup complete");
    }
}
