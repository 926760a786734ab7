//! Application framework for the Ember engine.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - GPU context initialization
//! - Swapchain creation and recreation
//! - Frame synchronization and per-frame uniforms
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{EmberApp, AppContext, FrameContext, AppConfig, run_app};
//!
//! struct MyApp {
//!     // Application state
//! }
//!
//! impl EmberApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp {})
//!     }
//!
//!     fn update(&mut self, ctx: &mut AppContext, dt: f32) {
//!         // Update logic
//!     }
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &FrameContext<'_>) -> anyhow::Result<()> {
//!         // Draw calls inside the swapchain render pass
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::EmberApp;
pub use context::{AppContext, Frames};
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use ember_gpu::{GpuContext, SurfaceInfo};
pub use ember_render::{Camera, FrameContext, Lighting};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
