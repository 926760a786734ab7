//! Scene-side rendering support for the Ember engine.
//!
//! This crate provides:
//! - Camera and projection management
//! - The per-frame scene uniform block
//! - Per-frame uniform buffers and descriptor sets
//! - The frame context handed to render code each tick

pub mod camera;
pub mod frame;
pub mod frame_resources;
pub mod uniforms;

pub use camera::{Camera, Projection};
pub use frame::FrameContext;
pub use frame_resources::FrameResources;
pub use uniforms::{Lighting, SceneUniforms};
