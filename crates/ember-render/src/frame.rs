//! Per-tick frame context handed to render code.

use ash::vk;

use crate::camera::Camera;

/// Everything render code needs to record one frame.
///
/// Only valid between `begin_frame` and `end_frame`; the borrow of the camera
/// keeps it from outliving the tick.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    /// In-flight slot, in `[0, MAX_FRAMES_IN_FLIGHT)`.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    /// Per-frame descriptor set holding the scene uniforms at binding 0.
    pub global_descriptor_set: vk::DescriptorSet,
    pub camera: &'a Camera,
}
