//! Per-frame scene uniform block.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::camera::Camera;

/// Scene lighting written into every frame's uniform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    /// RGB color with intensity in `w`.
    pub ambient: Vec4,
    pub light_position: Vec3,
    /// RGB color with intensity in `w`.
    pub light_color: Vec4,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(1.0, 1.0, 1.0, 0.02),
            light_position: Vec3::splat(-1.0),
            light_color: Vec4::ONE,
        }
    }
}

/// Uniform buffer data shared by every draw of a frame (binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub ambient_light_color: [f32; 4],
    /// xyz position, w unused.
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
}

impl SceneUniforms {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Fill the block from a camera and the scene lighting.
    pub fn new(camera: &Camera, lighting: &Lighting) -> Self {
        Self {
            projection: camera.projection_matrix().to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            ambient_light_color: lighting.ambient.to_array(),
            light_position: lighting.light_position.extend(0.0).to_array(),
            light_color: lighting.light_color.to_array(),
        }
    }
}

impl Default for SceneUniforms {
    fn default() -> Self {
        let lighting = Lighting::default();
        Self {
            projection: glam::Mat4::IDENTITY.to_cols_array_2d(),
            view: glam::Mat4::IDENTITY.to_cols_array_2d(),
            ambient_light_color: lighting.ambient.to_array(),
            light_position: lighting.light_position.extend(0.0).to_array(),
            light_color: lighting.light_color.to_array(),
        }
    }
}
