//! Camera and view management.
//!
//! Right-handed view space looking down `-Z` with `+Y` up. Projections map
//! depth to `0..1` and flip Y for Vulkan's downward clip-space Y axis.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// Camera for rendering.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(50f32.to_radians(), 16.0 / 9.0, 0.1, 100.0)
    }
}

impl Camera {
    /// Perspective camera at the origin looking down `-Z`.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            },
        }
    }

    /// Orthographic camera at the origin looking down `-Z`.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            },
        }
    }

    /// Update the aspect ratio after the surface changed size.
    ///
    /// Orthographic cameras keep their vertical extent and widen or narrow
    /// horizontally around the center.
    pub fn set_aspect(&mut self, aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect: a, .. } => *a = aspect,
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => {
                let half_width = (*top - *bottom) * aspect * 0.5;
                let center = (*left + *right) * 0.5;
                *left = center - half_width;
                *right = center + half_width;
            }
        }
    }

    /// Place the camera at `position` looking along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        self.position = position;
        self.direction = direction.normalize();
        self.up = up;
    }

    /// Place the camera at `position` looking at `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Place the camera at `position` with Tait-Bryan angles applied in Y, X, Z order.
    ///
    /// `rotation` is (pitch, yaw, roll) in radians, stored as (x, y, z).
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        self.position = position;
        self.direction = orientation * Vec3::NEG_Z;
        self.up = orientation * Vec3::Y;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        };
        projection.y_axis.y = -projection.y_axis.y;
        projection
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
