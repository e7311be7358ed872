use crate::frustum::Frustum;
use crate::transform::TransformNode;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Projection parameters. Matrices use a 0..1 depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        /// Half of the visible height.
        size: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 1.5,
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 3000.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                size,
                aspect,
                near,
                far,
            } => {
                let half_w = size * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -size, size, near, far)
            }
        }
    }

    pub fn near(&self) -> f32 {
        match *self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    pub fn far(&self) -> f32 {
        match *self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    pub fn aspect(&self) -> f32 {
        match *self {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                aspect
            }
        }
    }

    pub fn set_aspect(&mut self, value: f32) {
        match self {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                *aspect = value
            }
        }
    }

    pub fn set_depth_range(&mut self, new_near: f32, new_far: f32) {
        match self {
            Projection::Perspective { near, far, .. } | Projection::Orthographic { near, far, .. } => {
                *near = new_near;
                *far = new_far;
            }
        }
    }
}

/// Projection half of a camera; its placement is the transform node it is
/// bound to in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Camera {
    projection: Projection,
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self { projection }
    }

    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        })
    }

    pub fn orthographic(size: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic {
            size,
            aspect,
            near,
            far,
        })
    }

    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        *self = Self::perspective(fov_y, aspect, near, far);
    }

    pub fn set_orthographic(&mut self, size: f32, aspect: f32, near: f32, far: f32) {
        *self = Self::orthographic(size, aspect, near, far);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection.set_aspect(aspect);
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// View matrix for a camera placed at `world`.
    pub fn view_matrix(&self, world: &TransformNode) -> Mat4 {
        world.inverse().matrix()
    }

    pub fn view_projection(&self, world: &TransformNode) -> Mat4 {
        self.projection_matrix() * self.view_matrix(world)
    }

    /// Freshly extracted frustum for the camera placed at `world`.
    pub fn frustum(&self, world: &TransformNode) -> Frustum {
        Frustum::from_view_projection(&self.view_projection(world))
    }
}

/// Whether an orbit step of `step` around the camera's right axis may be
/// applied without flipping over a pole.
pub fn pitch_step_allowed(forward: Vec3, step: f32) -> bool {
    forward.y.abs() < 0.99 || forward.y * step > 0.0
}
