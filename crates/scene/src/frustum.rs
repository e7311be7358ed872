use glam::{Mat4, Vec3, Vec4};

/// Half-space boundary in point+normal form.
///
/// `distance` is the projection of any point on the plane onto `normal`.
/// Normals point out of the enclosed volume, so a point is inside when its
/// signed distance is not positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.try_normalize().unwrap_or(Vec3::Y);
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Build from a clip-space row combination `(a, b, c, w)` whose positive
    /// side is inside, flipping it to an outward normal.
    fn from_inward_row(row: Vec4) -> Self {
        let len = row.truncate().length();
        if len <= f32::EPSILON {
            return Self::default();
        }
        Self {
            normal: -row.truncate() / len,
            distance: row.w / len,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// The six planes bounding what a camera or light can see.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    pub top: Plane,
    pub bottom: Plane,
    pub right: Plane,
    pub left: Plane,
    pub far: Plane,
    pub near: Plane,
}

impl Frustum {
    /// Extract the planes of a view-projection matrix with a 0..1 depth
    /// range (Gribb-Hartmann).
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self {
            left: Plane::from_inward_row(r3 + r0),
            right: Plane::from_inward_row(r3 - r0),
            bottom: Plane::from_inward_row(r3 + r1),
            top: Plane::from_inward_row(r3 - r1),
            near: Plane::from_inward_row(r2),
            far: Plane::from_inward_row(r3 - r2),
        }
    }

    pub fn planes(&self) -> [&Plane; 6] {
        [
            &self.top,
            &self.bottom,
            &self.right,
            &self.left,
            &self.far,
            &self.near,
        ]
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes()
            .iter()
            .all(|p| p.signed_distance(point) <= 0.0)
    }

    /// Conservative sphere test: `false` only when the sphere is entirely
    /// outside one of the planes.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes()
            .iter()
            .all(|p| p.signed_distance(center) <= radius)
    }
}
