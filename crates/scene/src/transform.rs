use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Reference up vector used by `look_at`.
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Position and orientation relative to the parent node (or the world for
/// roots).
///
/// Forward is local -Z, up is +Y, right is +X. The rotation is renormalised
/// after every operation that rotates, so the derived basis stays
/// orthonormal no matter how many small rotations are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformNode {
    position: Vec3,
    rotation: Quat,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl TransformNode {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    /// Move by `delta` expressed in the parent's space.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Move by `delta` expressed along this node's own axes.
    pub fn translate_local(&mut self, delta: Vec3) {
        self.position += self.rotation * delta;
    }

    /// Rotate about an axis given in the parent's space, around this node's
    /// own origin. A zero axis is ignored.
    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        if let Some(axis) = axis.try_normalize() {
            self.rotation = (Quat::from_axis_angle(axis, angle) * self.rotation).normalize();
        }
    }

    /// Rotate about an axis given in this node's own space.
    pub fn rotate_local(&mut self, axis: Vec3, angle: f32) {
        if let Some(axis) = axis.try_normalize() {
            self.rotation = (self.rotation * Quat::from_axis_angle(axis, angle)).normalize();
        }
    }

    /// Orbit `pivot` about `axis`: the pivot-relative offset is rotated and
    /// the orientation turns with it.
    pub fn rotate_around(&mut self, axis: Vec3, pivot: Vec3, angle: f32) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        let q = Quat::from_axis_angle(axis, angle);
        self.position = pivot + q * (self.position - pivot);
        self.rotation = (q * self.rotation).normalize();
    }

    /// Turn so forward points at `target`. Returns `false` (and leaves the
    /// node untouched) when the target coincides with the position.
    pub fn look_at(&mut self, target: Vec3) -> bool {
        self.look_towards(target - self.position)
    }

    /// Turn so forward points along `direction`.
    pub fn look_towards(&mut self, direction: Vec3) -> bool {
        let Some(forward) = direction.try_normalize() else {
            return false;
        };
        // World up unless forward is (anti)parallel to it.
        let hints = [WORLD_UP, self.up(), Vec3::NEG_Z, Vec3::X];
        match hints.iter().find_map(|&up| look_rotation(forward, up)) {
            Some(rotation) => {
                self.rotation = rotation;
                true
            }
            None => false,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn inverse(&self) -> Self {
        let inv = self.rotation.conjugate();
        Self {
            position: -(inv * self.position),
            rotation: inv,
        }
    }

    /// `parent` applied after `self`: the result maps this node's space
    /// straight into the parent's parent space.
    pub fn then(&self, parent: &TransformNode) -> Self {
        Self {
            position: parent.position + parent.rotation * self.position,
            rotation: (parent.rotation * self.rotation).normalize(),
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position + self.rotation * p
    }
}

fn look_rotation(forward: Vec3, up_hint: Vec3) -> Option<Quat> {
    let right = forward.cross(up_hint).try_normalize()?;
    let up = right.cross(forward);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn assert_orthonormal(t: &TransformNode) {
        let (f, u, r) = (t.forward(), t.up(), t.right());
        assert_relative_eq!(f.length(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(u.length(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(r.length(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(f.dot(u), 0.0, epsilon = 1e-4);
        assert_relative_eq!(f.dot(r), 0.0, epsilon = 1e-4);
        assert_relative_eq!(u.dot(r), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn default_basis() {
        let t = TransformNode::default();
        assert_eq!(t.forward(), Vec3::NEG_Z);
        assert_eq!(t.up(), Vec3::Y);
        assert_eq!(t.right(), Vec3::X);
    }

    #[test]
    fn translate_local_follows_orientation() {
        let mut t = TransformNode::default();
        t.rotate(Vec3::Y, FRAC_PI_2);
        t.translate_local(Vec3::NEG_Z);
        assert!(t.position().abs_diff_eq(Vec3::NEG_X, 1e-6));
    }

    #[test]
    fn rotate_around_moves_position() {
        let mut t = TransformNode::from_position(Vec3::new(0.0, 0.0, 10.0));
        t.rotate_around(Vec3::Y, Vec3::ZERO, FRAC_PI_2);
        assert!(t.position().abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn rotate_around_keeps_basis_orthonormal() {
        let mut t = TransformNode::from_position(Vec3::new(3.0, 30.0, 55.0));
        t.look_at(Vec3::ZERO);
        // Deterministic pseudo-random walk over axes and angles.
        let mut seed = 0x2545_f491_u32;
        for _ in 0..20_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let a = (seed % 1000) as f32 / 1000.0 * 2.0 * PI;
            let axis = Vec3::new(a.cos(), (a * 1.7).sin(), (a * 0.3).cos());
            let pivot = Vec3::new(a.sin(), 0.0, a.cos()) * 4.0;
            t.rotate_around(axis, pivot, a * 0.01);
            let right = t.right();
            t.rotate_around(-right, Vec3::ZERO, 0.003);
        }
        assert_orthonormal(&t);
        assert_relative_eq!(t.rotation().length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let mut t = TransformNode::from_position(Vec3::new(0.0, 30.0, 55.0));
        let target = Vec3::new(4.0, -2.0, 1.0);
        assert!(t.look_at(target));
        let expected = (target - t.position()).normalize();
        assert!(t.forward().abs_diff_eq(expected, 1e-5));
        assert_relative_eq!(t.right().y, 0.0, epsilon = 1e-6);
        assert_orthonormal(&t);
    }

    #[test]
    fn look_at_own_position_is_noop() {
        let mut t = TransformNode::from_position(Vec3::ONE);
        t.rotate(Vec3::X, 0.4);
        let before = t;
        assert!(!t.look_at(Vec3::ONE));
        assert_eq!(t, before);
        assert!(!t.forward().is_nan());
    }

    #[test]
    fn look_at_straight_down_uses_fallback_up() {
        let mut t = TransformNode::from_position(Vec3::new(0.0, 10.0, 0.0));
        assert!(t.look_at(Vec3::ZERO));
        assert!(t.forward().abs_diff_eq(Vec3::NEG_Y, 1e-6));
        assert_orthonormal(&t);
    }

    #[test]
    fn inverse_round_trips() {
        let mut t = TransformNode::from_position(Vec3::new(1.0, 2.0, 3.0));
        t.rotate(Vec3::new(1.0, 1.0, 0.0), 0.7);
        let p = Vec3::new(-4.0, 0.5, 9.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!(back.abs_diff_eq(p, 1e-5));
        assert!(t.matrix().inverse().abs_diff_eq(t.inverse().matrix(), 1e-5));
    }

    #[test]
    fn then_matches_matrix_product() {
        let mut parent = TransformNode::from_position(Vec3::new(5.0, 0.0, 0.0));
        parent.rotate(Vec3::Y, 0.9);
        let mut child = TransformNode::from_position(Vec3::new(0.0, 9.85, 1.0));
        child.rotate(Vec3::X, -0.3);
        let composed = child.then(&parent);
        assert!(composed.matrix().abs_diff_eq(parent.matrix() * child.matrix(), 1e-5));
    }
}
