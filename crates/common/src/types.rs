use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = self.0.simple().to_string();
                f.write_str(&s[..8])
            }
        }
    };
}

define_id!(
    /// Identity of a scene object (and of the transform node it owns).
    ObjectId
);
define_id!(
    /// Identity of a light stored in a scene.
    LightId
);
define_id!(
    /// Identity of a camera stored in a scene.
    CameraId
);
define_id!(
    /// Identity of a loaded model. Used as the GPU mesh cache key.
    ModelId
);

/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn scaled(self, k: f32) -> Self {
        Self::rgb(self.r * k, self.g * k, self.b * k)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl From<[f32; 3]> for Color {
    fn from(c: [f32; 3]) -> Self {
        Color::rgb(c[0], c[1], c[2])
    }
}

impl From<Vec3> for Color {
    fn from(v: Vec3) -> Self {
        Color::rgb(v.x, v.y, v.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_uniqueness() {
        assert_ne!(ObjectId::new(), ObjectId::new());
        assert_ne!(LightId::new(), LightId::new());
    }

    #[test]
    fn id_display_is_short() {
        let id = ObjectId::new();
        assert_eq!(id.to_string().len(), 8);
        assert!(id.0.simple().to_string().starts_with(&id.to_string()));
    }

    #[test]
    fn color_scaling() {
        let c = Color::rgb(1.0, 0.6, 0.0).scaled(2.0);
        assert_eq!(c.to_array(), [2.0, 1.2, 0.0]);
    }

    #[test]
    fn color_serde() {
        let c = Color::rgb(0.1, 0.2, 0.3);
        let json = serde_json::to_string(&c).unwrap();
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
