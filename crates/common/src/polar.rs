use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Spherical coordinates around the origin, used for orbit controls.
///
/// `anglex` is the azimuth around +Y measured from +Z, `angley` the
/// elevation above the XZ plane. Elevation is clamped to the poles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub anglex: f32,
    pub angley: f32,
    pub distance: f32,
}

impl Polar {
    pub fn new(anglex: f32, angley: f32, distance: f32) -> Self {
        Self {
            anglex,
            angley: angley.clamp(-FRAC_PI_2, FRAC_PI_2),
            distance,
        }
    }

    pub fn coordinates(&self) -> Vec3 {
        let (sx, cx) = self.anglex.sin_cos();
        let (sy, cy) = self.angley.sin_cos();
        self.distance * Vec3::new(cy * sx, sy, cy * cx)
    }

    pub fn rotate(&mut self, movex: f32, movey: f32) {
        self.anglex += movex;
        self.angley = (self.angley + movey).clamp(-FRAC_PI_2, FRAC_PI_2);
    }
}
