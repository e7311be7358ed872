use scenegraph_common::Color;

pub const MIN_TESSELLATION_LEVEL: u32 = 1;
pub const MAX_TESSELLATION_LEVEL: u32 = 16;
/// Upper bound on subdivisions per triangle edge.
pub const MAX_SEGMENTS: u32 = 64;

/// Global knobs that shape every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Scalar ambient term, added to the radiance of ambient lights.
    pub ambient: f32,
    pub show_triangulation: bool,
    pub clear_color: Color,
    /// World units a fully white displacement texel pushes a vertex out.
    pub displacement_scale: f32,
    /// Set by the renderer once a skybox is resident.
    pub skybox: bool,
    tessellation_level: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            show_triangulation: false,
            clear_color: Color::rgb(0.02, 0.02, 0.03),
            displacement_scale: 1.0,
            skybox: false,
            tessellation_level: MIN_TESSELLATION_LEVEL,
        }
    }
}

impl RenderSettings {
    pub fn tessellation_level(&self) -> u32 {
        self.tessellation_level
    }

    /// Returns the new level.
    pub fn increase_tessellation_level(&mut self) -> u32 {
        self.tessellation_level = (self.tessellation_level + 1).min(MAX_TESSELLATION_LEVEL);
        self.tessellation_level
    }

    pub fn decrease_tessellation_level(&mut self) -> u32 {
        self.tessellation_level = self
            .tessellation_level
            .saturating_sub(1)
            .max(MIN_TESSELLATION_LEVEL);
        self.tessellation_level
    }

    /// Subdivisions per edge for an object with `patches`.
    pub fn segments_for(&self, patches: u32) -> u32 {
        patches
            .saturating_mul(self.tessellation_level)
            .clamp(1, MAX_SEGMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tessellation_level_is_clamped() {
        let mut s = RenderSettings::default();
        assert_eq!(s.decrease_tessellation_level(), 1);
        for _ in 0..40 {
            s.increase_tessellation_level();
        }
        assert_eq!(s.tessellation_level(), MAX_TESSELLATION_LEVEL);
        assert_eq!(s.decrease_tessellation_level(), 15);
    }

    #[test]
    fn segments_scale_with_level() {
        let mut s = RenderSettings::default();
        assert_eq!(s.segments_for(4), 4);
        s.increase_tessellation_level();
        assert_eq!(s.segments_for(4), 8);
        for _ in 0..20 {
            s.increase_tessellation_level();
        }
        assert_eq!(s.segments_for(4), MAX_SEGMENTS);
        assert_eq!(s.segments_for(0), 1);
    }
}
