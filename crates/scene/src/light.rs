use crate::SceneError;
use crate::camera::Projection;
use crate::frustum::Frustum;
use crate::transform::TransformNode;
use glam::{Mat4, Vec3};
use scenegraph_common::Color;
use serde::{Deserialize, Serialize};

/// Shape-specific parameters of a light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Ambient,
    /// Parallel rays along the node's forward axis.
    Directional,
    /// Omnidirectional, fading to nothing at `range`.
    Point { range: f32 },
    /// Cone along the node's forward axis; the cone is the projection's
    /// field of view.
    Spot { projection: Projection },
}

impl LightKind {
    pub fn name(&self) -> &'static str {
        match self {
            LightKind::Ambient => "ambient",
            LightKind::Directional => "directional",
            LightKind::Point { .. } => "point",
            LightKind::Spot { .. } => "spot",
        }
    }
}

/// Shadow map configuration. Cube maps for point lights use `width` for
/// every face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
    /// Depth bias subtracted before the shadow comparison.
    pub bias: f32,
    /// Half-size of the orthographic volume of a directional light.
    pub extent: f32,
}

impl ShadowSettings {
    pub fn new(width: u32, height: u32, near: f32, far: f32) -> Self {
        Self {
            width,
            height,
            near,
            far,
            bias: 0.0015,
            extent: 60.0,
        }
    }

    pub fn cube(resolution: u32, near: f32, far: f32) -> Self {
        Self::new(resolution, resolution, near, far)
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_extent(mut self, extent: f32) -> Self {
        self.extent = extent;
        self
    }
}

/// The light-space view(s) a shadow pass renders from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadowView {
    Single {
        view_proj: Mat4,
    },
    Cube {
        /// One per face, +X, -X, +Y, -Y, +Z, -Z.
        faces: [Mat4; 6],
        position: Vec3,
        near: f32,
        far: f32,
    },
}

impl ShadowView {
    pub fn pass_count(&self) -> usize {
        match self {
            ShadowView::Single { .. } => 1,
            ShadowView::Cube { .. } => 6,
        }
    }

    /// Whether a bounding sphere can contribute to this shadow map.
    pub fn may_contain(&self, center: Vec3, radius: f32) -> bool {
        match self {
            ShadowView::Single { view_proj } => {
                Frustum::from_view_projection(view_proj).intersects_sphere(center, radius)
            }
            ShadowView::Cube { position, far, .. } => center.distance(*position) <= far + radius,
        }
    }
}

/// A light source. Its placement is the transform node it is bound to in
/// the scene; this struct carries only what the light emits.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    kind: LightKind,
    color: Color,
    intensity: f32,
    shadow: Option<ShadowSettings>,
    shadow_generation: u64,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: Color::WHITE,
            intensity: 1.0,
            shadow: None,
            shadow_generation: 0,
        }
    }

    pub fn ambient(intensity: f32) -> Self {
        Self::new(LightKind::Ambient).with_intensity(intensity)
    }

    pub fn directional() -> Self {
        Self::new(LightKind::Directional)
    }

    pub fn point(range: f32) -> Self {
        Self::new(LightKind::Point { range })
    }

    pub fn spot(projection: Projection) -> Self {
        Self::new(LightKind::Spot { projection })
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Builder form of [`Light::setup_shadow_map`]; ignored with a warning
    /// for ambient lights.
    pub fn with_shadow(mut self, settings: ShadowSettings) -> Self {
        if let Err(e) = self.setup_shadow_map(settings) {
            tracing::warn!("{e}");
        }
        self
    }

    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    /// Color scaled by intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color.to_vec3() * self.intensity
    }

    /// Replace the spot cone/projection. No effect on other kinds.
    pub fn set_spot_projection(&mut self, projection: Projection) {
        if let LightKind::Spot { projection: p } = &mut self.kind {
            *p = projection;
        }
    }

    pub fn is_shadow_capable(&self) -> bool {
        !matches!(self.kind, LightKind::Ambient)
    }

    /// Request a shadow map with the given settings.
    ///
    /// Each call bumps the shadow generation; the renderer releases the
    /// light's previous target before allocating the new one.
    pub fn setup_shadow_map(&mut self, settings: ShadowSettings) -> Result<(), SceneError> {
        if !self.is_shadow_capable() {
            return Err(SceneError::ShadowUnsupported);
        }
        self.shadow = Some(settings);
        self.shadow_generation += 1;
        Ok(())
    }

    pub fn disable_shadows(&mut self) {
        if self.shadow.take().is_some() {
            self.shadow_generation += 1;
        }
    }

    pub fn shadow(&self) -> Option<&ShadowSettings> {
        self.shadow.as_ref()
    }

    pub fn shadow_generation(&self) -> u64 {
        self.shadow_generation
    }

    /// Light-space matrices for the shadow pass, if this light casts shadows.
    pub fn shadow_view(&self, world: &TransformNode) -> Option<ShadowView> {
        let s = self.shadow?;
        let view = world.inverse().matrix();
        match self.kind {
            LightKind::Ambient => None,
            LightKind::Directional => {
                let proj = Mat4::orthographic_rh(
                    -s.extent, s.extent, -s.extent, s.extent, s.near, s.far,
                );
                Some(ShadowView::Single {
                    view_proj: proj * view,
                })
            }
            LightKind::Spot { mut projection } => {
                projection.set_aspect(s.width as f32 / s.height.max(1) as f32);
                projection.set_depth_range(s.near, s.far);
                Some(ShadowView::Single {
                    view_proj: projection.matrix() * view,
                })
            }
            LightKind::Point { .. } => Some(ShadowView::Cube {
                faces: cube_face_view_projections(world.position(), s.near, s.far),
                position: world.position(),
                near: s.near,
                far: s.far,
            }),
        }
    }
}

/// View-projections for the six faces of a cube shadow map centered at
/// `position`, in +X, -X, +Y, -Y, +Z, -Z order.
///
/// Face images follow the cube sampling convention where row 0 of the +X
/// face holds +Y, hence the Y flip after projection.
pub fn cube_face_view_projections(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    let flip = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
    let proj = flip * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
    FACES.map(|(dir, up)| proj * Mat4::look_at_rh(position, position + dir, up))
}
