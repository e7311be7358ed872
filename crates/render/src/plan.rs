//! Frame planning: turns the scene, the registries and the settings into a
//! GPU-independent description of one frame.

use crate::RenderError;
use crate::registry::Registry;
use crate::settings::RenderSettings;
use glam::{Mat4, Vec3};
use scenegraph_assets::Model;
use scenegraph_common::{CameraId, Color, LightId, ObjectId};
use scenegraph_scene::{
    Frustum, LightKind, Projection, RenderFlags, Scene, ShadowSettings, ShadowView,
};
use std::collections::HashSet;
use std::sync::Arc;

pub const MAX_DIRECTIONAL_LIGHTS: usize = 1;
pub const MAX_SPOT_LIGHTS: usize = 2;
pub const MAX_POINT_LIGHTS: usize = 4;

/// Which pipeline family draws an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawPath {
    Standard,
    /// Subdivided on the CPU and displaced in the vertex shader.
    Displaced { segments: u32 },
}

impl DrawPath {
    pub fn segments(&self) -> u32 {
        match self {
            DrawPath::Standard => 1,
            DrawPath::Displaced { segments } => *segments,
        }
    }
}

/// One object draw with its world matrix already composed.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub object: ObjectId,
    pub model: Arc<Model>,
    pub world: Mat4,
    pub flags: RenderFlags,
    pub path: DrawPath,
}

/// A depth-only pass rendering casters from a light.
#[derive(Debug, Clone)]
pub struct ShadowPass {
    pub light: LightId,
    pub generation: u64,
    pub settings: ShadowSettings,
    pub view: ShadowView,
    pub casters: Vec<DrawItem>,
}

/// What the main pass needs to know about a light for shading.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLight {
    pub id: LightId,
    pub radiance: Vec3,
    pub position: Vec3,
    /// World forward of the light node; unused for point lights.
    pub direction: Vec3,
    /// Point light range, spot/directional far plane otherwise.
    pub range: f32,
    /// Cosine of the spot half-angle; 0 for other kinds.
    pub cos_cutoff: f32,
    pub shadow: Option<ShadowSampling>,
}

/// Parameters for sampling a light's shadow map in the main pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSampling {
    /// Light view-projection for 2D maps, identity for cube maps.
    pub view_proj: Mat4,
    pub bias: f32,
    pub near: f32,
    pub far: f32,
}

/// Lights the main pass shades with, already capped to the limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightSet {
    pub ambient: Vec3,
    pub directional: Vec<PlannedLight>,
    pub spot: Vec<PlannedLight>,
    pub point: Vec<PlannedLight>,
}

impl LightSet {
    pub fn len(&self) -> usize {
        self.directional.len() + self.spot.len() + self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: LightId) -> bool {
        self.directional
            .iter()
            .chain(&self.spot)
            .chain(&self.point)
            .any(|l| l.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct MainPass {
    pub camera: CameraId,
    pub view: Mat4,
    pub projection: Mat4,
    pub eye: Vec3,
    pub frustum: Frustum,
    pub clear_color: Color,
    pub lights: LightSet,
    pub draws: Vec<DrawItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: usize,
    pub culled: usize,
    pub shadow_passes: usize,
    pub shadow_draws: usize,
    pub dropped_lights: usize,
    /// Registered ids that are no longer in the scene.
    pub stale: usize,
}

/// Everything one frame renders, in execution order: shadow passes, the
/// main pass, then the optional skybox and wireframe overlay.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub shadow_passes: Vec<ShadowPass>,
    pub main: MainPass,
    pub skybox: bool,
    pub wireframe: bool,
    pub displacement_scale: f32,
    pub stats: FrameStats,
}

/// A light that renders a shadow map this frame.
type ShadowSource = (LightId, u64, ShadowSettings, ShadowView);

/// Builds frame plans and remembers which dropped lights were reported.
#[derive(Debug, Default)]
pub struct FramePlanner {
    warned: HashSet<LightId>,
}

impl FramePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan a frame seen through `camera`.
    ///
    /// `spot` is the designated spotlight shadow caster; it takes part even
    /// when it is not registered.
    pub fn plan(
        &mut self,
        scene: &Scene,
        registry: &Registry,
        settings: &RenderSettings,
        camera: Option<CameraId>,
        spot: Option<LightId>,
    ) -> Result<FramePlan, RenderError> {
        let camera = camera.ok_or(RenderError::NoMainCamera)?;
        let eye = scene.camera_transform(camera)?.position();
        let frustum = scene.camera_frustum(camera)?;
        let mut stats = FrameStats::default();

        let objects = self.collect_objects(scene, registry, settings, &mut stats);

        let mut draws = Vec::with_capacity(objects.len());
        for item in &objects {
            let b = item.model.bounds();
            let center = item.world.transform_point3(b.center);
            if item.flags.perform_frustum_check && !frustum.intersects_sphere(center, b.radius) {
                stats.culled += 1;
                continue;
            }
            draws.push(item.clone());
        }
        stats.draws = draws.len();

        let (lights, shadow_sources) = self.collect_lights(scene, registry, settings, spot, &mut stats)?;

        // Casters are tested against the light only, never against the camera.
        let mut shadow_passes = Vec::with_capacity(shadow_sources.len());
        for (light, generation, shadow_settings, view) in shadow_sources {
            let casters: Vec<DrawItem> = objects
                .iter()
                .filter(|item| item.flags.casts_shadows)
                .filter(|item| {
                    let b = item.model.bounds();
                    view.may_contain(item.world.transform_point3(b.center), b.radius)
                })
                .cloned()
                .collect();
            stats.shadow_draws += casters.len() * view.pass_count();
            shadow_passes.push(ShadowPass {
                light,
                generation,
                settings: shadow_settings,
                view,
                casters,
            });
        }
        stats.shadow_passes = shadow_passes.iter().map(|p| p.view.pass_count()).sum();

        Ok(FramePlan {
            shadow_passes,
            main: MainPass {
                camera,
                view: scene.camera_view(camera)?,
                projection: scene.camera_projection(camera)?,
                eye,
                frustum,
                clear_color: settings.clear_color,
                lights,
                draws,
            },
            skybox: settings.skybox,
            wireframe: settings.show_triangulation,
            displacement_scale: settings.displacement_scale,
            stats,
        })
    }

    fn collect_objects(
        &self,
        scene: &Scene,
        registry: &Registry,
        settings: &RenderSettings,
        stats: &mut FrameStats,
    ) -> Vec<DrawItem> {
        let mut items = Vec::with_capacity(registry.objects().len());
        for &id in registry.objects() {
            let Some(object) = scene.get(id) else {
                stats.stale += 1;
                continue;
            };
            // Group nodes have nothing to draw.
            let Some(model) = object.model() else {
                continue;
            };
            let Ok(world) = scene.global_matrix(id) else {
                stats.stale += 1;
                continue;
            };
            let path = match object.patches() {
                Some(patches) => DrawPath::Displaced {
                    segments: settings.segments_for(patches),
                },
                None => DrawPath::Standard,
            };
            items.push(DrawItem {
                object: id,
                model: Arc::clone(model),
                world,
                flags: object.flags,
                path,
            });
        }
        items
    }

    fn collect_lights(
        &mut self,
        scene: &Scene,
        registry: &Registry,
        settings: &RenderSettings,
        spot: Option<LightId>,
        stats: &mut FrameStats,
    ) -> Result<(LightSet, Vec<ShadowSource>), RenderError> {
        let mut set = LightSet {
            ambient: Vec3::splat(settings.ambient),
            ..LightSet::default()
        };
        let mut shadows = Vec::new();

        let mut ids: Vec<LightId> = registry.lights().to_vec();
        if let Some(spot) = spot {
            if !ids.contains(&spot) {
                ids.push(spot);
            }
        }

        for id in ids {
            let Some(light) = scene.light(id) else {
                stats.stale += 1;
                continue;
            };
            let world = scene.light_transform(id)?;
            let (bucket, limit) = match light.kind() {
                LightKind::Ambient => {
                    set.ambient += light.radiance();
                    continue;
                }
                LightKind::Directional => (&mut set.directional, MAX_DIRECTIONAL_LIGHTS),
                LightKind::Spot { .. } => (&mut set.spot, MAX_SPOT_LIGHTS),
                LightKind::Point { .. } => (&mut set.point, MAX_POINT_LIGHTS),
            };
            if bucket.len() >= limit {
                stats.dropped_lights += 1;
                if self.warned.insert(id) {
                    tracing::warn!(light = %id, kind = light.kind().name(), limit, "light limit reached, light dropped");
                }
                continue;
            }

            let view = light.shadow_view(&world);
            let shadow = match (light.shadow(), &view) {
                (Some(s), Some(ShadowView::Single { view_proj })) => Some(ShadowSampling {
                    view_proj: *view_proj,
                    bias: s.bias,
                    near: s.near,
                    far: s.far,
                }),
                (Some(s), Some(ShadowView::Cube { .. })) => Some(ShadowSampling {
                    view_proj: Mat4::IDENTITY,
                    bias: s.bias,
                    near: s.near,
                    far: s.far,
                }),
                _ => None,
            };
            let (range, cos_cutoff) = match light.kind() {
                LightKind::Point { range } => (*range, 0.0),
                LightKind::Spot { projection } => {
                    let half = match projection {
                        Projection::Perspective { fov_y, .. } => fov_y * 0.5,
                        Projection::Orthographic { .. } => 0.0,
                    };
                    (projection.far(), half.cos())
                }
                _ => (light.shadow().map_or(f32::MAX, |s| s.far), 0.0),
            };
            bucket.push(PlannedLight {
                id,
                radiance: light.radiance(),
                position: world.position(),
                direction: world.forward(),
                range,
                cos_cutoff,
                shadow,
            });
            if let (Some(s), Some(view)) = (light.shadow(), view) {
                shadows.push((id, light.shadow_generation(), *s, view));
            }
        }
        Ok((set, shadows))
    }
}
