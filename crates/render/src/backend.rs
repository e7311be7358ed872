use crate::RenderError;
use crate::plan::{DrawPath, FramePlan, PlannedLight};
use scenegraph_scene::ShadowView;
use std::fmt::Write;

/// Executes frame plans. All backends implement this trait.
///
/// A backend reads a finished plan and produces output; it never touches
/// the scene. Planning is the only place scene state is read.
pub trait RenderBackend {
    /// The output type produced by this backend.
    type Output;

    /// Execute one frame plan.
    fn execute(&mut self, plan: &FramePlan) -> Result<Self::Output, RenderError>;
}

/// Backend producing a human-readable description of a plan.
///
/// Useful for logging and for testing planning without a GPU.
#[derive(Debug, Default)]
pub struct DebugTextBackend;

impl DebugTextBackend {
    pub fn new() -> Self {
        Self
    }
}

fn light_line(out: &mut String, kind: &str, l: &PlannedLight) {
    let _ = writeln!(
        out,
        "  {kind} [{}] pos=({:.2}, {:.2}, {:.2}) radiance=({:.2}, {:.2}, {:.2}) shadow={}",
        l.id,
        l.position.x,
        l.position.y,
        l.position.z,
        l.radiance.x,
        l.radiance.y,
        l.radiance.z,
        l.shadow.is_some()
    );
}

impl RenderBackend for DebugTextBackend {
    type Output = String;

    fn execute(&mut self, plan: &FramePlan) -> Result<String, RenderError> {
        let mut out = String::new();
        let s = &plan.stats;
        let _ = writeln!(
            out,
            "=== Frame (draws={}, culled={}, shadow passes={}, shadow draws={}) ===",
            s.draws, s.culled, s.shadow_passes, s.shadow_draws
        );

        for pass in &plan.shadow_passes {
            let shape = match pass.view {
                ShadowView::Single { .. } => "2d",
                ShadowView::Cube { .. } => "cube",
            };
            let _ = writeln!(
                out,
                "Shadow [{}] {shape} {}x{} casters={}",
                pass.light,
                pass.settings.width,
                pass.settings.height,
                pass.casters.len()
            );
        }

        let eye = plan.main.eye;
        let _ = writeln!(
            out,
            "Camera: [{}] eye=({:.1}, {:.1}, {:.1})",
            plan.main.camera, eye.x, eye.y, eye.z
        );
        let a = plan.main.lights.ambient;
        let _ = writeln!(out, "Lights: {} ambient=({:.2}, {:.2}, {:.2})", plan.main.lights.len(), a.x, a.y, a.z);
        for l in &plan.main.lights.directional {
            light_line(&mut out, "directional", l);
        }
        for l in &plan.main.lights.spot {
            light_line(&mut out, "spot", l);
        }
        for l in &plan.main.lights.point {
            light_line(&mut out, "point", l);
        }

        for draw in &plan.main.draws {
            let p = draw.world.w_axis;
            let path = match draw.path {
                DrawPath::Standard => "standard".to_string(),
                DrawPath::Displaced { segments } => format!("displaced x{segments}"),
            };
            let _ = writeln!(
                out,
                "  [{}] pos=({:.2}, {:.2}, {:.2}) {path} lit={}",
                draw.object, p.x, p.y, p.z, draw.flags.lit
            );
        }
        if plan.skybox {
            out.push_str("Skybox\n");
        }
        if plan.wireframe {
            out.push_str("Wireframe overlay\n");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FramePlanner;
    use crate::registry::Registry;
    use crate::settings::RenderSettings;
    use glam::Vec3;
    use scenegraph_assets::{Material, primitives};
    use scenegraph_scene::{Camera, Light, RenderFlags, Scene, SceneObject, ShadowSettings};
    use std::sync::Arc;

    fn plan_for(scene: &mut Scene, registry: &Registry, settings: &RenderSettings) -> FramePlan {
        let camera = scene.spawn_camera(Camera::perspective(1.2, 1.0, 0.1, 100.0));
        let node = scene.camera_node(camera).unwrap();
        scene.set_global_position(node, Vec3::new(0.0, 10.0, 10.0)).unwrap();
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        FramePlanner::new()
            .plan(scene, registry, settings, Some(camera), None)
            .unwrap()
    }

    #[test]
    fn empty_frame() {
        let mut scene = Scene::new();
        let plan = plan_for(&mut scene, &Registry::new(), &RenderSettings::default());
        let output = DebugTextBackend::new().execute(&plan).unwrap();
        assert!(output.contains("draws=0"));
        assert!(output.contains("Lights: 0"));
        assert!(!output.contains("Skybox"));
    }

    #[test]
    fn lists_draws_and_shadow_passes() {
        let mut scene = Scene::new();
        let mut registry = Registry::new();
        let cube = Arc::new(primitives::cuboid(Vec3::ONE, Material::default()).unwrap());
        let obj = scene.spawn(
            SceneObject::new("crate")
                .with_model(cube)
                .with_flags(RenderFlags::solid()),
        );
        registry.add_object(obj);
        let lamp = scene.spawn_light(Light::point(20.0).with_shadow(ShadowSettings::cube(512, 0.05, 20.0)));
        registry.add_light(lamp);

        let mut settings = RenderSettings::default();
        settings.skybox = true;
        let plan = plan_for(&mut scene, &registry, &settings);
        let output = DebugTextBackend::new().execute(&plan).unwrap();
        assert!(output.contains("draws=1"));
        assert!(output.contains("cube 512x512 casters=1"));
        assert!(output.contains("point ["));
        assert!(output.contains("standard lit=true"));
        assert!(output.contains("Skybox"));
    }
}
