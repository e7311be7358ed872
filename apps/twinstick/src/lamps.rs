use anyhow::Result;
use glam::Vec3;
use scenegraph_assets::Model;
use scenegraph_common::{Color, LightId, ObjectId};
use scenegraph_engine::Renderer;
use scenegraph_scene::{Light, RenderFlags, Scene, SceneObject, TransformNode};
use std::sync::Arc;

/// Height of the bulb above the lamp's base.
const BULB_HEIGHT: f32 = 9.85;
const LAMP_RANGE: f32 = 20.0;
const LAMP_SHADOW_RESOLUTION: u32 = 512;

/// Lights to toggle in one swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    pub remove: [LightId; 2],
    pub add: [LightId; 2],
}

/// Four street lamps in a 2x2 grid, only one row lit at a time.
///
/// Lamps are stored in `(i, j)` order; those with `j == 0` form the top row
/// and start registered. A swap exchanges lights 0 and 2 with 1 and 3.
#[derive(Debug)]
pub struct LampRig {
    lamps: Vec<ObjectId>,
    lights: Vec<LightId>,
    top_in_scene: bool,
}

impl LampRig {
    /// Spawn the lamps and their point lights. Nothing is registered yet.
    pub fn spawn(scene: &mut Scene, model: &Arc<Model>) -> Result<Self> {
        let mut lamps = Vec::with_capacity(4);
        let mut lights = Vec::with_capacity(4);
        for i in 0..2 {
            for j in 0..2 {
                let position = Vec3::new(-27.0 + i as f32 * 54.0, 0.0, -18.0 + j as f32 * 54.0);
                let lamp = scene.spawn(
                    SceneObject::new(format!("lamp {i}{j}"))
                        .with_model(Arc::clone(model))
                        .with_flags(RenderFlags::solid())
                        .with_transform(TransformNode::from_position(position)),
                );
                let light = scene.spawn_light(
                    Light::point(LAMP_RANGE)
                        .with_intensity(2.0)
                        .with_color(Color::rgb(1.0, 0.6, 0.0)),
                );
                let node = scene.light_node(light)?;
                scene.object_mut(node)?.transform.set_position(Vec3::new(0.0, BULB_HEIGHT, 0.0));
                scene.add_child(lamp, node, true)?;
                lamps.push(lamp);
                lights.push(light);
            }
        }
        Ok(Self {
            lamps,
            lights,
            top_in_scene: true,
        })
    }

    /// Register every lamp model and the top row of lights, and give every
    /// light a cube shadow map. A light whose shadow map cannot be created
    /// stays unshadowed.
    pub fn register(&self, scene: &mut Scene, renderer: &mut Renderer) {
        for &lamp in &self.lamps {
            renderer.add_object(lamp);
        }
        for (index, &light) in self.lights.iter().enumerate() {
            if let Err(e) = renderer.setup_shadows(scene, light, LAMP_SHADOW_RESOLUTION, LAMP_SHADOW_RESOLUTION) {
                tracing::warn!(lamp = index, "lamp renders without shadows: {e}");
            }
            if self.is_top(index) == self.top_in_scene {
                renderer.add_light(light);
            }
        }
    }

    fn is_top(&self, index: usize) -> bool {
        index % 2 == 0
    }

    pub fn lamps(&self) -> &[ObjectId] {
        &self.lamps
    }

    pub fn lights(&self) -> &[LightId] {
        &self.lights
    }

    pub fn top_in_scene(&self) -> bool {
        self.top_in_scene
    }

    /// The next swap, flipping which row counts as lit.
    pub fn next_swap(&mut self) -> Swap {
        let l = &self.lights;
        let (top, bottom) = ([l[0], l[2]], [l[1], l[3]]);
        let swap = if self.top_in_scene {
            Swap { remove: top, add: bottom }
        } else {
            Swap { remove: bottom, add: top }
        };
        self.top_in_scene = !self.top_in_scene;
        swap
    }

    pub fn swap_lights(&mut self, renderer: &mut Renderer) {
        let swap = self.next_swap();
        for light in swap.remove {
            renderer.remove_light(light);
        }
        for light in swap.add {
            renderer.add_light(light);
        }
        tracing::info!(top_in_scene = self.top_in_scene, "lamps swapped");
    }
}

/// Tracks which side of the z = 0 plane a point is on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZSide {
    positive: Option<bool>,
}

impl ZSide {
    /// Record `z`; true when it crossed to the other side since the last
    /// call. Exactly zero keeps the previous side.
    pub fn crossed(&mut self, z: f32) -> bool {
        if z == 0.0 {
            return false;
        }
        let positive = z > 0.0;
        let crossed = self.positive.is_some_and(|p| p != positive);
        self.positive = Some(positive);
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scenegraph_assets::{Material, primitives};
    use scenegraph_engine::EngineConfig;

    fn rig(scene: &mut Scene) -> LampRig {
        let model = Arc::new(primitives::cuboid(Vec3::new(0.4, 10.0, 0.4), Material::default()).unwrap());
        LampRig::spawn(scene, &model).unwrap()
    }

    #[test]
    fn lamps_form_a_grid_with_bulbs_on_top() {
        let mut scene = Scene::new();
        let rig = rig(&mut scene);
        assert_eq!(rig.lamps().len(), 4);
        let first = scene.global_position(rig.lamps()[0]).unwrap();
        assert_relative_eq!(first.x, -27.0);
        assert_relative_eq!(first.z, -18.0);
        let last = scene.global_position(rig.lamps()[3]).unwrap();
        assert_relative_eq!(last.x, 27.0);
        assert_relative_eq!(last.z, 36.0);

        let bulb = scene.light_transform(rig.lights()[1]).unwrap().position();
        assert_relative_eq!(bulb.y, BULB_HEIGHT, epsilon = 1e-5);
        assert_relative_eq!(bulb.z, 36.0, epsilon = 1e-5);
    }

    #[test]
    fn swaps_alternate_between_rows() {
        let mut scene = Scene::new();
        let mut rig = rig(&mut scene);
        let l = rig.lights().to_vec();
        assert!(rig.top_in_scene());

        let first = rig.next_swap();
        assert_eq!(first.remove, [l[0], l[2]]);
        assert_eq!(first.add, [l[1], l[3]]);
        assert!(!rig.top_in_scene());

        let second = rig.next_swap();
        assert_eq!(second.remove, first.add);
        assert_eq!(second.add, first.remove);
        assert!(rig.top_in_scene());
    }

    #[test]
    fn z_side_reports_crossings_only() {
        let mut side = ZSide::default();
        assert!(!side.crossed(55.0));
        assert!(!side.crossed(20.0));
        assert!(!side.crossed(0.0));
        assert!(side.crossed(-1.0));
        assert!(!side.crossed(-3.0));
        assert!(side.crossed(2.0));
    }

    #[test]
    fn swap_updates_the_registry() {
        let Ok(mut renderer) = Renderer::headless(&EngineConfig::default()) else {
            tracing::warn!("skipping GPU test: no adapter");
            return;
        };
        let mut scene = Scene::new();
        let mut rig = rig(&mut scene);
        rig.register(&mut scene, &mut renderer);
        let l = rig.lights().to_vec();
        assert_eq!(renderer.registry().lights(), &[l[0], l[2]]);

        rig.swap_lights(&mut renderer);
        assert_eq!(renderer.registry().lights(), &[l[1], l[3]]);
        rig.swap_lights(&mut renderer);
        assert_eq!(renderer.registry().lights(), &[l[0], l[2]]);
        renderer.destroy_window();
    }
}
