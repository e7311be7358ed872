//! The static play field: ground, buildings, scattered trees and lamps.

use crate::lamps::LampRig;
use anyhow::Result;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scenegraph_assets::{AssetError, Material, Model, load_obj, primitives};
use scenegraph_common::ObjectId;
use scenegraph_engine::Renderer;
use scenegraph_scene::{RenderFlags, Scene, SceneObject, TransformNode};
use std::path::Path;
use std::sync::Arc;

/// Tree clusters as `(count, min corner, max corner)` on the ground plane.
const TREE_CLUSTERS: [(usize, Vec3, Vec3); 5] = [
    (10, Vec3::new(-40.0, 0.0, -30.0), Vec3::new(-13.0, 0.0, -23.0)),
    (10, Vec3::new(13.0, 0.0, -30.0), Vec3::new(40.0, 0.0, -23.0)),
    (10, Vec3::new(-40.0, 0.0, 15.0), Vec3::new(-32.0, 0.0, 40.0)),
    (15, Vec3::new(30.0, 0.0, -30.0), Vec3::new(40.0, 0.0, 40.0)),
    (15, Vec3::new(-25.0, 0.0, 40.0), Vec3::new(25.0, 0.0, 43.0)),
];

/// Load `file` from the asset directory, or build a stand-in when it is
/// missing so the board stays playable.
fn model_or(assets: &Path, file: &str, fallback: impl FnOnce() -> Result<Model, AssetError>) -> Result<Arc<Model>> {
    let path = assets.join("models").join(file);
    match load_obj(&path) {
        Ok(model) => Ok(Arc::new(model)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "using placeholder model: {e}");
            Ok(Arc::new(fallback()?))
        }
    }
}

#[derive(Debug)]
pub struct Board {
    ground: ObjectId,
    props: Vec<ObjectId>,
    trees: Vec<ObjectId>,
    pub lamps: LampRig,
}

impl Board {
    /// Build the board in `scene`. Tree placement is fixed by `seed`.
    pub fn spawn(scene: &mut Scene, assets: &Path, seed: u64) -> Result<Self> {
        let ground_model = model_or(assets, "map.obj", || {
            primitives::plane(45.0, Material::colored("grass", [0.25, 0.45, 0.2], [0.05; 3], 4.0, 1.0))
        })?;
        let ground = scene.spawn(
            SceneObject::new("map")
                .with_model(ground_model)
                .with_flags(RenderFlags {
                    lit: true,
                    casts_shadows: false,
                    receives_shadows: true,
                    perform_frustum_check: false,
                }),
        );

        let shed_model = model_or(assets, "shed.obj", || {
            primitives::cuboid(Vec3::new(8.0, 5.0, 6.0), Material::colored("shed", [0.5, 0.3, 0.2], [0.1; 3], 8.0, 1.0))
        })?;
        let silo_model = model_or(assets, "silo.obj", || {
            primitives::cuboid(Vec3::new(4.0, 12.0, 4.0), Material::colored("silo", [0.7; 3], [0.4; 3], 32.0, 1.0))
        })?;
        let props = vec![
            scene.spawn(prop("shed", &shed_model, Vec3::ZERO)),
            scene.spawn(prop("silo", &silo_model, Vec3::ZERO)),
            scene.spawn(prop("silo 2", &silo_model, Vec3::new(0.0, 0.0, 15.0))),
        ];

        let tree_model = model_or(assets, "tree.obj", || {
            primitives::cuboid(Vec3::new(1.5, 6.0, 1.5), Material::colored("tree", [0.1, 0.4, 0.1], [0.0; 3], 1.0, 1.0))
        })?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::new();
        for (count, min, max) in TREE_CLUSTERS {
            for _ in 0..count {
                let position = Vec3::new(
                    rng.random_range(min.x..=max.x),
                    rng.random_range(min.y..=max.y),
                    rng.random_range(min.z..=max.z),
                );
                let tree = scene.spawn(prop("tree", &tree_model, position));
                scene.rotate_global(tree, Vec3::Y, rng.random_range(0.0..std::f32::consts::PI))?;
                trees.push(tree);
            }
        }

        let lamp_model = model_or(assets, "streetlamp.obj", || {
            primitives::cuboid(Vec3::new(0.4, 10.0, 0.4), Material::colored("lamp", [0.2; 3], [0.5; 3], 16.0, 1.0))
        })?;
        let lamps = LampRig::spawn(scene, &lamp_model)?;

        tracing::info!(trees = trees.len(), props = props.len(), "board built");
        Ok(Self {
            ground,
            props,
            trees,
            lamps,
        })
    }

    /// Register every drawable and the lit lamp row with the renderer.
    pub fn register(&self, scene: &mut Scene, renderer: &mut Renderer) {
        renderer.add_object(self.ground);
        for &id in self.props.iter().chain(&self.trees) {
            renderer.add_object(id);
        }
        self.lamps.register(scene, renderer);
    }

    pub fn trees(&self) -> &[ObjectId] {
        &self.trees
    }
}

fn prop(name: &str, model: &Arc<Model>, position: Vec3) -> SceneObject {
    SceneObject::new(name)
        .with_model(Arc::clone(model))
        .with_flags(RenderFlags::solid())
        .with_transform(TransformNode::from_position(position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_assets_fall_back_to_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = Scene::new();
        let board = Board::spawn(&mut scene, dir.path(), 7).unwrap();
        assert_eq!(board.trees().len(), 60);
        assert_eq!(board.lamps.lamps().len(), 4);
        assert!(scene.get(board.ground).unwrap().model().is_some());
        assert!(!scene.get(board.ground).unwrap().flags.perform_frustum_check);
    }

    #[test]
    fn trees_stay_inside_their_clusters() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = Scene::new();
        let board = Board::spawn(&mut scene, dir.path(), 42).unwrap();
        let mut trees = board.trees().iter();
        for (count, min, max) in TREE_CLUSTERS {
            for tree in trees.by_ref().take(count) {
                let p = scene.global_position(*tree).unwrap();
                assert!(p.x >= min.x - 1e-4 && p.x <= max.x + 1e-4, "{p}");
                assert!(p.z >= min.z - 1e-4 && p.z <= max.z + 1e-4, "{p}");
            }
        }
    }

    #[test]
    fn same_seed_same_forest() {
        let dir = tempfile::tempdir().unwrap();
        let positions = |seed| {
            let mut scene = Scene::new();
            let board = Board::spawn(&mut scene, dir.path(), seed).unwrap();
            board
                .trees()
                .iter()
                .map(|t| scene.global_position(*t).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(3), positions(3));
        assert_ne!(positions(3), positions(4));
    }

    #[test]
    fn models_are_shared_between_trees() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = Scene::new();
        let board = Board::spawn(&mut scene, dir.path(), 1).unwrap();
        let a = scene.get(board.trees()[0]).unwrap().model().unwrap();
        let b = scene.get(board.trees()[59]).unwrap().model().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }
}
