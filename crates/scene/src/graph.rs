use crate::SceneError;
use crate::camera::Camera;
use crate::frustum::Frustum;
use crate::light::Light;
use crate::object::{ParentLink, SceneObject};
use crate::transform::TransformNode;
use glam::{Mat4, Vec3};
use scenegraph_common::{CameraId, LightId, ObjectId};
use std::collections::BTreeMap;

/// What to do with the children of an object being despawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPolicy {
    /// Children become roots and keep their current world placement.
    Detach,
    /// The whole subtree is removed.
    Destroy,
}

/// Everything a despawn removed, so callers can unregister it from the
/// renderer and release the matching GPU resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Despawned {
    pub objects: Vec<ObjectId>,
    pub lights: Vec<LightId>,
    pub cameras: Vec<CameraId>,
}

#[derive(Debug, Clone)]
struct LightSlot {
    node: ObjectId,
    light: Light,
}

#[derive(Debug, Clone)]
struct CameraSlot {
    node: ObjectId,
    camera: Camera,
}

/// Arena owning every scene object, light and camera.
///
/// Objects reference each other only by id. Lights and cameras are each
/// bound to a model-less group node, so they take part in the hierarchy
/// (e.g. a lamp light attached to its lamp post) like any other object.
///
/// World transforms are recomputed on demand from the parent chain, so they
/// can never be stale.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: BTreeMap<ObjectId, SceneObject>,
    lights: BTreeMap<LightId, LightSlot>,
    cameras: BTreeMap<CameraId, CameraSlot>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects, group nodes of lights and cameras included.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Take ownership of an object. Returns its id.
    pub fn spawn(&mut self, object: SceneObject) -> ObjectId {
        let id = ObjectId::new();
        let mut object = object;
        object.parent = None;
        object.children.clear();
        self.objects.insert(id, object);
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    /// Like [`Scene::get`], with a typed error for `?` chains.
    pub fn object(&self, id: ObjectId) -> Result<&SceneObject, SceneError> {
        self.objects.get(&id).ok_or(SceneError::ObjectNotFound(id))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject, SceneError> {
        self.objects
            .get_mut(&id)
            .ok_or(SceneError::ObjectNotFound(id))
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter().map(|(id, o)| (*id, o))
    }

    /// Attach `child` under `parent`, moving it out of any previous parent.
    ///
    /// The child's local transform is kept as-is; with `inherit` it is from
    /// now on interpreted relative to the parent.
    pub fn add_child(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        inherit: bool,
    ) -> Result<(), SceneError> {
        if parent == child {
            return Err(SceneError::SelfParent(child));
        }
        self.object(parent)?;
        self.object(child)?;
        if self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }
        self.unlink(child);
        if let Some(p) = self.objects.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.objects.get_mut(&child) {
            c.parent = Some(ParentLink { parent, inherit });
        }
        Ok(())
    }

    /// Make `child` a root again, keeping its world placement.
    pub fn detach(&mut self, child: ObjectId) -> Result<(), SceneError> {
        let world = self.global_transform(child)?;
        self.unlink(child);
        self.object_mut(child)?.transform = world;
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut cursor = self.objects.get(&id).and_then(|o| o.parent);
        while let Some(link) = cursor {
            if link.parent == ancestor {
                return true;
            }
            cursor = self.objects.get(&link.parent).and_then(|o| o.parent);
        }
        false
    }

    fn unlink(&mut self, child: ObjectId) {
        let Some(link) = self.objects.get_mut(&child).and_then(|c| c.parent.take()) else {
            return;
        };
        if let Some(p) = self.objects.get_mut(&link.parent) {
            p.children.retain(|c| *c != child);
        }
    }

    /// Remove an object. Children are detached or destroyed per `policy`;
    /// lights and cameras bound to removed nodes go with them.
    pub fn despawn(&mut self, id: ObjectId, policy: ChildPolicy) -> Result<Despawned, SceneError> {
        self.object(id)?;
        let mut removed = Despawned::default();

        let doomed = match policy {
            ChildPolicy::Destroy => self.subtree(id),
            ChildPolicy::Detach => {
                let children = self.object(id)?.children.clone();
                for child in children {
                    self.detach(child)?;
                }
                vec![id]
            }
        };

        self.unlink(id);
        for obj in &doomed {
            self.objects.remove(obj);
            removed.objects.push(*obj);
        }
        self.lights.retain(|light_id, slot| {
            let keep = !doomed.contains(&slot.node);
            if !keep {
                removed.lights.push(*light_id);
            }
            keep
        });
        self.cameras.retain(|camera_id, slot| {
            let keep = !doomed.contains(&slot.node);
            if !keep {
                removed.cameras.push(*camera_id);
            }
            keep
        });
        Ok(removed)
    }

    /// `id` and all its descendants, parents before children.
    fn subtree(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(obj) = self.objects.get(&out[i]) {
                out.extend(obj.children.iter().copied());
            }
            i += 1;
        }
        out
    }

    /// World placement: the local transform composed with every inheriting
    /// ancestor. A non-inheriting link ends the chain.
    pub fn global_transform(&self, id: ObjectId) -> Result<TransformNode, SceneError> {
        let obj = self.object(id)?;
        let mut world = obj.transform;
        let mut link = obj.parent;
        while let Some(ParentLink {
            parent,
            inherit: true,
        }) = link
        {
            let p = self.object(parent)?;
            world = world.then(&p.transform);
            link = p.parent;
        }
        Ok(world)
    }

    /// World transform of whatever `id`'s local transform is relative to.
    fn parent_frame(&self, id: ObjectId) -> Result<TransformNode, SceneError> {
        match self.object(id)?.parent {
            Some(ParentLink {
                parent,
                inherit: true,
            }) => self.global_transform(parent),
            _ => Ok(TransformNode::default()),
        }
    }

    /// Place `id` so that its world transform equals `world`.
    pub fn set_global_transform(
        &mut self,
        id: ObjectId,
        world: TransformNode,
    ) -> Result<(), SceneError> {
        let frame = self.parent_frame(id)?;
        self.object_mut(id)?.transform = world.then(&frame.inverse());
        Ok(())
    }

    pub fn global_matrix(&self, id: ObjectId) -> Result<Mat4, SceneError> {
        Ok(self.global_transform(id)?.matrix())
    }

    pub fn global_position(&self, id: ObjectId) -> Result<Vec3, SceneError> {
        Ok(self.global_transform(id)?.position())
    }

    pub fn global_forward(&self, id: ObjectId) -> Result<Vec3, SceneError> {
        Ok(self.global_transform(id)?.forward())
    }

    pub fn global_up(&self, id: ObjectId) -> Result<Vec3, SceneError> {
        Ok(self.global_transform(id)?.up())
    }

    pub fn global_right(&self, id: ObjectId) -> Result<Vec3, SceneError> {
        Ok(self.global_transform(id)?.right())
    }

    pub fn set_global_position(&mut self, id: ObjectId, position: Vec3) -> Result<(), SceneError> {
        let mut world = self.global_transform(id)?;
        world.set_position(position);
        self.set_global_transform(id, world)
    }

    pub fn translate_global(&mut self, id: ObjectId, delta: Vec3) -> Result<(), SceneError> {
        let mut world = self.global_transform(id)?;
        world.translate(delta);
        self.set_global_transform(id, world)
    }

    /// Rotate in place about a world-space axis.
    pub fn rotate_global(&mut self, id: ObjectId, axis: Vec3, angle: f32) -> Result<(), SceneError> {
        let mut world = self.global_transform(id)?;
        world.rotate(axis, angle);
        self.set_global_transform(id, world)
    }

    /// Orbit a world-space pivot about a world-space axis.
    pub fn rotate_around_global(
        &mut self,
        id: ObjectId,
        axis: Vec3,
        pivot: Vec3,
        angle: f32,
    ) -> Result<(), SceneError> {
        let mut world = self.global_transform(id)?;
        world.rotate_around(axis, pivot, angle);
        self.set_global_transform(id, world)
    }

    /// Turn `id` so its world forward points at a world-space target.
    /// Returns `Ok(false)` without changes when the target is the object's
    /// own world position.
    pub fn look_at_global(&mut self, id: ObjectId, target: Vec3) -> Result<bool, SceneError> {
        let mut world = self.global_transform(id)?;
        if !world.look_at(target) {
            return Ok(false);
        }
        self.set_global_transform(id, world)?;
        Ok(true)
    }

    /// Store a light, bound to a fresh group node. Returns its id.
    pub fn spawn_light(&mut self, light: Light) -> LightId {
        let node = self.spawn(SceneObject::new(format!("{} light", light.kind().name())));
        let id = LightId::new();
        self.lights.insert(id, LightSlot { node, light });
        id
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id).map(|s| &s.light)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(&id).map(|s| &mut s.light)
    }

    /// The group node carrying the light's placement.
    pub fn light_node(&self, id: LightId) -> Result<ObjectId, SceneError> {
        self.lights
            .get(&id)
            .map(|s| s.node)
            .ok_or(SceneError::LightNotFound(id))
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter().map(|(id, s)| (*id, &s.light))
    }

    /// World placement of a light.
    pub fn light_transform(&self, id: LightId) -> Result<TransformNode, SceneError> {
        self.global_transform(self.light_node(id)?)
    }

    /// Remove a light together with its node. Children of the node are
    /// detached.
    pub fn despawn_light(&mut self, id: LightId) -> Result<Despawned, SceneError> {
        let node = self.light_node(id)?;
        self.despawn(node, ChildPolicy::Detach)
    }

    /// Store a camera, bound to a fresh group node. Returns its id.
    pub fn spawn_camera(&mut self, camera: Camera) -> CameraId {
        let node = self.spawn(SceneObject::new("camera"));
        let id = CameraId::new();
        self.cameras.insert(id, CameraSlot { node, camera });
        id
    }

    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(&id).map(|s| &s.camera)
    }

    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(&id).map(|s| &mut s.camera)
    }

    pub fn camera_node(&self, id: CameraId) -> Result<ObjectId, SceneError> {
        self.cameras
            .get(&id)
            .map(|s| s.node)
            .ok_or(SceneError::CameraNotFound(id))
    }

    fn camera_parts(&self, id: CameraId) -> Result<(&Camera, TransformNode), SceneError> {
        let slot = self.cameras.get(&id).ok_or(SceneError::CameraNotFound(id))?;
        Ok((&slot.camera, self.global_transform(slot.node)?))
    }

    pub fn camera_transform(&self, id: CameraId) -> Result<TransformNode, SceneError> {
        Ok(self.camera_parts(id)?.1)
    }

    pub fn camera_view(&self, id: CameraId) -> Result<Mat4, SceneError> {
        let (camera, world) = self.camera_parts(id)?;
        Ok(camera.view_matrix(&world))
    }

    pub fn camera_projection(&self, id: CameraId) -> Result<Mat4, SceneError> {
        Ok(self.camera_parts(id)?.0.projection_matrix())
    }

    pub fn camera_view_projection(&self, id: CameraId) -> Result<Mat4, SceneError> {
        let (camera, world) = self.camera_parts(id)?;
        Ok(camera.view_projection(&world))
    }

    /// Frustum of the camera as it is placed right now.
    pub fn camera_frustum(&self, id: CameraId) -> Result<Frustum, SceneError> {
        let (camera, world) = self.camera_parts(id)?;
        Ok(camera.frustum(&world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::ShadowSettings;
    use std::f32::consts::FRAC_PI_2;

    fn at(scene: &mut Scene, name: &str, p: Vec3) -> ObjectId {
        scene.spawn(SceneObject::new(name).with_transform(TransformNode::from_position(p)))
    }

    #[test]
    fn child_global_is_parent_composed_with_local() {
        let mut scene = Scene::new();
        let parent = at(&mut scene, "lamp", Vec3::new(-27.0, 0.0, -18.0));
        let child = at(&mut scene, "bulb", Vec3::new(0.0, 9.85, 0.0));
        scene.object_mut(parent).unwrap().transform.rotate(Vec3::Y, 0.8);
        scene.object_mut(child).unwrap().transform.rotate(Vec3::X, 0.2);
        scene.add_child(parent, child, true).unwrap();

        let p = scene.global_matrix(parent).unwrap();
        let local = scene.get(child).unwrap().transform.matrix();
        assert!(scene.global_matrix(child).unwrap().abs_diff_eq(p * local, 1e-5));
    }

    #[test]
    fn grandchildren_compose_through_the_chain() {
        let mut scene = Scene::new();
        let a = at(&mut scene, "a", Vec3::X);
        let b = at(&mut scene, "b", Vec3::Y);
        let c = at(&mut scene, "c", Vec3::Z);
        scene.add_child(a, b, true).unwrap();
        scene.add_child(b, c, true).unwrap();
        scene.object_mut(a).unwrap().transform.rotate(Vec3::Y, FRAC_PI_2);
        let expected = scene.global_matrix(b).unwrap() * scene.get(c).unwrap().transform.matrix();
        assert!(scene.global_matrix(c).unwrap().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn moving_parent_moves_inheriting_children_only() {
        let mut scene = Scene::new();
        let parent = at(&mut scene, "lamp", Vec3::ZERO);
        let follower = at(&mut scene, "follower", Vec3::new(0.0, 2.0, 0.0));
        let bookkeeping = at(&mut scene, "attached", Vec3::new(5.0, 0.0, 0.0));
        scene.add_child(parent, follower, true).unwrap();
        scene.add_child(parent, bookkeeping, false).unwrap();

        let f_before = scene.global_position(follower).unwrap();
        let b_before = scene.global_position(bookkeeping).unwrap();
        let delta = Vec3::new(3.0, -1.0, 7.0);
        scene.translate_global(parent, delta).unwrap();

        let f_after = scene.global_position(follower).unwrap();
        assert!((f_after - f_before).abs_diff_eq(delta, 1e-5));
        assert_eq!(scene.global_position(bookkeeping).unwrap(), b_before);
        assert_eq!(scene.get(parent).unwrap().children(), &[follower, bookkeeping]);
    }

    #[test]
    fn global_setters_respect_parent_frame() {
        let mut scene = Scene::new();
        let parent = at(&mut scene, "p", Vec3::new(10.0, 0.0, 0.0));
        scene.object_mut(parent).unwrap().transform.rotate(Vec3::Y, 1.1);
        let child = at(&mut scene, "c", Vec3::ZERO);
        scene.add_child(parent, child, true).unwrap();

        let target = Vec3::new(-3.0, 4.0, 2.0);
        scene.set_global_position(child, target).unwrap();
        assert!(scene.global_position(child).unwrap().abs_diff_eq(target, 1e-5));
    }

    #[test]
    fn look_at_global_under_rotated_parent() {
        let mut scene = Scene::new();
        let parent = at(&mut scene, "p", Vec3::new(0.0, 5.0, 0.0));
        scene.object_mut(parent).unwrap().transform.rotate(Vec3::Z, 0.6);
        let child = at(&mut scene, "c", Vec3::new(1.0, 2.0, 3.0));
        scene.add_child(parent, child, true).unwrap();

        let target = Vec3::new(-8.0, 0.0, 4.0);
        assert!(scene.look_at_global(child, target).unwrap());
        let pos = scene.global_position(child).unwrap();
        let fwd = scene.global_forward(child).unwrap();
        assert!(fwd.abs_diff_eq((target - pos).normalize(), 1e-5));

        assert!(!scene.look_at_global(child, pos).unwrap());
    }

    #[test]
    fn rotate_around_global_orbits_pivot() {
        let mut scene = Scene::new();
        let cam = at(&mut scene, "cam", Vec3::new(0.0, 30.0, 55.0));
        scene.look_at_global(cam, Vec3::ZERO).unwrap();
        let radius = scene.global_position(cam).unwrap().length();
        for _ in 0..500 {
            scene.rotate_around_global(cam, Vec3::Y, Vec3::ZERO, 0.013).unwrap();
            let right = scene.global_right(cam).unwrap();
            scene.rotate_around_global(cam, -right, Vec3::ZERO, 0.001).unwrap();
        }
        let pos = scene.global_position(cam).unwrap();
        assert!((pos.length() - radius).abs() < 1e-2);
        let fwd = scene.global_forward(cam).unwrap();
        assert!(fwd.abs_diff_eq(-pos.normalize(), 1e-3));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut scene = Scene::new();
        let a = at(&mut scene, "a", Vec3::ZERO);
        let b = at(&mut scene, "b", Vec3::ZERO);
        scene.add_child(a, b, true).unwrap();
        assert_eq!(scene.add_child(b, a, true), Err(SceneError::Cycle { parent: b, child: a }));
        assert_eq!(scene.add_child(a, a, true), Err(SceneError::SelfParent(a)));
    }

    #[test]
    fn reparenting_moves_child_between_lists() {
        let mut scene = Scene::new();
        let a = at(&mut scene, "a", Vec3::ZERO);
        let b = at(&mut scene, "b", Vec3::ZERO);
        let c = at(&mut scene, "c", Vec3::ZERO);
        scene.add_child(a, c, true).unwrap();
        scene.add_child(b, c, false).unwrap();
        assert!(scene.get(a).unwrap().children().is_empty());
        assert_eq!(scene.get(b).unwrap().children(), &[c]);
        assert_eq!(
            scene.get(c).unwrap().parent(),
            Some(ParentLink { parent: b, inherit: false })
        );
    }

    #[test]
    fn despawn_detach_keeps_world_placement() {
        let mut scene = Scene::new();
        let parent = at(&mut scene, "p", Vec3::new(4.0, 0.0, 0.0));
        let child = at(&mut scene, "c", Vec3::new(0.0, 1.0, 0.0));
        scene.add_child(parent, child, true).unwrap();
        let before = scene.global_position(child).unwrap();

        let removed = scene.despawn(parent, ChildPolicy::Detach).unwrap();
        assert_eq!(removed.objects, vec![parent]);
        assert!(scene.get(child).unwrap().parent().is_none());
        assert_eq!(scene.global_position(child).unwrap(), before);
    }

    #[test]
    fn despawn_destroy_removes_subtree_and_bound_lights() {
        let mut scene = Scene::new();
        let lamp = at(&mut scene, "lamp", Vec3::ZERO);
        let light = scene.spawn_light(
            Light::point(20.0).with_shadow(ShadowSettings::cube(512, 0.05, 20.0)),
        );
        let node = scene.light_node(light).unwrap();
        scene.add_child(lamp, node, true).unwrap();
        let other = at(&mut scene, "other", Vec3::ZERO);

        let removed = scene.despawn(lamp, ChildPolicy::Destroy).unwrap();
        assert_eq!(removed.objects, vec![lamp, node]);
        assert_eq!(removed.lights, vec![light]);
        assert!(scene.light(light).is_none());
        assert!(scene.contains(other));
        assert_eq!(scene.object_count(), 1);
    }

    #[test]
    fn light_follows_lamp_post() {
        let mut scene = Scene::new();
        let lamp = at(&mut scene, "lamp", Vec3::new(-27.0, 0.0, -18.0));
        let light = scene.spawn_light(Light::point(20.0));
        let node = scene.light_node(light).unwrap();
        scene.object_mut(node).unwrap().transform.set_position(Vec3::new(0.0, 9.85, 0.0));
        scene.add_child(lamp, node, true).unwrap();
        let p = scene.light_transform(light).unwrap().position();
        assert!(p.abs_diff_eq(Vec3::new(-27.0, 9.85, -18.0), 1e-5));
    }

    #[test]
    fn camera_frustum_is_never_stale() {
        let mut scene = Scene::new();
        let cam = scene.spawn_camera(Camera::perspective(1.5, 1.5, 0.05, 3000.0));
        let node = scene.camera_node(cam).unwrap();
        scene.set_global_position(node, Vec3::new(0.0, 30.0, 55.0)).unwrap();
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        assert!(scene.camera_frustum(cam).unwrap().contains_point(Vec3::ZERO));

        scene.rotate_global(node, Vec3::Y, std::f32::consts::PI).unwrap();
        assert!(!scene.camera_frustum(cam).unwrap().contains_point(Vec3::ZERO));
    }

    #[test]
    fn missing_ids_are_errors() {
        let mut scene = Scene::new();
        let ghost = ObjectId::new();
        assert_eq!(scene.global_position(ghost), Err(SceneError::ObjectNotFound(ghost)));
        assert!(scene.despawn(ghost, ChildPolicy::Destroy).is_err());
        let cam = CameraId::new();
        assert_eq!(scene.camera_view(cam), Err(SceneError::CameraNotFound(cam)));
    }
}
