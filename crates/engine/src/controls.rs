//! Mouse-drag orbit controls shared by the sample applications.

use glam::Vec3;
use scenegraph_common::ObjectId;
use scenegraph_input::{InputPayload, MouseButton};
use scenegraph_scene::{Scene, SceneError, pitch_step_allowed};

/// Which buttons are held and where the cursor was last seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub left: bool,
    pub right: bool,
    /// Control was held when the drag started.
    pub control: bool,
    last: Option<(f64, f64)>,
    resolution: (f32, f32),
}

impl DragState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            left: false,
            right: false,
            control: false,
            last: None,
            resolution: (width.max(1) as f32, height.max(1) as f32),
        }
    }

    pub fn press(&mut self, button: MouseButton, payload: &InputPayload) {
        match button {
            MouseButton::Left => self.left = true,
            MouseButton::Right => self.right = true,
            _ => return,
        }
        self.control = payload.modifiers().is_some_and(|m| m.control);
    }

    pub fn release(&mut self, button: MouseButton) {
        match button {
            MouseButton::Left => self.left = false,
            MouseButton::Right => self.right = false,
            _ => {}
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.resolution = (width as f32, height as f32);
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.left || self.right
    }

    /// Cursor movement since the previous call as a fraction of the window
    /// size. The first call only records the position.
    pub fn moved_to(&mut self, x: f64, y: f64) -> (f32, f32) {
        let delta = match self.last {
            Some((px, py)) => (
                (x - px) as f32 / self.resolution.0,
                (y - py) as f32 / self.resolution.1,
            ),
            None => (0.0, 0.0),
        };
        self.last = Some((x, y));
        delta
    }
}

/// Orbit `node` around `pivot`: `yaw` about world up, then `pitch` about the
/// node's right axis unless that would flip it over a pole. Ends looking at
/// the pivot.
pub fn orbit(scene: &mut Scene, node: ObjectId, pivot: Vec3, yaw: f32, pitch: f32) -> Result<(), SceneError> {
    scene.rotate_around_global(node, Vec3::Y, pivot, yaw)?;
    let forward = scene.global_forward(node)?;
    if pitch_step_allowed(forward, pitch) {
        let right = scene.global_right(node)?;
        scene.rotate_around_global(node, -right, pivot, pitch)?;
    }
    scene.look_at_global(node, pivot)?;
    Ok(())
}

/// Move `node` along the line through `pivot` by `amount` of its distance.
/// Never crosses the pivot.
pub fn dolly(scene: &mut Scene, node: ObjectId, pivot: Vec3, amount: f32) -> Result<(), SceneError> {
    let offset = scene.global_position(node)? - pivot;
    let scaled = offset * (1.0 + amount).max(0.05);
    scene.set_global_position(node, pivot + scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scenegraph_input::Modifiers;
    use scenegraph_scene::{Camera, TransformNode};

    fn camera_node(scene: &mut Scene) -> ObjectId {
        let camera = scene.spawn_camera(Camera::default());
        let node = scene.camera_node(camera).unwrap();
        scene.set_global_position(node, Vec3::new(0.0, 30.0, 55.0)).unwrap();
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        node
    }

    #[test]
    fn first_move_only_records_position() {
        let mut drag = DragState::new(100, 50);
        assert_eq!(drag.moved_to(10.0, 10.0), (0.0, 0.0));
        assert_eq!(drag.moved_to(60.0, 35.0), (0.5, 0.5));
    }

    #[test]
    fn control_is_sampled_on_press() {
        let mut drag = DragState::new(10, 10);
        let held = InputPayload::Modifiers(Modifiers {
            control: true,
            ..Modifiers::default()
        });
        drag.press(MouseButton::Left, &held);
        assert!(drag.left && drag.control);
        drag.release(MouseButton::Left);
        assert!(!drag.is_dragging());
        drag.press(MouseButton::Middle, &InputPayload::Modifiers(Modifiers::default()));
        assert!(drag.control);
        assert!(!drag.is_dragging());
    }

    #[test]
    fn orbit_keeps_distance_and_faces_pivot() {
        let mut scene = Scene::new();
        let node = camera_node(&mut scene);
        let before = scene.global_position(node).unwrap().length();
        orbit(&mut scene, node, Vec3::ZERO, 0.7, 0.2).unwrap();
        let pos = scene.global_position(node).unwrap();
        assert_relative_eq!(pos.length(), before, epsilon = 1e-3);
        let forward = scene.global_forward(node).unwrap();
        assert_relative_eq!(forward.dot(-pos.normalize()), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn orbit_stops_at_the_pole() {
        let mut scene = Scene::new();
        let node = scene.spawn(scenegraph_scene::SceneObject::new("eye").with_transform(TransformNode::from_position(
            Vec3::new(0.0, 10.0, 0.01),
        )));
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        let before = scene.global_position(node).unwrap();
        // Looking straight down; pitching further over the top is refused.
        orbit(&mut scene, node, Vec3::ZERO, 0.0, 0.3).unwrap();
        let after = scene.global_position(node).unwrap();
        assert_relative_eq!(after.y, before.y, epsilon = 1e-3);
    }

    #[test]
    fn dolly_scales_distance() {
        let mut scene = Scene::new();
        let node = camera_node(&mut scene);
        let before = scene.global_position(node).unwrap();
        dolly(&mut scene, node, Vec3::ZERO, 0.5).unwrap();
        let after = scene.global_position(node).unwrap();
        assert_relative_eq!(after.length(), before.length() * 1.5, epsilon = 1e-3);
        dolly(&mut scene, node, Vec3::ZERO, -5.0).unwrap();
        assert!(scene.global_position(node).unwrap().length() > 0.0);
    }
}
