use scenegraph_common::{LightId, ObjectId};

/// Objects and lights the renderer draws, in registration order.
///
/// Registration is idempotent: adding an id twice keeps its first position.
/// Being in the scene does not make an object visible; only registered ids
/// are planned.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    objects: Vec<ObjectId>,
    lights: Vec<LightId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the object was already registered.
    pub fn add_object(&mut self, id: ObjectId) -> bool {
        if self.objects.contains(&id) {
            return false;
        }
        self.objects.push(id);
        true
    }

    /// Returns `false` if the object was not registered.
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| *o != id);
        self.objects.len() != before
    }

    pub fn add_light(&mut self, id: LightId) -> bool {
        if self.lights.contains(&id) {
            return false;
        }
        self.lights.push(id);
        true
    }

    pub fn remove_light(&mut self, id: LightId) -> bool {
        let before = self.lights.len();
        self.lights.retain(|l| *l != id);
        self.lights.len() != before
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.lights.clear();
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains(&id)
    }

    pub fn contains_light(&self, id: LightId) -> bool {
        self.lights.contains(&id)
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn lights(&self) -> &[LightId] {
        &self.lights
    }
}
