use crate::transform::TransformNode;
use scenegraph_assets::{AssetError, Material, Mesh, Model, Vertex};
use scenegraph_common::ObjectId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// How the renderer treats an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFlags {
    pub lit: bool,
    pub casts_shadows: bool,
    pub receives_shadows: bool,
    pub perform_frustum_check: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            lit: false,
            casts_shadows: false,
            receives_shadows: false,
            perform_frustum_check: true,
        }
    }
}

impl RenderFlags {
    /// Lit, casting and receiving shadows: the usual setup for props.
    pub fn solid() -> Self {
        Self {
            lit: true,
            casts_shadows: true,
            receives_shadows: true,
            perform_frustum_check: true,
        }
    }
}

/// Link from a child to its parent. Non-owning; the scene owns both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub parent: ObjectId,
    /// When false the child is attached for bookkeeping only and keeps its
    /// own world placement.
    pub inherit: bool,
}

/// A node of the scene graph, optionally drawing a shared model.
///
/// Without a model the object is a pure group node: lights and cameras are
/// bound to such nodes.
#[derive(Debug, Clone, Default)]
pub struct SceneObject {
    pub name: String,
    pub transform: TransformNode,
    pub flags: RenderFlags,
    model: Option<Arc<Model>>,
    patches: Option<u32>,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) children: Vec<ObjectId>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_transform(mut self, transform: TransformNode) -> Self {
        self.transform = transform;
        self
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn set_model(&mut self, model: Arc<Model>) {
        self.model = Some(model);
    }

    pub fn clear_model(&mut self) {
        self.model = None;
    }

    /// Load a model from an OBJ file. On failure the current model is kept.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<Arc<Model>, AssetError> {
        let path = path.as_ref();
        match scenegraph_assets::load_obj(path) {
            Ok(model) => {
                let model = Arc::new(model);
                self.model = Some(Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                tracing::error!(object = %self.name, path = %path.display(), "model load failed: {e}");
                Err(e)
            }
        }
    }

    /// Build and attach a model from in-memory geometry.
    pub fn load_model_from_data(
        &mut self,
        vertices: Vec<Vertex>,
        materials: Vec<Material>,
        meshes: Vec<Mesh>,
    ) -> Result<Arc<Model>, AssetError> {
        let model = Arc::new(Model::from_parts(vertices, materials, meshes)?);
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_group(&self) -> bool {
        self.model.is_none()
    }

    pub fn set_lit(&mut self, lit: bool) {
        self.flags.lit = lit;
    }

    pub fn set_casts_shadows(&mut self, casts: bool) {
        self.flags.casts_shadows = casts;
    }

    pub fn set_receives_shadows(&mut self, receives: bool) {
        self.flags.receives_shadows = receives;
    }

    pub fn set_perform_frustum_check(&mut self, check: bool) {
        self.flags.perform_frustum_check = check;
    }

    /// Tessellation subdivision factor; `0` switches the object back to the
    /// standard path.
    pub fn set_patches(&mut self, patches: u32) {
        self.patches = (patches > 0).then_some(patches);
    }

    pub fn patches(&self) -> Option<u32> {
        self.patches
    }

    pub fn parent(&self) -> Option<ParentLink> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }
}
