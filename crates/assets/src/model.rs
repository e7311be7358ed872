use crate::AssetError;
use crate::material::Material;
use glam::{Vec2, Vec3};
use scenegraph_common::ModelId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub tex_coord: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, tex_coord: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            tex_coord,
            normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub indices: [u32; 3],
}

impl Triangle {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { indices: [a, b, c] }
    }
}

/// A named run of triangles drawn with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub material: Option<String>,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, material: Option<String>, triangles: Vec<Triangle>) -> Self {
        Self {
            name: name.into(),
            material,
            triangles,
        }
    }
}

/// Model-space bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub radius: f32,
}

impl Bounds {
    fn from_points(points: impl Iterator<Item = Vec3> + Clone) -> Self {
        let (min, max) = points
            .clone()
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            });
        let center = (min + max) * 0.5;
        let radius = points.map(|p| p.distance(center)).fold(0.0, f32::max);
        Self { center, radius }
    }
}

/// Immutable geometry: one shared vertex buffer, meshes that index into it,
/// and the materials those meshes refer to by name.
///
/// Models are shared between scene objects through `Arc<Model>`.
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    vertices: Vec<Vertex>,
    materials: Vec<Material>,
    meshes: Vec<Mesh>,
    bounds: Bounds,
}

impl Model {
    /// Build a model from raw parts, checking every triangle index.
    pub fn from_parts(
        vertices: Vec<Vertex>,
        materials: Vec<Material>,
        meshes: Vec<Mesh>,
    ) -> Result<Self, AssetError> {
        if vertices.is_empty() {
            return Err(AssetError::Empty);
        }
        let count = vertices.len() as u32;
        for mesh in &meshes {
            for tri in &mesh.triangles {
                if let Some(&bad) = tri.indices.iter().find(|&&i| i >= count) {
                    return Err(AssetError::InvalidIndex {
                        mesh: mesh.name.clone(),
                        index: bad,
                        vertex_count: count,
                    });
                }
            }
            if let Some(name) = &mesh.material {
                if !materials.iter().any(|m| &m.name == name) {
                    tracing::warn!(mesh = %mesh.name, material = %name, "mesh refers to unknown material, default used");
                }
            }
        }
        let bounds = Bounds::from_points(vertices.iter().map(|v| v.position));
        Ok(Self {
            id: ModelId::new(),
            vertices,
            materials,
            meshes,
            bounds,
        })
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Material used to draw `mesh`, if the mesh names one this model has.
    pub fn material_for(&self, mesh: &Mesh) -> Option<&Material> {
        mesh.material.as_deref().and_then(|n| self.material(n))
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> (Vec<Vertex>, Vec<Mesh>) {
        let up = Vec3::Y;
        let vertices = vec![
            Vertex::new(Vec3::new(1.0, 0.0, -1.0), Vec2::new(1.0, 0.0), up),
            Vertex::new(Vec3::new(-1.0, 0.0, -1.0), Vec2::new(0.0, 0.0), up),
            Vertex::new(Vec3::new(-1.0, 0.0, 1.0), Vec2::new(0.0, 1.0), up),
            Vertex::new(Vec3::new(1.0, 0.0, 1.0), Vec2::new(1.0, 1.0), up),
        ];
        let meshes = vec![Mesh::new(
            "n",
            Some("m".into()),
            vec![Triangle::new(0, 3, 1), Triangle::new(1, 3, 2)],
        )];
        (vertices, meshes)
    }

    #[test]
    fn from_parts_computes_bounds() {
        let (v, m) = quad();
        let model = Model::from_parts(v, vec![Material::default()], m).unwrap();
        let b = model.bounds();
        assert_relative_eq!(b.center.length(), 0.0);
        assert_relative_eq!(b.radius, 2f32.sqrt(), epsilon = 1e-6);
        assert_eq!(model.triangle_count(), 2);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let (v, _) = quad();
        let meshes = vec![Mesh::new("bad", None, vec![Triangle::new(0, 1, 9)])];
        let err = Model::from_parts(v, vec![], meshes).unwrap_err();
        assert!(matches!(err, AssetError::InvalidIndex { index: 9, .. }));
    }

    #[test]
    fn empty_vertex_buffer_is_rejected() {
        assert!(matches!(
            Model::from_parts(vec![], vec![], vec![]),
            Err(AssetError::Empty)
        ));
    }

    #[test]
    fn material_lookup_by_mesh_name() {
        let (v, m) = quad();
        let mat = Material::colored("m", [0.4; 3], [0.6; 3], 20.0, 1.0);
        let model = Model::from_parts(v, vec![mat.clone()], m).unwrap();
        let mesh = &model.meshes()[0];
        assert_eq!(model.material_for(mesh), Some(&mat));
    }

    #[test]
    fn models_get_distinct_ids() {
        let (v, m) = quad();
        let a = Model::from_parts(v.clone(), vec![], m.clone()).unwrap();
        let b = Model::from_parts(v, vec![], m).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
