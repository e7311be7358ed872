//! Procedural models for scenes that have no asset files at hand.

use crate::AssetError;
use crate::material::Material;
use crate::model::{Mesh, Model, Triangle, Vertex};
use glam::{Vec2, Vec3};

/// Horizontal square centered on the origin, facing +Y, UVs spanning 0..1.
pub fn plane(half_extent: f32, material: Material) -> Result<Model, AssetError> {
    let h = half_extent;
    let up = Vec3::Y;
    let vertices = vec![
        Vertex::new(Vec3::new(h, 0.0, -h), Vec2::new(1.0, 0.0), up),
        Vertex::new(Vec3::new(-h, 0.0, -h), Vec2::new(0.0, 0.0), up),
        Vertex::new(Vec3::new(-h, 0.0, h), Vec2::new(0.0, 1.0), up),
        Vertex::new(Vec3::new(h, 0.0, h), Vec2::new(1.0, 1.0), up),
    ];
    let mesh = Mesh::new(
        "plane",
        Some(material.name.clone()),
        vec![Triangle::new(0, 1, 3), Triangle::new(1, 2, 3)],
    );
    Model::from_parts(vertices, vec![material], vec![mesh])
}

/// Axis-aligned box with its base on y=0 and per-face normals.
pub fn cuboid(size: Vec3, material: Material) -> Result<Model, AssetError> {
    let (x, y, z) = (size.x * 0.5, size.y, size.z * 0.5);
    // (normal, four corners counter-clockwise seen from outside)
    let faces: [(Vec3, [Vec3; 4]); 6] = [
        (Vec3::Z, [Vec3::new(-x, 0.0, z), Vec3::new(x, 0.0, z), Vec3::new(x, y, z), Vec3::new(-x, y, z)]),
        (Vec3::NEG_Z, [Vec3::new(x, 0.0, -z), Vec3::new(-x, 0.0, -z), Vec3::new(-x, y, -z), Vec3::new(x, y, -z)]),
        (Vec3::X, [Vec3::new(x, 0.0, z), Vec3::new(x, 0.0, -z), Vec3::new(x, y, -z), Vec3::new(x, y, z)]),
        (Vec3::NEG_X, [Vec3::new(-x, 0.0, -z), Vec3::new(-x, 0.0, z), Vec3::new(-x, y, z), Vec3::new(-x, y, -z)]),
        (Vec3::Y, [Vec3::new(-x, y, z), Vec3::new(x, y, z), Vec3::new(x, y, -z), Vec3::new(-x, y, -z)]),
        (Vec3::NEG_Y, [Vec3::new(-x, 0.0, -z), Vec3::new(x, 0.0, -z), Vec3::new(x, 0.0, z), Vec3::new(-x, 0.0, z)]),
    ];
    let uvs = [
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut triangles = Vec::with_capacity(12);
    for (normal, corners) in faces {
        let base = vertices.len() as u32;
        for (corner, uv) in corners.into_iter().zip(uvs) {
            vertices.push(Vertex::new(corner, uv, normal));
        }
        triangles.push(Triangle::new(base, base + 1, base + 2));
        triangles.push(Triangle::new(base + 2, base + 3, base));
    }
    let mesh = Mesh::new("cuboid", Some(material.name.clone()), triangles);
    Model::from_parts(vertices, vec![material], vec![mesh])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_has_two_upward_triangles() {
        let model = plane(50.0, Material::default()).unwrap();
        assert_eq!(model.triangle_count(), 2);
        let v = model.vertices();
        for tri in &model.meshes()[0].triangles {
            let [a, b, c] = tri.indices.map(|i| v[i as usize].position);
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn cuboid_winding_faces_outward() {
        let model = cuboid(Vec3::new(2.0, 4.0, 2.0), Material::default()).unwrap();
        assert_eq!(model.vertices().len(), 24);
        assert_eq!(model.triangle_count(), 12);
        let v = model.vertices();
        for tri in &model.meshes()[0].triangles {
            let [a, b, c] = tri.indices.map(|i| v[i as usize]);
            let face = (b.position - a.position).cross(c.position - a.position);
            assert!(face.dot(a.normal) > 0.0, "triangle {tri:?} faces inward");
        }
    }
}
