//! CPU-side subdivision for the displaced draw path.
//!
//! Each triangle is split into a regular barycentric grid with `segments`
//! subdivisions per edge: `segments²` triangles and
//! `(segments + 1)(segments + 2) / 2` vertices. Attributes are interpolated
//! linearly and normals renormalised; displacement itself happens in the
//! vertex shader.

use scenegraph_assets::{Model, Vertex};
use std::ops::Range;

/// A contiguous index range drawn with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    /// Index into `Model::materials`, `None` for the default material.
    pub material: Option<usize>,
    pub indices: Range<u32>,
}

/// Flat vertex and index arrays ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
}

impl MeshGeometry {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Geometry for `model`, subdivided when `segments > 1`.
///
/// With one segment the model's shared vertex array is used as-is.
pub fn build_geometry(model: &Model, segments: u32) -> MeshGeometry {
    let segments = segments.max(1);
    let mut out = MeshGeometry::default();
    if segments == 1 {
        out.vertices = model.vertices().to_vec();
    }

    for mesh in model.meshes() {
        let start = out.indices.len() as u32;
        for tri in &mesh.triangles {
            if segments == 1 {
                out.indices.extend_from_slice(&tri.indices);
                continue;
            }
            let [a, b, c] = tri.indices.map(|i| model.vertices()[i as usize]);
            let base = out.vertices.len() as u32;
            let (vertices, triangles) = subdivide_triangle(&a, &b, &c, segments);
            out.vertices.extend(vertices);
            out.indices
                .extend(triangles.iter().flat_map(|t| t.map(|i| base + i)));
        }
        let material = mesh
            .material
            .as_deref()
            .and_then(|name| model.materials().iter().position(|m| m.name == name));
        out.submeshes.push(SubMesh {
            material,
            indices: start..out.indices.len() as u32,
        });
    }
    out
}

/// Split one triangle into a barycentric grid, keeping its winding.
pub fn subdivide_triangle(
    a: &Vertex,
    b: &Vertex,
    c: &Vertex,
    segments: u32,
) -> (Vec<Vertex>, Vec<[u32; 3]>) {
    let n = segments.max(1);
    let inv = 1.0 / n as f32;
    let mut vertices = Vec::with_capacity(((n + 1) * (n + 2) / 2) as usize);

    // Row `i` walks from edge a-b towards c and holds n + 1 - i vertices.
    for i in 0..=n {
        for j in 0..=(n - i) {
            let u = j as f32 * inv;
            let v = i as f32 * inv;
            let w = 1.0 - u - v;
            let normal = (a.normal * w + b.normal * u + c.normal * v)
                .try_normalize()
                .unwrap_or(a.normal);
            vertices.push(Vertex::new(
                a.position * w + b.position * u + c.position * v,
                a.tex_coord * w + b.tex_coord * u + c.tex_coord * v,
                normal,
            ));
        }
    }

    let row_start = |i: u32| i * (n + 1) - i * i.saturating_sub(1) / 2;
    let at = |i: u32, j: u32| row_start(i) + j;

    let mut triangles = Vec::with_capacity((n * n) as usize);
    for i in 0..n {
        for j in 0..(n - i) {
            triangles.push([at(i, j), at(i, j + 1), at(i + 1, j)]);
            if j + 1 < n - i {
                triangles.push([at(i, j + 1), at(i + 1, j + 1), at(i + 1, j)]);
            }
        }
    }
    (vertices, triangles)
}
