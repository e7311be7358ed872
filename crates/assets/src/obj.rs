//! Wavefront OBJ + MTL loading on top of `tobj`.

use crate::AssetError;
use crate::material::{Material, TextureRef};
use crate::model::{Mesh, Model, Triangle, Vertex};
use glam::{Vec2, Vec3};
use std::path::Path;

/// Load an OBJ file and the MTL library it references.
///
/// A missing or broken MTL file is not fatal: the meshes fall back to the
/// default material and a warning is logged.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Model, AssetError> {
    let path = path.as_ref();
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| AssetError::Obj {
        path: path.to_path_buf(),
        source,
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let materials = match materials {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(path = %path.display(), "material library not loaded: {e}");
            Vec::new()
        }
    };
    let converted: Vec<Material> = materials
        .iter()
        .enumerate()
        .map(|(i, m)| convert_material(i, m, base))
        .collect();

    let mut vertices = Vec::new();
    let mut meshes = Vec::with_capacity(models.len());
    for model in &models {
        let mesh = &model.mesh;
        let offset = vertices.len() as u32;
        let count = mesh.positions.len() / 3;

        let normals = if mesh.normals.len() == mesh.positions.len() {
            mesh.normals.clone()
        } else {
            face_normals(&mesh.positions, &mesh.indices)
        };
        let has_uv = mesh.texcoords.len() >= count * 2;

        for i in 0..count {
            let position = Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]);
            let normal = Vec3::from_slice(&normals[i * 3..i * 3 + 3]);
            // OBJ puts v=0 at the bottom of the image, textures here are top-down.
            let tex_coord = if has_uv {
                Vec2::new(mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1])
            } else {
                Vec2::ZERO
            };
            vertices.push(Vertex::new(position, tex_coord, normal));
        }

        let triangles = mesh
            .indices
            .chunks_exact(3)
            .map(|t| Triangle::new(t[0] + offset, t[1] + offset, t[2] + offset))
            .collect();
        let material = mesh
            .material_id
            .and_then(|i| converted.get(i))
            .map(|m| m.name.clone());
        meshes.push(Mesh::new(model.name.clone(), material, triangles));
    }

    let model = Model::from_parts(vertices, converted, meshes)?;
    tracing::info!(
        path = %path.display(),
        meshes = model.meshes().len(),
        triangles = model.triangle_count(),
        "model loaded"
    );
    Ok(model)
}

fn convert_material(index: usize, src: &tobj::Material, base: &Path) -> Material {
    let name = if src.name.is_empty() {
        format!("material_{index}")
    } else {
        src.name.clone()
    };
    let defaults = Material::default();
    let param = |key: &str| src.unknown_param.get(key).and_then(|s| parse_vec3(s));
    let scalar = |key: &str| {
        src.unknown_param
            .get(key)
            .and_then(|s| s.trim().parse::<f32>().ok())
    };
    let map = |value: Option<&String>| texture_ref(base, value.map(String::as_str));

    Material {
        name,
        kd: src.diffuse.unwrap_or(defaults.kd),
        ks: src.specular.unwrap_or(defaults.ks),
        ke: src.emissive.or_else(|| param("Ke")).unwrap_or(defaults.ke),
        tf: param("Tf").unwrap_or(defaults.tf),
        ns: src.shininess.unwrap_or(defaults.ns),
        ni: src.optical_density.unwrap_or(defaults.ni),
        illum: src.illumination_model.unwrap_or(defaults.illum),
        d: src.dissolve.unwrap_or(defaults.d),
        tr: scalar("Tr").unwrap_or(defaults.tr),
        map_kd: map(src.diffuse_texture.as_ref()),
        map_ks: map(src.specular_texture.as_ref()),
        map_ns: map(src.shininess_texture.as_ref()),
        map_d: map(src.dissolve_texture.as_ref()),
        map_bump: map(src.normal_texture.as_ref()),
        map_disp: map(
            src.unknown_param
                .get("disp")
                .or_else(|| src.unknown_param.get("map_disp")),
        ),
    }
}

/// Texture statements may carry options (`-bm 0.5 file.png`), the file is last.
fn texture_ref(base: &Path, value: Option<&str>) -> TextureRef {
    match value.and_then(|v| v.split_whitespace().last()) {
        Some(file) => TextureRef::Source(base.join(file)),
        None => TextureRef::None,
    }
}

fn parse_vec3(s: &str) -> Option<[f32; 3]> {
    let parts: Vec<f32> = s
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [v] => Some([*v; 3]),
        [r, g, b, ..] => Some([*r, *g, *b]),
        _ => None,
    }
}

/// Area-weighted vertex normals for meshes exported without `vn` records.
fn face_normals(positions: &[f32], indices: &[u32]) -> Vec<f32> {
    let mut acc = vec![Vec3::ZERO; positions.len() / 3];
    let at = |i: u32| Vec3::from_slice(&positions[i as usize * 3..i as usize * 3 + 3]);
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (at(tri[0]), at(tri[1]), at(tri[2]));
        let n = (b - a).cross(c - a);
        for &i in tri {
            acc[i as usize] += n;
        }
    }
    acc.into_iter()
        .flat_map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    const CUBE_CORNER_OBJ: &str = "\
mtllib test.mtl
o corner
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
vt 0 0
vt 1 0
vt 0 1
vt 1 1
usemtl red
f 1/1 2/2 3/3
f 1/1 4/4 2/2
";

    const MTL: &str = "\
newmtl red
Kd 0.8 0.1 0.1
Ks 0.5 0.5 0.5
Ke 0.2 0.0 0.0
Ns 32
d 1.0
map_Kd textures/red.png
";

    fn write_fixture(dir: &Path, obj: &str, mtl: Option<&str>) -> std::path::PathBuf {
        let obj_path = dir.join("test.obj");
        fs::write(&obj_path, obj).unwrap();
        if let Some(mtl) = mtl {
            fs::write(dir.join("test.mtl"), mtl).unwrap();
        }
        obj_path
    }

    #[test]
    fn loads_geometry_and_materials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), CUBE_CORNER_OBJ, Some(MTL));
        let model = load_obj(&path).unwrap();

        assert_eq!(model.triangle_count(), 2);
        assert_eq!(model.meshes().len(), 1);
        let mesh = &model.meshes()[0];
        assert_eq!(mesh.material.as_deref(), Some("red"));

        let mat = model.material_for(mesh).unwrap();
        assert_eq!(mat.kd, [0.8, 0.1, 0.1]);
        assert_eq!(mat.ke, [0.2, 0.0, 0.0]);
        assert_eq!(mat.ns, 32.0);
        assert_eq!(
            mat.map_kd,
            TextureRef::Source(dir.path().join("textures/red.png"))
        );
    }

    #[test]
    fn missing_normals_are_generated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), CUBE_CORNER_OBJ, Some(MTL));
        let model = load_obj(&path).unwrap();
        for v in model.vertices() {
            assert_relative_eq!(v.normal.length(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn missing_mtl_falls_back_to_default_material() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), CUBE_CORNER_OBJ, None);
        let model = load_obj(&path).unwrap();
        assert!(model.materials().is_empty());
        assert_eq!(model.material_for(&model.meshes()[0]), None);
    }

    #[test]
    fn missing_obj_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_obj(dir.path().join("nope.obj")).unwrap_err();
        assert!(matches!(err, AssetError::Obj { .. }));
    }

    #[test]
    fn texture_options_are_skipped() {
        let r = texture_ref(Path::new("res"), Some("-bm 0.5 bump.png"));
        assert_eq!(r, TextureRef::Source(Path::new("res").join("bump.png")));
        assert_eq!(texture_ref(Path::new("res"), None), TextureRef::None);
    }

    #[test]
    fn vec3_params() {
        assert_eq!(parse_vec3("0.5"), Some([0.5; 3]));
        assert_eq!(parse_vec3("1 0.6 0"), Some([1.0, 0.6, 0.0]));
        assert_eq!(parse_vec3("x"), None);
    }

    #[test]
    fn emissive_without_diffuse_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mtl = "newmtl glow\nKe 1 0.6 0\n";
        let obj = CUBE_CORNER_OBJ.replace("usemtl red", "usemtl glow");
        let path = write_fixture(dir.path(), &obj, Some(mtl));
        let model = load_obj(&path).unwrap();
        let mat = model.material_for(&model.meshes()[0]).unwrap();
        assert_eq!(mat.ke, [1.0, 0.6, 0.0]);
        assert_eq!(mat.kd, Material::default().kd);
    }
}
