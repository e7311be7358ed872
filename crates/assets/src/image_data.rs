use crate::AssetError;
use std::path::{Path, PathBuf};

/// Decoded RGBA8 image, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        tracing::debug!(path = %path.display(), width, height, "image decoded");
        Ok(Self {
            width,
            height,
            rgba: img.into_raw(),
        })
    }

    /// A single-color image, used as a stand-in when a map is absent.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let rgba = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

/// Six environment faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone)]
pub struct CubeFaces {
    pub faces: [ImageData; 6],
}

impl CubeFaces {
    pub fn load(paths: &[PathBuf; 6]) -> Result<Self, AssetError> {
        let [px, nx, py, ny, pz, nz] = paths;
        let faces = [
            ImageData::load(px)?,
            ImageData::load(nx)?,
            ImageData::load(py)?,
            ImageData::load(ny)?,
            ImageData::load(pz)?,
            ImageData::load(nz)?,
        ];
        Self::from_faces(faces)
    }

    /// All faces must be square and of equal size.
    pub fn from_faces(faces: [ImageData; 6]) -> Result<Self, AssetError> {
        let size = faces[0].width;
        if let Some(bad) = faces
            .iter()
            .position(|f| f.width != size || f.height != size)
        {
            return Err(AssetError::SkyboxFaceMismatch {
                face: bad,
                expected: size,
                width: faces[bad].width,
                height: faces[bad].height,
            });
        }
        Ok(Self { faces })
    }

    pub fn size(&self) -> u32 {
        self.faces[0].width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, w: u32, h: u32) {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn loads_png_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        write_png(&path, 3, 2);
        let data = ImageData::load(&path).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.rgba.len(), 3 * 2 * 4);
        assert_eq!(&data.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ImageData::load("does/not/exist.png").unwrap_err();
        match err {
            AssetError::Image { path, .. } => assert!(path.ends_with("exist.png")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn solid_fills_every_pixel() {
        let img = ImageData::solid(2, 2, [1, 2, 3, 4]);
        assert_eq!(img.rgba, [1, 2, 3, 4].repeat(4));
        assert_eq!(img.bytes_per_row(), 8);
    }

    #[test]
    fn cube_faces_must_match() {
        let ok = std::array::from_fn(|_| ImageData::solid(4, 4, [0; 4]));
        assert_eq!(CubeFaces::from_faces(ok).unwrap().size(), 4);

        let mut faces: [ImageData; 6] = std::array::from_fn(|_| ImageData::solid(4, 4, [0; 4]));
        faces[3] = ImageData::solid(4, 2, [0; 4]);
        let err = CubeFaces::from_faces(faces).unwrap_err();
        assert!(matches!(err, AssetError::SkyboxFaceMismatch { face: 3, .. }));
    }

    #[test]
    fn cube_faces_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths: [PathBuf; 6] = std::array::from_fn(|i| dir.path().join(format!("f{i}.png")));
        for p in &paths {
            write_png(p, 8, 8);
        }
        assert_eq!(CubeFaces::load(&paths).unwrap().size(), 8);
    }
}
