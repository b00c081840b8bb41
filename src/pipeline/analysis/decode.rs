//! Encoded photo bytes to an upright `RawImage`.
//!
//! Phone cameras store pixels in sensor order and record the intended
//! rotation in EXIF tag 0x0112. Skin segmentation does not care about
//! rotation, but report dimensions and spectral views do, so the tag is
//! honored before anything else sees the pixels.

use std::io::Cursor;

use image::DynamicImage;

use super::types::RawImage;
use super::AnalysisError;

/// EXIF orientation, restricted to the eight defined values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    Mirrored,
    Rotated180,
    Flipped,
    MirroredRotated90,
    Rotated90,
    MirroredRotated270,
    Rotated270,
}

impl Orientation {
    /// Unknown tag values are treated as upright.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::Mirrored,
            3 => Self::Rotated180,
            4 => Self::Flipped,
            5 => Self::MirroredRotated90,
            6 => Self::Rotated90,
            7 => Self::MirroredRotated270,
            8 => Self::Rotated270,
            _ => Self::Upright,
        }
    }

    /// Read the orientation tag; absent or unreadable EXIF means upright.
    pub fn read(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let Ok(reader) = exif::Reader::new().read_from_container(&mut cursor) else {
            return Self::Upright;
        };
        reader
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Self::from_exif)
            .unwrap_or(Self::Upright)
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Upright => img,
            Self::Mirrored => img.fliph(),
            Self::Rotated180 => img.rotate180(),
            Self::Flipped => img.flipv(),
            Self::MirroredRotated90 => img.rotate90().fliph(),
            Self::Rotated90 => img.rotate90(),
            Self::MirroredRotated270 => img.rotate270().fliph(),
            Self::Rotated270 => img.rotate270(),
        }
    }
}

/// Decode JPEG/PNG/TIFF bytes and apply EXIF orientation.
pub fn decode_photo(bytes: &[u8]) -> Result<RawImage, AnalysisError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AnalysisError::UnreadableImage(e.to_string()))?;
    let upright = Orientation::read(bytes).apply(img);
    Ok(RawImage::from(&upright))
}
