use super::{MediaError, catalog};
use image::{DynamicImage, ImageReader};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Geometric correction for an EXIF orientation code, as applied to
/// embedded EXIF thumbnails. Full images go through [`auto_orient`].
///
/// Rotation angles are counter-clockwise. The flips are applied before the
/// rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal,
    FlipVertical,
    Rotate180,
    Rotate180Flip,
    Rotate270Flip,
    Rotate270,
    Rotate90Flip,
    Rotate90,
}

impl Orientation {
    pub fn from_exif(code: u32) -> Option<Self> {
        match code {
            1 => Some(Orientation::Normal),
            2 => Some(Orientation::FlipVertical),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::Rotate180Flip),
            5 => Some(Orientation::Rotate270Flip),
            6 => Some(Orientation::Rotate270),
            7 => Some(Orientation::Rotate90Flip),
            8 => Some(Orientation::Rotate90),
            _ => None,
        }
    }

    pub fn needs_correction(&self) -> bool {
        *self != Orientation::Normal
    }

    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        // DynamicImage rotates clockwise, so a counter-clockwise 270 is a
        // clockwise 90 and vice versa.
        match self {
            Orientation::Normal => img,
            Orientation::FlipVertical => img.flipv(),
            Orientation::Rotate180 => img.rotate180(),
            Orientation::Rotate180Flip => img.flipv().rotate180(),
            Orientation::Rotate270Flip => img.flipv().rotate90(),
            Orientation::Rotate270 => img.rotate90(),
            Orientation::Rotate90Flip => img.flipv().rotate270(),
            Orientation::Rotate90 => img.rotate270(),
        }
    }
}

/// The parts of a JPEG's EXIF block the cache cares about.
#[derive(Debug, Default, Clone)]
pub struct ExifInfo {
    pub orientation: Option<u32>,
    pub thumbnail: Option<Vec<u8>>,
}

impl ExifInfo {
    pub fn orientation(&self) -> Orientation {
        self.orientation
            .and_then(Orientation::from_exif)
            .unwrap_or(Orientation::Normal)
    }
}

/// Read EXIF metadata from a JPEG file. Every other format has no metadata.
pub fn read_exif(path: &Path) -> Option<ExifInfo> {
    let file_name = path.file_name()?.to_str()?;
    if !catalog::is_jpeg(file_name) {
        return None;
    }

    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Could not open {} for EXIF decoding: {}", path.display(), e);
            return None;
        }
    };

    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("No EXIF data for {}: {}", path.display(), e);
            return None;
        }
    };

    let orientation = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0));

    let thumbnail = embedded_thumbnail_bytes(&exif);

    Some(ExifInfo {
        orientation,
        thumbnail,
    })
}

fn embedded_thumbnail_bytes(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(exif::Tag::JPEGInterchangeFormat, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(exif::Tag::JPEGInterchangeFormatLength, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;

    let buf = exif.buf();
    if length == 0 || offset.checked_add(length)? > buf.len() {
        debug!("Embedded thumbnail points outside the EXIF block");
        return None;
    }

    Some(buf[offset..offset + length].to_vec())
}

/// Orientation code stored in the image, if any.
pub fn orientation_code(path: &Path) -> Option<u32> {
    read_exif(path).and_then(|info| info.orientation)
}

/// True when the image carries an orientation code of 2 through 8.
pub fn needs_rotation(path: &Path) -> bool {
    orientation_code(path)
        .and_then(Orientation::from_exif)
        .map(|o| o.needs_correction())
        .unwrap_or(false)
}

/// Decode an image without applying any orientation.
pub fn open_image(path: &Path) -> Result<DynamicImage, MediaError> {
    let file = std::fs::File::open(path).map_err(|e| MediaError::from_open(path, e))?;
    let reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| MediaError::from_open(path, e))?;
    reader.decode().map_err(|e| MediaError::decode(path, e))
}

/// Turn a full decoded image upright using standard EXIF orientation
/// semantics (code 2 mirrors horizontally, code 4 vertically).
pub fn auto_orient(mut img: DynamicImage, code: u32) -> DynamicImage {
    let orientation = u8::try_from(code)
        .ok()
        .and_then(image::metadata::Orientation::from_exif);
    if let Some(orientation) = orientation {
        img.apply_orientation(orientation);
    }
    img
}

/// Decode an image and correct it according to its EXIF orientation.
pub fn open_oriented(path: &Path) -> Result<DynamicImage, MediaError> {
    let img = open_image(path)?;
    match orientation_code(path) {
        Some(code) if code > 1 => {
            debug!("Applying orientation {} to {}", code, path.display());
            Ok(auto_orient(img, code))
        }
        _ => Ok(img),
    }
}

/// Pixel dimensions of an image as stored (before orientation).
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), MediaError> {
    let file = std::fs::File::open(path).map_err(|e| MediaError::from_open(path, e))?;
    let reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| MediaError::from_open(path, e))?;
    reader
        .into_dimensions()
        .map_err(|e| MediaError::decode(path, e))
}

/// The embedded EXIF thumbnail of a JPEG, corrected for orientation.
///
/// If the embedded thumbnail needs rotating but cannot be decoded, the raw
/// bytes are returned as-is.
pub fn oriented_embedded_thumbnail(path: &Path, quality: u8) -> Option<Vec<u8>> {
    let info = read_exif(path)?;
    let thumbnail = info.thumbnail.clone()?;
    let orientation = info.orientation();

    if !orientation.needs_correction() {
        return Some(thumbnail);
    }

    match image::load_from_memory(&thumbnail) {
        Ok(img) => {
            let rotated = orientation.apply(img);
            match crate::cache::encode_jpeg(&rotated, quality) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Unable to encode rotated EXIF thumbnail for {}: {}", path.display(), e);
                    Some(thumbnail)
                }
            }
        }
        Err(_) => {
            warn!("Unable to decode EXIF thumbnail for {}", path.display());
            Some(thumbnail)
        }
    }
}
