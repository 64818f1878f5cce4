//! Image metadata and perceptual fingerprint (blurhash) codec.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageError, ImageFormat, ImageReader, RgbaImage};

use vfs_core::defaults::{BLURHASH_COMPONENTS_X, BLURHASH_COMPONENTS_Y, PREVIEW_MAX_ASPECT};
use vfs_core::{Error, Result};

/// Decoded facts about one stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub blurhash: Option<String>,
}

fn image_error(e: ImageError) -> Error {
    match e {
        ImageError::IoError(io) => Error::Io(io),
        other => Error::Image(other.to_string()),
    }
}

/// Width and height from the image header only.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
        .map_err(image_error)
}

/// Header dimensions, then a full decode for the optional blurhash.
///
/// Blocking; run it off the async executor.
pub fn analyze(path: &Path, with_blurhash: bool) -> Result<ImageInfo> {
    let (width, height) = read_dimensions(path)?;

    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(image_error)?;

    let blurhash = if with_blurhash {
        Some(encode_blurhash(&img)?)
    } else {
        None
    };

    Ok(ImageInfo {
        width,
        height,
        blurhash,
    })
}

/// Blurhash with the fixed 4x3 component grid.
pub fn encode_blurhash(img: &DynamicImage) -> Result<String> {
    let rgba = img.to_rgba8();
    blurhash::encode(
        BLURHASH_COMPONENTS_X,
        BLURHASH_COMPONENTS_Y,
        rgba.width(),
        rgba.height(),
        rgba.as_raw(),
    )
    .map_err(|e| Error::Image(e.to_string()))
}

/// Preview height for `width` keeping the stored aspect ratio, capped at
/// [`PREVIEW_MAX_ASPECT`] times the width.
pub fn preview_height(width: u32, stored_width: i32, stored_height: i32) -> u32 {
    if stored_width <= 0 || stored_height <= 0 {
        return width;
    }
    let h = (f64::from(width) * f64::from(stored_height) / f64::from(stored_width)).round();
    let max = width.saturating_mul(PREVIEW_MAX_ASPECT).max(1);
    (h.min(f64::from(max)) as u32).max(1)
}

/// Decode a blurhash into a `width`x`height` PNG.
pub fn render_preview(blurhash: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = blurhash::decode(blurhash, width, height, 1.0)
        .map_err(|e| Error::Image(e.to_string()))?;
    let img = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::Image("decoded preview has unexpected size".into()))?;

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(image_error)?;
    Ok(buf.into_inner())
}
