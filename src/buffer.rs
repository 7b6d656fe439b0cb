use crate::error::{BackdropError, Result};
use image::{Rgba, RgbaImage};

/// Row-major RGBA8 frame. Buffers produced by the pipeline always carry A = 255.
pub type PixelBuffer = RgbaImage;

/// Grayscale-coded confidence mask: R = G = B, 0 = background, 255 = foreground.
pub type Mask = PixelBuffer;

/// Wrap raw RGBA bytes, checking that the length matches the dimensions.
pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<PixelBuffer> {
    let len = pixels.len();
    RgbaImage::from_raw(width, height, pixels).ok_or(BackdropError::BufferSize {
        width,
        height,
        len,
    })
}

/// Fill a buffer with one color.
pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

/// Uniform mask of confidence `value`.
pub fn gray_mask(width: u32, height: u32, value: u8) -> Mask {
    solid(width, height, [value, value, value, 255])
}

/// A mask with zero width or height carries no information and must not be cached.
pub fn is_usable_mask(mask: &Mask) -> bool {
    mask.width() > 0 && mask.height() > 0
}

/// Like [`is_usable_mask`], reporting why a mask is unusable.
pub fn check_mask(mask: &Mask) -> Result<()> {
    if is_usable_mask(mask) {
        Ok(())
    } else {
        Err(BackdropError::EmptyMask {
            width: mask.width(),
            height: mask.height(),
        })
    }
}

/// A matte can only be blended over a frame of exactly its size.
pub fn check_matte_fits(frame: &PixelBuffer, matte: &Mask) -> Result<()> {
    if frame.dimensions() == matte.dimensions() {
        return Ok(());
    }
    Err(BackdropError::DimensionMismatch {
        frame_width: frame.width(),
        frame_height: frame.height(),
        matte_width: matte.width(),
        matte_height: matte.height(),
    })
}

/// Confidence plane of a mask (its R channel) into `plane`, resizing it as needed.
pub(crate) fn extract_plane(mask: &Mask, plane: &mut Vec<u8>) {
    plane.clear();
    plane.extend(mask.as_raw().chunks_exact(4).map(|px| px[0]));
}

/// Write a confidence plane back out as an opaque gray mask.
pub(crate) fn write_plane(plane: &[u8], out: &mut Mask) {
    for (px, &v) in out.chunks_exact_mut(4).zip(plane) {
        px.copy_from_slice(&[v, v, v, 255]);
    }
}

/// Make `buf` exactly `width`x`height`, reallocating only when the dimensions change.
pub(crate) fn ensure_dimensions(buf: &mut PixelBuffer, width: u32, height: u32) {
    if buf.dimensions() != (width, height) {
        tracing::debug!(width, height, "Reallocating scratch buffer");
        *buf = RgbaImage::new(width, height);
    }
}
