use crate::buffer::{Mask, PixelBuffer};
use crate::config::SegmentationQuality;
use image::{imageops, GrayImage, Luma, Rgba};

/// How a reduced-resolution mask is brought up to frame size.
/// Both filters only ever mix existing values, so the 0-255 range is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

impl Interpolation {
    fn filter(self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
        }
    }
}

/// Frame/mask conversions around the oracle
pub struct Preprocessor;

impl Preprocessor {
    /// Scale a frame down for the oracle according to the quality tier.
    /// Returns `None` when the frame can be sent as-is.
    pub fn oracle_input(frame: &PixelBuffer, quality: SegmentationQuality) -> Option<PixelBuffer> {
        let scale = quality.input_scale();
        if scale >= 1.0 {
            return None;
        }
        let _span = tracing::debug_span!("downscale_oracle_input").entered();
        let (w, h) = frame.dimensions();
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        Some(imageops::resize(frame, nw, nh, imageops::FilterType::Triangle))
    }

    /// Bring a mask to `width`x`height`.
    ///
    /// The confidence channel (R) is resampled and written back as opaque gray.
    pub fn upscale_mask(mask: &Mask, width: u32, height: u32, interpolation: Interpolation) -> Mask {
        if mask.dimensions() == (width, height) {
            return mask.clone();
        }
        let _span = tracing::debug_span!("upscale_mask").entered();

        let (mw, mh) = mask.dimensions();
        let confidence = GrayImage::from_fn(mw, mh, |x, y| Luma([mask.get_pixel(x, y)[0]]));
        let resized = imageops::resize(&confidence, width, height, interpolation.filter());

        Mask::from_fn(width, height, |x, y| {
            let v = resized.get_pixel(x, y)[0];
            Rgba([v, v, v, 255])
        })
    }

    /// Convert a float matte (0.0 = background, 1.0 = foreground) to a mask buffer
    pub fn matte_to_mask(matte: &[f32], width: u32, height: u32) -> Mask {
        Mask::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            let value = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
            Rgba([value, value, value, 255])
        })
    }

    /// Preprocess an RGBA frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    #[cfg(feature = "onnx")]
    pub fn to_nchw(frame: &PixelBuffer, target_width: u32, target_height: u32) -> ndarray::Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let image = if frame.dimensions() != (target_width, target_height) {
            resized = imageops::resize(frame, target_width, target_height, imageops::FilterType::Triangle);
            &resized
        } else {
            frame
        };

        let (width, height) = image.dimensions();
        let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}
