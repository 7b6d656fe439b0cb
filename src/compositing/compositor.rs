use super::background::{BackgroundImage, ScaledBackground};
use super::blur::gaussian_blur_into;
use crate::buffer::{self, PixelBuffer};
use crate::config::{BackgroundMode, CompositeConfig};

/// Blends a frame with a background effect under a refined matte.
///
/// Holds the blurred-frame and scaled-background scratch; both are reused
/// until the frame dimensions (or the background image) change.
#[derive(Debug, Default)]
pub struct FrameCompositor {
    blurred: PixelBuffer,
    blur_scratch: Vec<u8>,
    background: ScaledBackground,
}

/// What the compositor ended up doing with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOutcome {
    Passthrough,
    Blurred,
    Replaced,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose into a freshly allocated buffer.
    pub fn compose(
        &mut self,
        frame: &PixelBuffer,
        matte: Option<&PixelBuffer>,
        config: &CompositeConfig,
        background: Option<&BackgroundImage>,
    ) -> PixelBuffer {
        let mut out = PixelBuffer::new(frame.width(), frame.height());
        self.compose_into(frame, matte, config, background, &mut out);
        out
    }

    /// Compose into `out`, resizing it to the frame when needed.
    ///
    /// Passthrough (a byte-identical copy of `frame`) when the mode is `None`,
    /// when there is no matte, when `Replace` has no background, or when the
    /// matte does not match the frame dimensions.
    pub fn compose_into(
        &mut self,
        frame: &PixelBuffer,
        matte: Option<&PixelBuffer>,
        config: &CompositeConfig,
        background: Option<&BackgroundImage>,
        out: &mut PixelBuffer,
    ) -> CompositeOutcome {
        let _span = tracing::debug_span!("compose").entered();
        let (width, height) = frame.dimensions();
        buffer::ensure_dimensions(out, width, height);

        let Some(matte) = matte else {
            out.copy_from_slice(frame);
            return CompositeOutcome::Passthrough;
        };
        if let Err(err) = buffer::check_matte_fits(frame, matte) {
            tracing::warn!(error = %err, "Passing frame through");
            out.copy_from_slice(frame);
            return CompositeOutcome::Passthrough;
        }

        match (config.background_mode, background) {
            (BackgroundMode::Blur, _) => {
                self.blur_frame(frame, config.background_blur_radius());
                blend(frame, &self.blurred, matte, out);
                CompositeOutcome::Blurred
            }
            (BackgroundMode::Replace, Some(bg)) => {
                let canvas = self.background.get(bg, width, height);
                blend(frame, canvas, matte, out);
                CompositeOutcome::Replaced
            }
            (BackgroundMode::Replace, None) | (BackgroundMode::None, _) => {
                out.copy_from_slice(frame);
                CompositeOutcome::Passthrough
            }
        }
    }

    fn blur_frame(&mut self, frame: &PixelBuffer, radius: u32) {
        let _span = tracing::debug_span!("blur_background", radius).entered();
        let (width, height) = frame.dimensions();
        buffer::ensure_dimensions(&mut self.blurred, width, height);
        gaussian_blur_into(
            frame,
            &mut self.blurred,
            &mut self.blur_scratch,
            width,
            height,
            4,
            3,
            radius,
        );
    }
}

/// out = frame * m + backdrop * (1 - m) per RGB channel with m = matte.R / 255; A = 255.
pub fn blend(frame: &PixelBuffer, backdrop: &PixelBuffer, matte: &PixelBuffer, out: &mut PixelBuffer) {
    let pixels = out
        .chunks_exact_mut(4)
        .zip(frame.chunks_exact(4))
        .zip(backdrop.chunks_exact(4))
        .zip(matte.chunks_exact(4));
    for (((o, f), b), m) in pixels {
        let m = m[0] as f32 / 255.0;
        let inv = 1.0 - m;
        for c in 0..3 {
            o[c] = (f[c] as f32 * m + b[c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
        }
        o[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{gray_mask, solid};
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            image::Rgba([(x * 23 % 256) as u8, (y * 41 % 256) as u8, ((x + y) * 7 % 256) as u8, 200])
        })
    }

    fn config(mode: BackgroundMode) -> CompositeConfig {
        CompositeConfig {
            background_mode: mode,
            ..CompositeConfig::default()
        }
    }

    fn background() -> BackgroundImage {
        BackgroundImage::from_rgb(RgbImage::from_pixel(3, 2, Rgb([9, 8, 7]))).unwrap()
    }

    #[test]
    fn mode_none_is_byte_identical() {
        let frame = gradient(12, 9);
        let matte = gray_mask(12, 9, 0);
        let bg = background();
        let mut compositor = FrameCompositor::new();
        let out = compositor.compose(&frame, Some(&matte), &config(BackgroundMode::None), Some(&bg));
        assert_eq!(out.as_raw(), frame.as_raw());
    }

    #[test]
    fn missing_matte_is_passthrough_for_every_mode() {
        let frame = gradient(7, 5);
        let bg = background();
        let mut compositor = FrameCompositor::new();
        for mode in [BackgroundMode::Blur, BackgroundMode::Replace] {
            let out = compositor.compose(&frame, None, &config(mode), Some(&bg));
            assert_eq!(out.as_raw(), frame.as_raw());
        }
    }

    #[test]
    fn replace_without_background_is_passthrough() {
        let frame = gradient(6, 6);
        let matte = gray_mask(6, 6, 0);
        let mut out = PixelBuffer::new(1, 1);
        let outcome = FrameCompositor::new().compose_into(
            &frame,
            Some(&matte),
            &config(BackgroundMode::Replace),
            None,
            &mut out,
        );
        assert_eq!(outcome, CompositeOutcome::Passthrough);
        assert_eq!(out.as_raw(), frame.as_raw());
    }

    #[test]
    fn mismatched_matte_is_passthrough() {
        let frame = gradient(6, 6);
        let matte = gray_mask(3, 3, 0);
        let out = FrameCompositor::new().compose(&frame, Some(&matte), &config(BackgroundMode::Blur), None);
        assert_eq!(out.as_raw(), frame.as_raw());
    }

    #[test]
    fn full_matte_in_blur_mode_reproduces_frame() {
        let frame = gradient(16, 10);
        let matte = gray_mask(16, 10, 255);
        let out = FrameCompositor::new().compose(&frame, Some(&matte), &config(BackgroundMode::Blur), None);
        for (o, f) in out.pixels().zip(frame.pixels()) {
            assert_eq!(&o.0[..3], &f.0[..3]);
            assert_eq!(o[3], 255);
        }
    }

    #[test]
    fn empty_matte_in_blur_mode_reproduces_blurred_frame() {
        let frame = gradient(16, 10);
        let cfg = config(BackgroundMode::Blur);
        let mut expected = vec![0u8; frame.len()];
        gaussian_blur_into(
            &frame,
            &mut expected,
            &mut Vec::new(),
            16,
            10,
            4,
            3,
            cfg.background_blur_radius(),
        );

        let matte = gray_mask(16, 10, 0);
        let out = FrameCompositor::new().compose(&frame, Some(&matte), &cfg, None);
        for (o, e) in out.chunks_exact(4).zip(expected.chunks_exact(4)) {
            assert_eq!(&o[..3], &e[..3]);
            assert_eq!(o[3], 255);
        }
    }

    #[test]
    fn empty_matte_in_replace_mode_shows_background() {
        let frame = gradient(8, 4);
        let matte = gray_mask(8, 4, 0);
        let bg = background();
        let out = FrameCompositor::new().compose(&frame, Some(&matte), &config(BackgroundMode::Replace), Some(&bg));
        assert!(out.pixels().all(|px| px.0 == [9, 8, 7, 255]));
    }

    #[test]
    fn half_matte_averages_frame_and_background() {
        let frame = solid(2, 2, [200, 100, 0, 255]);
        let backdrop = solid(2, 2, [0, 100, 200, 255]);
        let matte = gray_mask(2, 2, 51); // m = 0.2
        let mut out = PixelBuffer::new(2, 2);
        blend(&frame, &backdrop, &matte, &mut out);
        assert!(out.pixels().all(|px| px.0 == [40, 100, 160, 255]));
    }

    #[test]
    fn output_is_always_opaque() {
        let frame = gradient(9, 9);
        let matte = PixelBuffer::from_fn(9, 9, |x, _| {
            let v = (x * 30) as u8;
            image::Rgba([v, v, v, 255])
        });
        let bg = background();
        let mut compositor = FrameCompositor::new();
        for mode in [BackgroundMode::Blur, BackgroundMode::Replace] {
            let out = compositor.compose(&frame, Some(&matte), &config(mode), Some(&bg));
            assert!(out.pixels().all(|px| px[3] == 255));
        }
    }
}
