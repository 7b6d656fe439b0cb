use crate::buffer::{self, PixelBuffer};
use crate::error::{BackdropError, Result};
use image::{imageops, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BACKGROUND_ID: AtomicU64 = AtomicU64::new(1);

/// Replacement background. Read-only once constructed; replace it by building a new one.
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    id: u64,
    image: Arc<RgbImage>,
}

impl BackgroundImage {
    pub fn from_rgb(image: RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BackdropError::EmptyBackground);
        }
        Ok(Self {
            id: NEXT_BACKGROUND_ID.fetch_add(1, Ordering::Relaxed),
            image: Arc::new(image),
        })
    }

    /// Decode any format the `image` crate understands.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading background image from {}", path.display());
        let image = image::open(path)?.to_rgb8();
        Self::from_rgb(image)
    }

    /// Identity used to invalidate cached scaled copies
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Placement of an image scaled to cover a canvas, centered, overflow cropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub draw_width: f32,
    pub draw_height: f32,
    /// <= 0; the image starts left of the canvas when it overflows horizontally
    pub offset_x: f32,
    /// <= 0; the image starts above the canvas when it overflows vertically
    pub offset_y: f32,
}

impl CoverFit {
    pub fn compute(image_width: u32, image_height: u32, canvas_width: u32, canvas_height: u32) -> Self {
        let (cw, ch) = (canvas_width as f32, canvas_height as f32);
        let image_ratio = image_width as f32 / image_height as f32;
        let canvas_ratio = cw / ch;

        if image_ratio > canvas_ratio {
            let draw_width = ch * image_ratio;
            Self {
                draw_width,
                draw_height: ch,
                offset_x: (cw - draw_width) / 2.0,
                offset_y: 0.0,
            }
        } else {
            let draw_height = cw / image_ratio;
            Self {
                draw_width: cw,
                draw_height,
                offset_x: 0.0,
                offset_y: (ch - draw_height) / 2.0,
            }
        }
    }
}

/// Cover-fit copy of a background, kept until the canvas size or image changes.
#[derive(Debug, Default)]
pub(crate) struct ScaledBackground {
    key: Option<(u64, u32, u32)>,
    canvas: PixelBuffer,
}

impl ScaledBackground {
    pub(crate) fn get(&mut self, background: &BackgroundImage, width: u32, height: u32) -> &PixelBuffer {
        let key = (background.id(), width, height);
        if self.key != Some(key) {
            self.redraw(background, width, height);
            self.key = Some(key);
        }
        &self.canvas
    }

    fn redraw(&mut self, background: &BackgroundImage, width: u32, height: u32) {
        let _span = tracing::debug_span!("draw_background").entered();
        buffer::ensure_dimensions(&mut self.canvas, width, height);
        if width == 0 || height == 0 {
            return;
        }

        let (iw, ih) = background.dimensions();
        let fit = CoverFit::compute(iw, ih, width, height);
        let scale = fit.draw_width / iw as f32;
        let (sx, sw) = visible_span(-fit.offset_x, width, scale, iw);
        let (sy, sh) = visible_span(-fit.offset_y, height, scale, ih);
        tracing::debug!(
            draw_w = fit.draw_width,
            draw_h = fit.draw_height,
            region = ?(sx, sy, sw, sh),
            "Cover-fitting background"
        );

        // Only the visible part of the source is scaled, straight to canvas size
        let region = imageops::crop_imm(background.image(), sx, sy, sw, sh).to_image();
        let scaled = imageops::resize(&region, width, height, imageops::FilterType::Triangle);
        for (dst, src) in self.canvas.pixels_mut().zip(scaled.pixels()) {
            dst.0 = [src[0], src[1], src[2], 255];
        }
    }
}

/// Source pixels covering `len` canvas pixels that start `start` scaled pixels
/// into the drawn image. Returns (first, count), clamped to the source.
fn visible_span(start: f32, len: u32, scale: f32, limit: u32) -> (u32, u32) {
    let first = (start / scale).floor().clamp(0.0, (limit - 1) as f32) as u32;
    let count = ((len as f32 / scale).round().max(1.0) as u32).min(limit - first);
    (first, count)
}
