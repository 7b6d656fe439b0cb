use super::blur::gaussian_blur_into;
use crate::buffer::{self, Mask, PixelBuffer};

/// Tunables for the tightening stage.
///
/// threshold = round(tightness * threshold_scale),
/// iterations = max(min_iterations, round(tightness * erosion_scale)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TightenParams {
    pub threshold_scale: f32,
    pub erosion_scale: f32,
    pub min_iterations: u32,
}

impl Default for TightenParams {
    fn default() -> Self {
        Self {
            threshold_scale: 200.0,
            erosion_scale: 6.0,
            min_iterations: 1,
        }
    }
}

impl TightenParams {
    /// Threshold-and-stretch at tightness * 128 with no erosion
    pub fn threshold_only() -> Self {
        Self {
            threshold_scale: 128.0,
            erosion_scale: 0.0,
            min_iterations: 0,
        }
    }

    pub fn threshold(&self, tightness: f32) -> u8 {
        (tightness * self.threshold_scale).round().clamp(0.0, 254.0) as u8
    }

    pub fn iterations(&self, tightness: f32) -> u32 {
        ((tightness * self.erosion_scale).round().max(0.0) as u32).max(self.min_iterations)
    }
}

/// Feather radius: max(1, round(edge_blending * 10)), used as the Gaussian sigma
/// (CSS `blur()` semantics), not a box half-width
pub fn feather_radius(edge_blending: f32) -> u32 {
    ((edge_blending * 10.0).round().max(0.0) as u32).max(1)
}

/// Turns a raw confidence mask into a smooth matte.
///
/// Owns its scratch planes; they are resized only when the mask dimensions change.
#[derive(Debug, Default)]
pub struct MaskRefiner {
    params: TightenParams,
    plane: Vec<u8>,
    work: Vec<u8>,
    scratch: Vec<u8>,
}

impl MaskRefiner {
    pub fn new(params: TightenParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn params(&self) -> TightenParams {
        self.params
    }

    /// Tighten then feather `mask`, returning a new matte of the same size.
    pub fn refine(&mut self, mask: &Mask, tightness: f32, edge_blending: f32) -> PixelBuffer {
        let mut out = PixelBuffer::new(mask.width(), mask.height());
        self.refine_into(mask, tightness, edge_blending, &mut out);
        out
    }

    /// Like [`refine`](Self::refine) but writes into a caller-owned buffer.
    pub fn refine_into(
        &mut self,
        mask: &Mask,
        tightness: f32,
        edge_blending: f32,
        out: &mut PixelBuffer,
    ) {
        let _span = tracing::debug_span!("refine_mask").entered();
        let (width, height) = mask.dimensions();
        buffer::ensure_dimensions(out, width, height);

        buffer::extract_plane(mask, &mut self.plane);
        if tightness > 0.0 {
            let threshold = self.params.threshold(tightness);
            let iterations = self.params.iterations(tightness);
            tracing::trace!(threshold, iterations, "Tightening mask");
            stretch_above_threshold(&mut self.plane, threshold);
            erode(&mut self.plane, &mut self.work, width, height, iterations);
        }

        self.work.resize(self.plane.len(), 0);
        gaussian_blur_into(
            &self.plane,
            &mut self.work,
            &mut self.scratch,
            width,
            height,
            1,
            1,
            feather_radius(edge_blending),
        );
        buffer::write_plane(&self.work, out);
    }
}

/// Zero everything below `threshold` and stretch the rest so `threshold` maps
/// near 0 and 255 stays 255.
pub fn stretch_above_threshold(plane: &mut [u8], threshold: u8) {
    let t = threshold as f32;
    let span = 255.0 - t;
    for v in plane.iter_mut() {
        *v = if *v < threshold {
            0
        } else {
            ((*v as f32 - t) / span * 255.0).round().min(255.0) as u8
        };
    }
}

/// 4-neighbour min-filter applied `iterations` times.
///
/// Border rows and columns are carried over unchanged each iteration, so no
/// value ever increases. `work` is scratch of any size.
pub fn erode(plane: &mut Vec<u8>, work: &mut Vec<u8>, width: u32, height: u32, iterations: u32) {
    let (w, h) = (width as usize, height as usize);
    if iterations == 0 || w < 3 || h < 3 {
        return;
    }
    work.resize(plane.len(), 0);

    for _ in 0..iterations {
        work.copy_from_slice(plane);
        for y in 1..h - 1 {
            let row = y * w;
            for x in 1..w - 1 {
                let i = row + x;
                work[i] = plane[i]
                    .min(plane[i - w])
                    .min(plane[i + w])
                    .min(plane[i - 1])
                    .min(plane[i + 1]);
            }
        }
        std::mem::swap(plane, work);
    }
}
