//! Separable blur used for both background blur and matte feathering.
//!
//! A Gaussian of standard deviation `radius` (the same meaning as CSS
//! `blur(<radius>px)`) is approximated by three successive box blurs. Each box
//! pass is a sliding-window average, so cost is independent of the radius.
//! Edges are clamped: samples past the border repeat the border pixel.

/// Number of box passes used to approximate the Gaussian
pub const BOX_PASSES: usize = 3;

/// Box radii whose successive application approximates a Gaussian with `sigma`.
pub fn box_radii_for_gaussian(sigma: f32, passes: usize) -> Vec<usize> {
    if passes == 0 || !(sigma > 0.0) {
        return Vec::new();
    }
    let n = passes as f32;
    let var12 = 12.0 * sigma * sigma;
    let ideal_width = (var12 / n + 1.0).sqrt();
    let mut lower = ideal_width.floor() as i64;
    if lower % 2 == 0 {
        lower -= 1;
    }
    let lower = lower.max(1);
    let upper = lower + 2;
    let lf = lower as f32;
    let ideal_m = (var12 - n * lf * lf - 4.0 * n * lf - 3.0 * n) / (-4.0 * lf - 4.0);
    let m = (ideal_m.round().max(0.0) as usize).min(passes);

    (0..passes)
        .map(|i| if i < m { lower } else { upper })
        .map(|width| ((width - 1) / 2) as usize)
        .collect()
}

/// Blur `src` into `dst`.
///
/// `channels` is the interleave stride (4 for RGBA, 1 for a matte plane) and
/// only the first `active` channels of each pixel are blurred; the remaining
/// channels of `dst` are copied from `src`. `scratch` is grown to fit and can
/// be reused across calls.
#[allow(clippy::too_many_arguments)]
pub fn gaussian_blur_into(
    src: &[u8],
    dst: &mut [u8],
    scratch: &mut Vec<u8>,
    width: u32,
    height: u32,
    channels: usize,
    active: usize,
    radius: u32,
) {
    let (w, h) = (width as usize, height as usize);
    let len = w * h * channels;
    debug_assert_eq!(src.len(), len);
    debug_assert_eq!(dst.len(), len);
    debug_assert!(active <= channels);

    dst.copy_from_slice(src);
    if len == 0 || radius == 0 {
        return;
    }
    if scratch.len() != len {
        scratch.resize(len, 0);
    }

    for r in box_radii_for_gaussian(radius as f32, BOX_PASSES) {
        if r == 0 {
            continue;
        }
        // horizontal: dst -> scratch
        for y in 0..h {
            for c in 0..active {
                box_line(dst, scratch, y * w * channels + c, channels, w, r);
            }
        }
        // vertical: scratch -> dst
        for x in 0..w {
            for c in 0..active {
                box_line(scratch, dst, x * channels + c, w * channels, h, r);
            }
        }
    }
}

/// Sliding-window box average over `len` samples at `start + i * step`.
fn box_line(src: &[u8], dst: &mut [u8], start: usize, step: usize, len: usize, radius: usize) {
    let at = |i: usize| src[start + i.min(len - 1) * step] as u32;
    let window = (2 * radius + 1) as u32;
    let half = window / 2;

    let mut sum = at(0) * (radius as u32 + 1);
    for i in 1..=radius {
        sum += at(i);
    }

    for i in 0..len {
        dst[start + i * step] = ((sum + half) / window) as u8;
        let leaving = at(i.saturating_sub(radius));
        let entering = at(i + radius + 1);
        sum = sum + entering - leaving;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_zero_is_identity() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = vec![0u8; 8];
        let mut scratch = Vec::new();
        gaussian_blur_into(&src, &mut dst, &mut scratch, 1, 2, 4, 3, 0);
        assert_eq!(dst, src);
    }

    #[test]
    fn constant_image_is_unchanged() {
        let (w, h) = (6u32, 5u32);
        let src = [10u8, 20, 30, 255].repeat((w * h) as usize);
        let mut dst = vec![0u8; src.len()];
        let mut scratch = Vec::new();
        gaussian_blur_into(&src, &mut dst, &mut scratch, w, h, 4, 3, 4);
        assert_eq!(dst, src);
    }

    #[test]
    fn inactive_channels_are_copied() {
        let (w, h) = (3u32, 3u32);
        let mut src = vec![0u8; (w * h * 4) as usize];
        for (i, px) in src.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[(i * 20) as u8, 0, 0, i as u8]);
        }
        let mut dst = vec![0u8; src.len()];
        let mut scratch = Vec::new();
        gaussian_blur_into(&src, &mut dst, &mut scratch, w, h, 4, 3, 2);
        for (i, px) in dst.chunks_exact(4).enumerate() {
            assert_eq!(px[3], i as u8);
        }
    }

    #[test]
    fn single_bright_pixel_spreads_and_keeps_energy() {
        let (w, h) = (15u32, 15u32);
        let mut src = vec![0u8; (w * h) as usize];
        src[(7 * w + 7) as usize] = 255;
        let mut dst = vec![0u8; src.len()];
        let mut scratch = Vec::new();
        gaussian_blur_into(&src, &mut dst, &mut scratch, w, h, 1, 1, 1);

        assert!(dst[(7 * w + 7) as usize] < 255);
        assert!(dst[(7 * w + 8) as usize] > 0);
        assert!(dst[(7 * w + 8) as usize] <= dst[(7 * w + 7) as usize]);
        let total: u32 = dst.iter().map(|&v| v as u32).sum();
        assert!((total as i32 - 255).abs() <= 40, "total = {total}");
    }

    #[test]
    fn box_radii_grow_with_sigma() {
        assert_eq!(box_radii_for_gaussian(1.0, 3), vec![0, 0, 1]);
        let small: usize = box_radii_for_gaussian(2.0, 3).iter().sum();
        let large: usize = box_radii_for_gaussian(10.0, 3).iter().sum();
        assert!(large > small);
        assert!(box_radii_for_gaussian(0.0, 3).is_empty());
    }

    #[test]
    fn radius_is_the_gaussian_sigma() {
        // three stacked boxes should add up to the variance of the requested Gaussian
        for sigma in [2.0f32, 5.0, 10.0] {
            let variance: f32 = box_radii_for_gaussian(sigma, BOX_PASSES)
                .iter()
                .map(|&r| {
                    let width = (2 * r + 1) as f32;
                    (width * width - 1.0) / 12.0
                })
                .sum();
            let target = sigma * sigma;
            assert!((variance - target).abs() <= 0.25 * target, "sigma {sigma}: variance {variance}");
        }
    }

    #[test]
    fn step_edge_becomes_a_ramp() {
        let w = 20u32;
        let src: Vec<u8> = (0..w).map(|x| if x < 10 { 0 } else { 255 }).collect();
        let mut dst = vec![0u8; src.len()];
        let mut scratch = Vec::new();
        gaussian_blur_into(&src, &mut dst, &mut scratch, w, 1, 1, 1, 2);
        assert_eq!(dst[0], 0);
        assert_eq!(dst[19], 255);
        assert!(dst[9] > 0 && dst[10] < 255);
        assert!(dst.windows(2).all(|p| p[0] <= p[1]));
    }
}
