use std::sync::{Arc, RwLock};

/// What replaces the area behind the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackgroundMode {
    /// Pass frames through untouched
    None,
    /// Blend the subject over a blurred copy of the frame
    Blur,
    /// Blend the subject over a background image
    #[default]
    Replace,
}

/// Trade-off between mask quality and oracle latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SegmentationQuality {
    /// Half-resolution oracle input
    Low,
    #[default]
    Medium,
    /// Full resolution, heavier model variant where one exists
    High,
}

impl SegmentationQuality {
    /// Scale applied to the frame before it is handed to the oracle
    pub fn input_scale(self) -> f32 {
        match self {
            SegmentationQuality::Low => 0.5,
            SegmentationQuality::Medium | SegmentationQuality::High => 1.0,
        }
    }
}

/// Per-frame compositing settings. The pipeline reads a snapshot; it never mutates one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeConfig {
    pub background_mode: BackgroundMode,
    /// 0-100
    pub blur_strength: u8,
    /// 0.0-1.0
    pub edge_blending: f32,
    /// 0.0-1.0, higher = tighter matte around the subject
    pub mask_tightness: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            background_mode: BackgroundMode::Replace,
            blur_strength: 50,
            edge_blending: 0.1,
            mask_tightness: 0.15,
        }
    }
}

impl CompositeConfig {
    pub const MAX_BLUR_STRENGTH: u8 = 100;

    /// Build from UI-style percentages (edge blending and tightness given as 0-100).
    pub fn from_percentages(
        background_mode: BackgroundMode,
        blur_strength: u32,
        edge_blending_pct: f32,
        mask_tightness_pct: f32,
    ) -> Self {
        Self {
            background_mode,
            blur_strength: blur_strength.min(Self::MAX_BLUR_STRENGTH as u32) as u8,
            edge_blending: edge_blending_pct / 100.0,
            mask_tightness: mask_tightness_pct / 100.0,
        }
        .clamped()
    }

    /// Copy with every field pulled into its documented range. NaN becomes 0.
    pub fn clamped(self) -> Self {
        Self {
            background_mode: self.background_mode,
            blur_strength: self.blur_strength.min(Self::MAX_BLUR_STRENGTH),
            edge_blending: unit(self.edge_blending),
            mask_tightness: unit(self.mask_tightness),
        }
    }

    /// Whether this frame needs a matte at all
    pub fn wants_matte(&self, has_background: bool) -> bool {
        match self.background_mode {
            BackgroundMode::None => false,
            BackgroundMode::Blur => true,
            BackgroundMode::Replace => has_background,
        }
    }

    /// Blur radius for the blurred-background path: max(1, round(strength / 5)).
    /// Like CSS `blur()`, this is the Gaussian sigma.
    pub fn background_blur_radius(&self) -> u32 {
        ((self.blur_strength.min(Self::MAX_BLUR_STRENGTH) as f32 / 5.0).round() as u32).max(1)
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Caller-owned settings the render loop snapshots once per tick
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<CompositeConfig>>);

impl SharedConfig {
    pub fn new(config: CompositeConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Clamped copy of the current settings
    pub fn snapshot(&self) -> CompositeConfig {
        match self.0.read() {
            Ok(guard) => guard.clamped(),
            Err(poisoned) => poisoned.into_inner().clamped(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut CompositeConfig)) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_pulls_values_into_range() {
        let cfg = CompositeConfig {
            background_mode: BackgroundMode::Blur,
            blur_strength: 250,
            edge_blending: 1.7,
            mask_tightness: f32::NAN,
        }
        .clamped();
        assert_eq!(cfg.blur_strength, 100);
        assert_eq!(cfg.edge_blending, 1.0);
        assert_eq!(cfg.mask_tightness, 0.0);

        let cfg = CompositeConfig {
            edge_blending: -0.3,
            ..CompositeConfig::default()
        }
        .clamped();
        assert_eq!(cfg.edge_blending, 0.0);
    }

    #[test]
    fn percentages_are_converted() {
        let cfg = CompositeConfig::from_percentages(BackgroundMode::Replace, 30, 10.0, 15.0);
        assert_eq!(cfg.blur_strength, 30);
        assert!((cfg.edge_blending - 0.10).abs() < 1e-6);
        assert!((cfg.mask_tightness - 0.15).abs() < 1e-6);
    }

    #[test]
    fn blur_radius_follows_strength() {
        let mut cfg = CompositeConfig::default();
        cfg.blur_strength = 0;
        assert_eq!(cfg.background_blur_radius(), 1);
        cfg.blur_strength = 50;
        assert_eq!(cfg.background_blur_radius(), 10);
        cfg.blur_strength = 100;
        assert_eq!(cfg.background_blur_radius(), 20);
    }

    #[test]
    fn matte_only_needed_when_it_can_be_used() {
        let mut cfg = CompositeConfig::default();
        cfg.background_mode = BackgroundMode::None;
        assert!(!cfg.wants_matte(true));
        cfg.background_mode = BackgroundMode::Replace;
        assert!(!cfg.wants_matte(false));
        assert!(cfg.wants_matte(true));
        cfg.background_mode = BackgroundMode::Blur;
        assert!(cfg.wants_matte(false));
    }

    #[test]
    fn shared_config_snapshots_are_clamped() {
        let shared = SharedConfig::new(CompositeConfig::default());
        shared.update(|c| c.mask_tightness = 4.0);
        assert_eq!(shared.snapshot().mask_tightness, 1.0);
    }

    #[test]
    fn low_quality_halves_oracle_input() {
        assert_eq!(SegmentationQuality::Low.input_scale(), 0.5);
        assert_eq!(SegmentationQuality::High.input_scale(), 1.0);
    }
}
