//! Display-driven render loop.
//!
//! One cooperative iteration per refresh: pull a frame, opportunistically pick
//! up the latest mask, refine and composite, present. The loop never waits on
//! the mask oracle; it reuses the last mask until a fresher one lands.

mod clock;
mod fps;

pub use clock::{FixedRateClock, RefreshClock};
pub use fps::FpsCounter;

use crate::buffer::{Mask, PixelBuffer};
use crate::capture::FrameSource;
use crate::compositing::{BackgroundImage, CompositeOutcome, FrameCompositor, MaskRefiner, TightenParams};
use crate::config::{CompositeConfig, SharedConfig};
use crate::output::DisplaySink;
use crate::segmentation::{Interpolation, MaskChannel, Preprocessor};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Present the refined matte instead of the composite
    pub show_matte: bool,
    /// Filter used to bring masks up to frame size
    pub interpolation: Interpolation,
    pub tighten: TightenParams,
}

/// Counters accumulated over the life of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub presented: u64,
    /// Frames blended under a matte
    pub composited: u64,
    /// Frames that reused a mask already used for an earlier frame
    pub stale_masks: u64,
    pub paused_ticks: u64,
    pub failed_ticks: u64,
}

/// Result of a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Source inactive; nothing presented
    Paused,
    Presented(CompositeOutcome),
    /// The refined matte was presented (`show_matte`)
    MattePreview,
}

/// Identifies the inputs a refined matte was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MatteKey {
    generation: u64,
    dims: (u32, u32),
    tightness: u32,
    edge_blending: u32,
}

pub struct RenderLoop<S, D> {
    source: S,
    sink: D,
    config: SharedConfig,
    options: RenderOptions,
    channel: Option<MaskChannel>,
    background: Option<BackgroundImage>,
    refiner: MaskRefiner,
    compositor: FrameCompositor,
    matte: PixelBuffer,
    matte_key: Option<MatteKey>,
    output: PixelBuffer,
    last_generation: Option<u64>,
    fps: FpsCounter,
    stats: LoopStats,
    paused: bool,
}

impl<S: FrameSource, D: DisplaySink> RenderLoop<S, D> {
    pub fn new(source: S, sink: D, config: SharedConfig, options: RenderOptions) -> Self {
        Self {
            source,
            sink,
            config,
            options,
            channel: None,
            background: None,
            refiner: MaskRefiner::new(options.tighten),
            compositor: FrameCompositor::new(),
            matte: PixelBuffer::default(),
            matte_key: None,
            output: PixelBuffer::default(),
            last_generation: None,
            fps: FpsCounter::new(),
            stats: LoopStats::default(),
            paused: false,
        }
    }

    /// Enable segmentation through `channel`
    pub fn with_mask_channel(mut self, channel: MaskChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn set_background(&mut self, background: Option<BackgroundImage>) {
        match &background {
            Some(bg) => tracing::info!(dims = ?bg.dimensions(), "Background image set"),
            None => tracing::info!("Background image cleared"),
        }
        self.background = background;
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn fps(&self) -> f32 {
        self.fps.fps()
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Run one iteration.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.source.is_active() {
            if !self.paused {
                tracing::info!("Frame source inactive, pausing");
                self.paused = true;
            }
            self.stats.paused_ticks += 1;
            return Ok(TickOutcome::Paused);
        }
        if self.paused {
            tracing::info!("Frame source active again, resuming");
            self.paused = false;
            self.fps.reset();
        }

        let frame = self.source.next_frame().context("Failed to capture frame")?;
        let config = self.config.snapshot();

        let outcome = match self.fetch_mask(&frame, &config) {
            Some((mask, generation)) => {
                if self.last_generation == Some(generation) {
                    self.stats.stale_masks += 1;
                }
                self.last_generation = Some(generation);
                self.refresh_matte(&mask, generation, frame.dimensions(), &config);

                if self.options.show_matte {
                    self.sink.present(&self.matte).context("Failed to present matte")?;
                    TickOutcome::MattePreview
                } else {
                    let outcome = self.compositor.compose_into(
                        &frame,
                        Some(&self.matte),
                        &config,
                        self.background.as_ref(),
                        &mut self.output,
                    );
                    self.sink.present(&self.output).context("Failed to present frame")?;
                    TickOutcome::Presented(outcome)
                }
            }
            None => {
                self.sink.present(&frame).context("Failed to present frame")?;
                TickOutcome::Presented(CompositeOutcome::Passthrough)
            }
        };

        self.stats.presented += 1;
        if matches!(
            outcome,
            TickOutcome::Presented(CompositeOutcome::Blurred | CompositeOutcome::Replaced)
        ) {
            self.stats.composited += 1;
        }
        if let Some(fps) = self.fps.record_frame(Instant::now()) {
            tracing::info!(
                "Render: fps={:.1}, presented={}, composited={}, stale_masks={}",
                fps,
                self.stats.presented,
                self.stats.composited,
                self.stats.stale_masks
            );
        }

        Ok(outcome)
    }

    /// Tick on every refresh until `stop` is raised, then tear down.
    pub fn run<C: RefreshClock>(&mut self, clock: &mut C, stop: &AtomicBool) -> LoopStats {
        tracing::info!(
            segmentation = self.channel.is_some(),
            show_matte = self.options.show_matte,
            "Starting render loop"
        );

        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.tick() {
                self.stats.failed_ticks += 1;
                tracing::warn!("Render tick failed: {:#}", e);
            }
            clock.wait_for_refresh();
        }

        clock.release();
        self.shutdown();
        tracing::info!(stats = ?self.stats, "Render loop stopped");
        self.stats
    }

    /// Close the mask channel; results still in flight are discarded.
    pub fn shutdown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.matte_key = None;
        self.last_generation = None;
    }

    /// Request a fresh mask (coalesced) and take whatever is newest. Never waits.
    fn fetch_mask(&self, frame: &PixelBuffer, config: &CompositeConfig) -> Option<(Arc<Mask>, u64)> {
        if !config.wants_matte(self.background.is_some()) {
            return None;
        }
        let channel = self.channel.as_ref()?;
        if channel.request_mask(frame) {
            tracing::trace!("Requested fresh mask");
        }
        channel.latest()
    }

    /// Rebuild the refined matte unless it already matches these inputs.
    fn refresh_matte(&mut self, mask: &Mask, generation: u64, dims: (u32, u32), config: &CompositeConfig) {
        let key = MatteKey {
            generation,
            dims,
            tightness: config.mask_tightness.to_bits(),
            edge_blending: config.edge_blending.to_bits(),
        };
        if self.matte_key == Some(key) {
            return;
        }

        if mask.dimensions() == dims {
            self.refiner
                .refine_into(mask, config.mask_tightness, config.edge_blending, &mut self.matte);
        } else {
            let upscaled = Preprocessor::upscale_mask(mask, dims.0, dims.1, self.options.interpolation);
            self.refiner
                .refine_into(&upscaled, config.mask_tightness, config.edge_blending, &mut self.matte);
        }
        self.matte_key = Some(key);
    }
}
