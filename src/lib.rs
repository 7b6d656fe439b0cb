//! Real-time background replacement for a webcam feed.
//!
//! Frames flow from a [`capture::FrameSource`] through the [`render::RenderLoop`],
//! which pairs each frame with the newest person mask from a
//! [`segmentation::MaskChannel`], refines it, composites it over a blurred or
//! replaced background, and hands the result to an [`output::DisplaySink`].

pub mod buffer;
pub mod capture;
pub mod compositing;
pub mod config;
pub mod error;
pub mod output;
pub mod render;
pub mod segmentation;

pub use buffer::{Mask, PixelBuffer};
pub use compositing::{BackgroundImage, CompositeOutcome, FrameCompositor, MaskRefiner, TightenParams};
pub use config::{BackgroundMode, CompositeConfig, SegmentationQuality, SharedConfig};
pub use error::{BackdropError, Result};
pub use render::{LoopStats, RenderLoop, RenderOptions, TickOutcome};
pub use segmentation::{MaskChannel, MaskOracle};
