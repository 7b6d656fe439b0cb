mod background;
pub mod blur;
mod compositor;
mod refine;

pub use background::{BackgroundImage, CoverFit};
pub use compositor::{blend, CompositeOutcome, FrameCompositor};
pub use refine::{erode, feather_radius, stretch_above_threshold, MaskRefiner, TightenParams};
