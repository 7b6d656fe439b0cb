use crate::buffer::{Mask, PixelBuffer};
use anyhow::Result;

/// Producer of confidence masks.
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, remote services, etc.)
///
/// Called off the render thread; may be arbitrarily slow.
pub trait MaskOracle: Send {
    /// Segment a frame
    ///
    /// # Returns
    /// * Grayscale-coded mask (R = G = B, 255 = foreground). Its resolution may
    ///   differ from the frame; the pipeline upscales it before refinement.
    fn segment(&mut self, frame: &PixelBuffer) -> Result<Mask>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called when the incoming frame resolution changes.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless oracles
    }

    /// Name used in log lines
    fn name(&self) -> &str {
        "oracle"
    }
}

impl<F> MaskOracle for F
where
    F: FnMut(&PixelBuffer) -> Result<Mask> + Send,
{
    fn segment(&mut self, frame: &PixelBuffer) -> Result<Mask> {
        self(frame)
    }
}
