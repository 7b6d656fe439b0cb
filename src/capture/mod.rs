#[cfg(feature = "webcam")]
mod v4l_capture;

#[cfg(feature = "webcam")]
pub use v4l_capture::WebcamCapture;

use crate::buffer::PixelBuffer;
use anyhow::Result;

/// Trait for camera capture sources
pub trait FrameSource {
    /// Whether frames are currently available. The render loop pauses while this is false.
    fn is_active(&self) -> bool;

    /// Capture a single RGBA frame. Must not wait longer than one frame interval.
    fn next_frame(&mut self) -> Result<PixelBuffer>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
