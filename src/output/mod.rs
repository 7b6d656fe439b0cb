#[cfg(feature = "loopback")]
mod loopback;

#[cfg(feature = "loopback")]
pub use loopback::V4L2Output;

use crate::buffer::PixelBuffer;
use anyhow::Result;

/// Trait for output destinations
pub trait DisplaySink {
    /// Show one finished frame
    fn present(&mut self, frame: &PixelBuffer) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}
