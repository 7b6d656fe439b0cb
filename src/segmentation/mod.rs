mod channel;
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;

pub use channel::{ChannelState, Delivery, MaskChannel, MaskSlot};
pub use preprocess::{Interpolation, Preprocessor};
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::MaskOracle;

/// Create the default mask oracle (RVM)
#[cfg(feature = "onnx")]
pub fn create_default_oracle(
    model_path: &str,
    quality: crate::config::SegmentationQuality,
) -> anyhow::Result<Box<dyn MaskOracle>> {
    let oracle = RobustVideoMatting::new(model_path, quality)?;
    Ok(Box::new(oracle))
}
