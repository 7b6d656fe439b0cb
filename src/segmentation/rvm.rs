use super::preprocess::Preprocessor;
use super::types::MaskOracle;
use crate::buffer::{Mask, PixelBuffer};
use crate::config::SegmentationQuality;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// Recurrent state tensor carried between frames: (shape, data)
type Hidden = (Vec<i64>, Vec<f32>);

/// RobustVideoMatting mask oracle
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    width: u32,
    height: u32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    hidden: Option<[Hidden; 4]>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM oracle from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512, 768x768 for `SegmentationQuality::High`
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    pub fn new<P: AsRef<Path>>(model_path: P, quality: SegmentationQuality) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let side = match quality {
            SegmentationQuality::High => 768,
            SegmentationQuality::Low | SegmentationQuality::Medium => 512,
        };

        Ok(Self {
            session,
            width: side,
            height: side,
            hidden: None,
            downsample_ratio: 0.25,
        })
    }

    /// Zero-sized recurrent state; RVM expands it on the first frame
    fn initial_hidden() -> [Hidden; 4] {
        std::array::from_fn(|_| (vec![1, 1, 1, 1], vec![0.0]))
    }
}

impl MaskOracle for RobustVideoMatting {
    fn segment(&mut self, frame: &PixelBuffer) -> Result<Mask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let hidden = self.hidden.take().unwrap_or_else(Self::initial_hidden);

        // Preprocess frame to NCHW tensor
        let input = Preprocessor::to_nchw(frame, self.width, self.height);
        let shape = input.shape().iter().map(|&d| d as i64).collect::<Vec<_>>();
        let src = Tensor::from_array((shape, input.into_raw_vec()))?;

        let [r1, r2, r3, r4] = hidden;
        let r1 = Tensor::from_array(r1)?;
        let r2 = Tensor::from_array(r2)?;
        let r3 = Tensor::from_array(r3)?;
        let r4 = Tensor::from_array(r4)?;
        let ratio = Tensor::from_array((vec![1i64], vec![self.downsample_ratio]))?;

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![src, r1, r2, r3, r4, ratio])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1o, r2o, r3o, r4o. Only pha and the states are needed.
        let (pha_shape, pha) = outputs[1].try_extract_tensor::<f32>()?;
        let matte_height = pha_shape[2] as u32;
        let matte_width = pha_shape[3] as u32;
        let mask = Preprocessor::matte_to_mask(pha, matte_width, matte_height);

        let mut next: [Hidden; 4] = Self::initial_hidden();
        for (i, slot) in next.iter_mut().enumerate() {
            let (shape, data) = outputs[i + 2].try_extract_tensor::<f32>()?;
            *slot = (shape.to_vec(), data.to_vec());
        }
        self.hidden = Some(next);

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.hidden = None;
    }

    fn name(&self) -> &str {
        "rvm"
    }
}
