use super::FrameSource;
use crate::buffer::{self, PixelBuffer};
use anyhow::{Context, Result};
use nokhwa::pixel_format::{RgbAFormat, RgbFormat};
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::YUYV, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        // The driver may settle on a different resolution than requested
        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl FrameSource for WebcamCapture {
    fn is_active(&self) -> bool {
        self.camera.is_stream_open()
    }

    fn next_frame(&mut self) -> Result<PixelBuffer> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let resolution = frame.resolution();
        let dims = (resolution.width(), resolution.height());
        if dims != (self.width, self.height) {
            tracing::info!(?dims, "Camera resolution changed");
            (self.width, self.height) = dims;
        }

        let mut rgba = vec![0u8; dims.0 as usize * dims.1 as usize * 4];
        frame
            .decode_image_to_buffer::<RgbAFormat>(&mut rgba)
            .context("Failed to decode frame")?;

        Ok(buffer::from_rgba(dims.0, dims.1, rgba)?)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
