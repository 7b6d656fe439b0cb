use super::DisplaySink;
use crate::buffer::PixelBuffer;
use anyhow::{Context, Result};
use image::imageops;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the format so consumers of the loopback device see YUYV at our size
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        let applied = Output::set_format(&device, &format).context("Failed to set output format")?;
        tracing::debug!("Loopback format: {}x{} {}", applied.width, applied.height, applied.fourcc);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Pack an RGBA frame as YUYV 4:2:2. Chroma is averaged over each pixel pair;
/// an odd trailing pixel is paired with itself.
fn rgba_to_yuyv(frame: &PixelBuffer, yuyv: &mut Vec<u8>) {
    let row_bytes = frame.width() as usize * 4;
    yuyv.clear();
    if row_bytes == 0 {
        return;
    }

    for row in frame.as_raw().chunks_exact(row_bytes) {
        for pair in row.chunks(8) {
            let (left, right) = pair.split_at(4);
            let right = if right.is_empty() { left } else { right };
            let (y0, u0, v0) = yuv(left);
            let (y1, u1, v1) = yuv(right);
            yuyv.extend_from_slice(&[y0, ((u0 + u1) / 2) as u8, y1, ((v0 + v1) / 2) as u8]);
        }
    }
}

/// Fixed-point BT.601 conversion (coefficients scaled by 256). Returns Y and
/// the offset chroma pair still widened for averaging.
fn yuv(px: &[u8]) -> (u8, i32, i32) {
    let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
    let y = (77 * r + 150 * g + 29 * b + 128) >> 8;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((157 * r - 132 * g - 25 * b + 128) >> 8) + 128;
    (y.clamp(0, 255) as u8, u.clamp(0, 255), v.clamp(0, 255))
}

impl DisplaySink for V4L2Output {
    fn present(&mut self, frame: &PixelBuffer) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = imageops::resize(frame, self.width, self.height, imageops::FilterType::Triangle);
            &resized
        } else {
            frame
        };

        rgba_to_yuyv(frame, &mut self.yuyv);

        self.file
            .write_all(&self.yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
