use std::time::{Duration, Instant};

/// Frames-per-second over rolling one-second windows
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    pub const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count a presented frame. Returns the new rate when a window closes.
    pub fn record_frame(&mut self, now: Instant) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < Self::WINDOW {
            return None;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    /// Rate from the last closed window
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
