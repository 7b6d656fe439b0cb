use std::time::{Duration, Instant};

/// Display refresh signal driving the render loop
pub trait RefreshClock {
    /// Block until the next refresh is due.
    fn wait_for_refresh(&mut self);

    /// Drop whatever registration the clock holds with the display.
    fn release(&mut self) {}
}

/// Paces refreshes at a fixed rate by sleeping off the rest of each frame interval
#[derive(Debug)]
pub struct FixedRateClock {
    frame_duration: Duration,
    last: Option<Instant>,
}

impl FixedRateClock {
    pub fn new(fps: u32) -> Self {
        Self {
            frame_duration: Duration::from_secs_f32(1.0 / fps.max(1) as f32),
            last: None,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}

impl RefreshClock for FixedRateClock {
    fn wait_for_refresh(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.frame_duration {
                std::thread::sleep(self.frame_duration - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }

    fn release(&mut self) {
        self.last = None;
    }
}
