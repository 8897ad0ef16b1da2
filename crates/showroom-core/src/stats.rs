//! On-screen performance counters

/// Frame counter with a rolling one-second FPS window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    frames: u64,
    fps: f32,
    frame_ms: f32,
    last: Option<f32>,
    window_start: f32,
    window_frames: u32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame finishing at `now` seconds
    pub fn update(&mut self, now: f32) {
        self.frames += 1;
        match self.last {
            Some(last) => self.frame_ms = ((now - last) * 1000.0).max(0.0),
            None => self.window_start = now,
        }
        self.last = Some(now);
        self.window_frames += 1;

        let window = now - self.window_start;
        if window >= 1.0 {
            self.fps = self.window_frames as f32 / window;
            self.window_start = now;
            self.window_frames = 0;
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames per second over the last completed window
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Duration of the most recent frame
    pub fn frame_ms(&self) -> f32 {
        self.frame_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_hz() {
        let mut stats = FrameStats::new();
        for i in 0..=120 {
            stats.update(i as f32 / 60.0);
        }
        assert_eq!(stats.frames(), 121);
        assert!((stats.fps() - 60.0).abs() < 1.5);
        assert!((stats.frame_ms() - 16.67).abs() < 0.1);
    }
}
