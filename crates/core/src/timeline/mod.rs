use serde::{Deserialize, Serialize};

/// Where the orchestrator sits in its `Stopped → Running ⇄ Seeking` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Running,
    Seeking,
}

impl PlaybackState {
    pub fn is_running(self) -> bool {
        self == PlaybackState::Running
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f64,
}

impl PlaybackClock {
    pub fn at(time_seconds: f64) -> Self {
        let mut clock = Self::default();
        clock.set(time_seconds);
        clock
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn set(&mut self, time_seconds: f64) {
        self.time_seconds = if time_seconds.is_finite() {
            time_seconds.max(0.0)
        } else {
            0.0
        };
    }

    pub fn advance(&mut self, delta: f64) {
        self.set(self.time_seconds + delta);
    }

    /// Advances by one frame at `fps` and returns the new time.
    pub fn step(&mut self, fps: u32) -> f64 {
        if fps > 0 {
            self.advance(1.0 / fps as f64);
        }
        self.time_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_negative() {
        let mut clock = PlaybackClock::at(1.0);
        clock.advance(-5.0);
        assert_eq!(clock.time_seconds, 0.0);
        clock.set(f64::NAN);
        assert_eq!(clock.time_seconds, 0.0);
    }

    #[test]
    fn steps_by_frame_duration() {
        let mut clock = PlaybackClock::default();
        for _ in 0..30 {
            clock.step(60);
        }
        assert!((clock.time_seconds - 0.5).abs() < 1e-9);
        assert_eq!(clock.step(0), clock.time_seconds);
    }
}
