//! Blink counting from the per-frame blink ratio.

/// Counts a blink when the eyes reopen after being closed for at least
/// `min_frames` consecutive frames. Counting on release keeps one long
/// closed interval from being counted more than once.
#[derive(Debug, Clone)]
pub struct BlinkCounter {
    threshold: f64,
    min_frames: u32,
    closed_frames: u32,
    total: u64,
}

impl BlinkCounter {
    pub fn new(threshold: f64, min_frames: u32) -> Self {
        Self {
            threshold,
            min_frames: min_frames.max(1),
            closed_frames: 0,
            total: 0,
        }
    }

    /// Feed one frame's ratio. Returns true when this frame completed a blink.
    pub fn update(&mut self, ratio: f64) -> bool {
        if ratio <= self.threshold {
            self.closed_frames = self.closed_frames.saturating_add(1);
            return false;
        }
        let blinked = self.closed_frames >= self.min_frames;
        if blinked {
            self.total += 1;
        }
        self.closed_frames = 0;
        blinked
    }

    pub fn count(&self) -> u64 {
        self.total
    }

    /// Whether the eyes are currently in a closed run.
    pub fn is_closed(&self) -> bool {
        self.closed_frames > 0
    }

    pub fn reset(&mut self) {
        self.closed_frames = 0;
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(counter: &mut BlinkCounter, ratios: &[f64]) -> usize {
        ratios.iter().filter(|&&r| counter.update(r)).count()
    }

    #[test]
    fn test_three_frame_dip_is_one_blink() {
        let mut counter = BlinkCounter::new(0.51, 2);
        let events = feed(&mut counter, &[0.53, 0.50, 0.50, 0.50, 0.53, 0.53]);
        assert_eq!(events, 1);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_single_frame_dip_ignored() {
        let mut counter = BlinkCounter::new(0.51, 2);
        feed(&mut counter, &[0.53, 0.50, 0.53]);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_counted_on_release_only() {
        let mut counter = BlinkCounter::new(0.51, 2);
        feed(&mut counter, &[0.50; 10]);
        assert_eq!(counter.count(), 0);
        assert!(counter.is_closed());
        assert!(counter.update(0.55));
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut counter = BlinkCounter::new(0.51, 2);
        feed(&mut counter, &[0.51, 0.51, 0.52]);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_reset() {
        let mut counter = BlinkCounter::new(0.51, 2);
        feed(&mut counter, &[0.5, 0.5, 0.6, 0.5]);
        counter.reset();
        assert_eq!(counter.count(), 0);
        assert!(!counter.is_closed());
    }
}
