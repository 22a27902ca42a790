//! Moving-average smoothing of head angles and the calibration baseline.

use std::collections::VecDeque;

use crate::types::AngleTriple;

/// Fixed-capacity FIFO of recent angle triples.
#[derive(Debug, Clone)]
pub struct AngleBuffer {
    samples: VecDeque<AngleTriple>,
    capacity: usize,
}

impl AngleBuffer {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full. Non-finite samples are ignored.
    pub fn push(&mut self, angles: AngleTriple) {
        if !angles.is_finite() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(angles);
    }

    /// Component-wise mean of the buffered samples, zero when empty.
    pub fn average(&self) -> AngleTriple {
        if self.samples.is_empty() {
            return AngleTriple::ZERO;
        }
        let n = self.samples.len() as f64;
        let sum = self.samples.iter().fold(AngleTriple::ZERO, |acc, a| AngleTriple {
            pitch: acc.pitch + a.pitch,
            yaw: acc.yaw + a.yaw,
            roll: acc.roll + a.roll,
        });
        AngleTriple::new(sum.pitch / n, sum.yaw / n, sum.roll / n)
    }

    /// Mean of the buffered samples, `None` when nothing has been pushed yet.
    pub fn smoothed(&self) -> Option<AngleTriple> {
        (!self.samples.is_empty()).then(|| self.average())
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Neutral head orientation captured after warm-up.
///
/// All contact decisions use angles relative to this baseline, so a camera
/// mounted above or beside the screen does not bias the result.
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    baseline: Option<AngleTriple>,
    warmup_frames: u64,
}

impl Calibration {
    pub fn new(warmup_frames: u64) -> Self {
        Self { baseline: None, warmup_frames }
    }

    /// Capture the baseline from `smoothed` once more than `warmup_frames`
    /// frames with a face have been seen. Returns true when newly captured.
    pub fn observe(&mut self, frames_seen: u64, smoothed: Option<AngleTriple>) -> bool {
        if self.baseline.is_some() || frames_seen <= self.warmup_frames {
            return false;
        }
        match smoothed {
            Some(angles) if angles.is_finite() => {
                self.baseline = Some(angles);
                true
            }
            _ => false,
        }
    }

    pub fn baseline(&self) -> Option<AngleTriple> {
        self.baseline
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Angles relative to the baseline, `None` when uncalibrated.
    pub fn relative(&self, smoothed: &AngleTriple) -> Option<AngleTriple> {
        self.baseline.map(|base| smoothed.relative_to(&base))
    }

    pub fn clear(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaw(v: f64) -> AngleTriple {
        AngleTriple::new(0.0, v, 0.0)
    }

    #[test]
    fn test_average_of_partial_buffer() {
        let mut buf = AngleBuffer::new(5);
        buf.push(yaw(10.0));
        buf.push(yaw(20.0));
        let avg = buf.average();
        assert!((avg.yaw - 15.0).abs() < 1e-12);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buf = AngleBuffer::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            buf.push(yaw(v));
        }
        assert_eq!(buf.len(), 3);
        let avg = buf.average();
        assert!((avg.yaw - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_average_is_zero() {
        let mut buf = AngleBuffer::new(4);
        assert_eq!(buf.average(), AngleTriple::ZERO);
        assert!(buf.smoothed().is_none());
        buf.push(yaw(1.0));
        assert!(buf.smoothed().is_some());
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.average(), AngleTriple::ZERO);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        for capacity in 1..8 {
            let mut buf = AngleBuffer::new(capacity);
            for i in 0..20 {
                buf.push(yaw(i as f64));
                assert!(buf.len() <= capacity, "len {} > {capacity}", buf.len());
            }
        }
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut buf = AngleBuffer::new(4);
        buf.push(yaw(f64::NAN));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capacity_floor() {
        let buf = AngleBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
    }

    #[test]
    fn test_calibration_waits_for_warmup() {
        let mut cal = Calibration::new(3);
        assert!(!cal.observe(3, Some(yaw(5.0))));
        assert!(!cal.is_calibrated());
        assert!(cal.observe(4, Some(yaw(5.0))));
        assert!(!cal.observe(5, Some(yaw(9.0))));
        assert_eq!(cal.baseline(), Some(yaw(5.0)));
        let rel = cal.relative(&yaw(7.0)).unwrap();
        assert!((rel.yaw - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_needs_angles() {
        let mut cal = Calibration::new(0);
        assert!(!cal.observe(1, None));
        assert!(cal.relative(&yaw(1.0)).is_none());
        assert!(cal.observe(2, Some(yaw(1.0))));
        cal.clear();
        assert!(!cal.is_calibrated());
    }
}
