//! Eye-contact decision and contact-interval accounting.

use tracing::debug;

use crate::config::TrackerConfig;
use crate::types::{AngleTriple, ContactReading, GazeVector};

/// Thresholds applied to calibrated head pose and gaze.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactThresholds {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub gaze: f64,
}

impl From<&TrackerConfig> for ContactThresholds {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            yaw_deg: config.yaw_threshold_deg,
            pitch_deg: config.pitch_threshold_deg,
            gaze: config.gaze_threshold,
        }
    }
}

/// Stateless per-frame contact decision.
#[derive(Debug, Clone)]
pub struct EyeContactClassifier {
    thresholds: ContactThresholds,
}

impl EyeContactClassifier {
    pub fn new(thresholds: ContactThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ContactThresholds {
        &self.thresholds
    }

    /// Classify one frame.
    ///
    /// `relative` is the smoothed pose minus the calibration baseline, `None`
    /// while uncalibrated. Gaze that is missing or flagged unreliable is left
    /// out and the decision falls back to head pose alone.
    pub fn classify(
        &self,
        relative: Option<&AngleTriple>,
        gaze: Option<&GazeVector>,
    ) -> ContactReading {
        let Some(pose) = relative else {
            return ContactReading::Uncalibrated;
        };
        let limits = &self.thresholds;
        let head_ok = pose.yaw.abs() < limits.yaw_deg && pose.pitch.abs() < limits.pitch_deg;
        let gaze_ok = match gaze {
            Some(g) if g.reliable => g.x.abs() < limits.gaze && g.y.abs() < limits.gaze,
            _ => true,
        };
        if head_ok && gaze_ok {
            ContactReading::Contact
        } else {
            ContactReading::NoContact
        }
    }
}

/// Edge reported by [`EyeContactState::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactTransition {
    Started,
    Ended { duration_secs: f64 },
}

/// Two-state contact machine. Time is only accounted on edges: an interval
/// opens on the rising edge and its length is added on the falling edge.
#[derive(Debug, Clone, Default)]
pub struct EyeContactState {
    is_contact: bool,
    contact_start: Option<f64>,
    cumulative_secs: f64,
    intervals: u64,
}

impl EyeContactState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, contact: bool, now: f64) -> Option<ContactTransition> {
        match (self.is_contact, contact) {
            (false, true) => {
                self.is_contact = true;
                self.contact_start = Some(now);
                debug!(at = now, "eye contact started");
                Some(ContactTransition::Started)
            }
            (true, false) => {
                let duration_secs = self.close_interval(now);
                self.is_contact = false;
                debug!(at = now, duration_secs, "eye contact ended");
                Some(ContactTransition::Ended { duration_secs })
            }
            _ => None,
        }
    }

    fn close_interval(&mut self, now: f64) -> f64 {
        let duration = self
            .contact_start
            .take()
            .map(|start| (now - start).max(0.0))
            .unwrap_or(0.0);
        self.cumulative_secs += duration;
        self.intervals += 1;
        duration
    }

    /// Close any open interval, as at session stop.
    pub fn finish(&mut self, now: f64) {
        if self.is_contact {
            self.close_interval(now);
            self.is_contact = false;
        }
    }

    pub fn is_contact(&self) -> bool {
        self.is_contact
    }

    pub fn contact_start(&self) -> Option<f64> {
        self.contact_start
    }

    /// Length of the interval in progress.
    pub fn held_for(&self, now: f64) -> f64 {
        self.contact_start.map(|s| (now - s).max(0.0)).unwrap_or(0.0)
    }

    /// Contact has been held continuously for at least `persistence_secs`.
    pub fn is_confirmed(&self, now: f64, persistence_secs: f64) -> bool {
        self.is_contact && self.held_for(now) >= persistence_secs
    }

    /// Closed intervals only.
    pub fn cumulative_secs(&self) -> f64 {
        self.cumulative_secs
    }

    /// Closed intervals plus the one in progress.
    pub fn total_secs(&self, now: f64) -> f64 {
        self.cumulative_secs + self.held_for(now)
    }

    /// Number of closed intervals.
    pub fn intervals(&self) -> u64 {
        self.intervals
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> EyeContactClassifier {
        EyeContactClassifier::new(ContactThresholds { yaw_deg: 30.0, pitch_deg: 30.0, gaze: 0.5 })
    }

    fn gaze(x: f64, y: f64, reliable: bool) -> GazeVector {
        GazeVector { x, y, reliable }
    }

    #[test]
    fn test_uncalibrated() {
        assert_eq!(classifier().classify(None, None), ContactReading::Uncalibrated);
    }

    #[test]
    fn test_requires_pose_and_gaze() {
        let c = classifier();
        let straight = AngleTriple::new(5.0, -10.0, 0.0);
        let turned = AngleTriple::new(0.0, 35.0, 0.0);
        let cases = [
            (straight, gaze(0.1, 0.0, true), ContactReading::Contact),
            (straight, gaze(0.7, 0.0, true), ContactReading::NoContact),
            (straight, gaze(0.0, -0.6, true), ContactReading::NoContact),
            (turned, gaze(0.0, 0.0, true), ContactReading::NoContact),
        ];
        for (pose, g, expected) in cases {
            assert_eq!(c.classify(Some(&pose), Some(&g)), expected, "pose {pose:?} gaze {g:?}");
        }
    }

    #[test]
    fn test_unreliable_gaze_falls_back_to_pose() {
        let c = classifier();
        let straight = AngleTriple::ZERO;
        let wild = gaze(1.0, 1.0, false);
        assert_eq!(c.classify(Some(&straight), Some(&wild)), ContactReading::Contact);
        assert_eq!(c.classify(Some(&straight), None), ContactReading::Contact);
        let turned = AngleTriple::new(40.0, 0.0, 0.0);
        assert_eq!(c.classify(Some(&turned), None), ContactReading::NoContact);
    }

    #[test]
    fn test_threshold_is_strict() {
        let c = classifier();
        let edge = AngleTriple::new(0.0, 30.0, 0.0);
        assert_eq!(c.classify(Some(&edge), None), ContactReading::NoContact);
    }

    #[test]
    fn test_held_contact_accumulates_exactly() {
        let mut state = EyeContactState::new();
        let mut t = 0.0;
        assert_eq!(state.update(true, t), Some(ContactTransition::Started));
        for _ in 0..20 {
            t += 0.1;
            assert_eq!(state.update(true, t), None);
        }
        let ended = state.update(false, t).unwrap();
        match ended {
            ContactTransition::Ended { duration_secs } => {
                assert!((duration_secs - 2.0).abs() < 1e-9)
            }
            other => panic!("unexpected transition {other:?}"),
        }
        assert!((state.cumulative_secs() - 2.0).abs() < 1e-9);
        assert_eq!(state.intervals(), 1);
    }

    #[test]
    fn test_alternating_readings_one_interval_per_crossing() {
        let mut state = EyeContactState::new();
        let pattern = [true, true, false, false, true, false, true, true, true, false];
        let mut starts = 0;
        let mut ends = 0;
        let mut expected = 0.0;
        let mut open: Option<f64> = None;
        for (i, &contact) in pattern.iter().enumerate() {
            let now = i as f64 * 0.5;
            match state.update(contact, now) {
                Some(ContactTransition::Started) => {
                    starts += 1;
                    open = Some(now);
                }
                Some(ContactTransition::Ended { .. }) => {
                    ends += 1;
                    expected += now - open.take().unwrap();
                }
                None => {}
            }
        }
        assert_eq!(starts, 3);
        assert_eq!(ends, 3);
        assert!((state.cumulative_secs() - expected).abs() < 1e-9);
        assert!((expected - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_only_grows_on_falling_edge() {
        let mut state = EyeContactState::new();
        state.update(true, 1.0);
        state.update(true, 5.0);
        assert_eq!(state.cumulative_secs(), 0.0);
        assert!((state.total_secs(5.0) - 4.0).abs() < 1e-9);
        state.finish(6.0);
        assert!((state.cumulative_secs() - 5.0).abs() < 1e-9);
        assert!(!state.is_contact());
    }

    #[test]
    fn test_persistence() {
        let mut state = EyeContactState::new();
        state.update(true, 10.0);
        assert!(!state.is_confirmed(11.9, 2.0));
        assert!(state.is_confirmed(12.0, 2.0));
        state.update(false, 12.5);
        assert!(!state.is_confirmed(13.0, 2.0));
    }
}
