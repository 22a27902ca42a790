//! Session-level frame counters and the end-of-session summary.

use serde::{Deserialize, Serialize};

use crate::types::round_to;

/// Frame counters for one session. Only ever grow until [`SessionStats::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_frames: u64,
    pub eye_contact_frames: u64,
    pub face_detected_frames: u64,
    pub blink_count: u64,
}

impl SessionStats {
    /// Record one submitted frame, with or without a face.
    pub fn record_frame(&mut self, face_detected: bool, contact: bool) {
        self.total_frames += 1;
        if face_detected {
            self.face_detected_frames += 1;
        }
        if contact {
            self.eye_contact_frames += 1;
        }
    }

    pub fn record_blink(&mut self) {
        self.blink_count += 1;
    }

    /// Share of submitted frames with eye contact, in [0, 100].
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.eye_contact_frames as f64 / self.total_frames as f64 * 100.0
    }

    /// Share of submitted frames with a detected face, in [0, 100].
    pub fn detection_rate(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.face_detected_frames as f64 / self.total_frames as f64 * 100.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementBand {
    High,
    Moderate,
    Low,
}

impl EngagementBand {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 60.0 {
            EngagementBand::High
        } else if percentage >= 30.0 {
            EngagementBand::Moderate
        } else {
            EngagementBand::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeStability {
    Stable,
    Moderate,
}

impl GazeStability {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 50.0 {
            GazeStability::Stable
        } else {
            GazeStability::Moderate
        }
    }
}

/// Aggregate returned when a session is stopped or summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub eye_contact_score: f64,
    pub focus_consistency: f64,
    pub blink_count: u64,
    /// Blinks per minute over the session duration.
    pub blink_rate: f64,
    pub total_eye_contact_seconds: f64,
    pub total_frames: u64,
    pub face_detected_frames: u64,
    pub detection_rate: f64,
    pub duration_secs: f64,
    pub engagement: EngagementBand,
    pub gaze_stability: GazeStability,
}

impl SessionSummary {
    /// Build a summary from the counters, the session length and the contact
    /// time. Durations under one second are treated as one second for the
    /// blink rate.
    pub fn new(stats: &SessionStats, duration_secs: f64, contact_secs: f64) -> Self {
        let score = round_to(stats.percentage(), 1);
        let minutes = duration_secs.max(1.0) / 60.0;
        Self {
            eye_contact_score: score,
            focus_consistency: round_to(score * 0.8, 1),
            blink_count: stats.blink_count,
            blink_rate: round_to(stats.blink_count as f64 / minutes, 1),
            total_eye_contact_seconds: round_to(contact_secs, 1),
            total_frames: stats.total_frames,
            face_detected_frames: stats.face_detected_frames,
            detection_rate: round_to(stats.detection_rate(), 1),
            duration_secs: round_to(duration_secs.max(0.0), 1),
            engagement: EngagementBand::from_percentage(score),
            gaze_stability: GazeStability::from_percentage(score),
        }
    }

    /// Eye contact as a ratio in [0, 1], for the engagement score.
    pub fn eye_contact_ratio(&self) -> f64 {
        (self.eye_contact_score / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_percentage_is_zero() {
        let stats = SessionStats::default();
        assert_eq!(stats.percentage(), 0.0);
        assert_eq!(stats.detection_rate(), 0.0);
    }

    #[test]
    fn test_counts_and_percentage() {
        let mut stats = SessionStats::default();
        stats.record_frame(true, true);
        stats.record_frame(true, false);
        stats.record_frame(false, false);
        stats.record_frame(true, true);
        assert_eq!(stats.total_frames, 4);
        assert_eq!(stats.face_detected_frames, 3);
        assert_eq!(stats.eye_contact_frames, 2);
        assert!((stats.percentage() - 50.0).abs() < 1e-9);
        assert!((stats.detection_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_contact_frames_never_exceed_total() {
        let mut stats = SessionStats::default();
        for i in 0..50u32 {
            stats.record_frame(i % 3 != 0, i % 2 == 0);
            assert!(stats.eye_contact_frames <= stats.total_frames);
            let p = stats.percentage();
            assert!((0.0..=100.0).contains(&p), "percentage {p}");
        }
    }

    #[test]
    fn test_reset() {
        let mut stats = SessionStats::default();
        stats.record_frame(true, true);
        stats.record_blink();
        stats.reset();
        assert_eq!(stats, SessionStats::default());
    }

    #[test]
    fn test_bands() {
        assert_eq!(EngagementBand::from_percentage(60.0), EngagementBand::High);
        assert_eq!(EngagementBand::from_percentage(59.9), EngagementBand::Moderate);
        assert_eq!(EngagementBand::from_percentage(30.0), EngagementBand::Moderate);
        assert_eq!(EngagementBand::from_percentage(29.9), EngagementBand::Low);
        assert_eq!(GazeStability::from_percentage(50.0), GazeStability::Stable);
        assert_eq!(GazeStability::from_percentage(49.0), GazeStability::Moderate);
    }

    #[test]
    fn test_summary() {
        let stats = SessionStats {
            total_frames: 300,
            eye_contact_frames: 200,
            face_detected_frames: 290,
            blink_count: 6,
        };
        let summary = SessionSummary::new(&stats, 120.0, 55.56);
        assert!((summary.eye_contact_score - 66.7).abs() < 1e-9);
        assert!((summary.focus_consistency - 53.4).abs() < 1e-9);
        assert!((summary.blink_rate - 3.0).abs() < 1e-9);
        assert!((summary.total_eye_contact_seconds - 55.6).abs() < 1e-9);
        assert!((summary.detection_rate - 96.7).abs() < 1e-9);
        assert_eq!(summary.engagement, EngagementBand::High);
        assert_eq!(summary.gaze_stability, GazeStability::Stable);
        assert!((summary.eye_contact_ratio() - 0.667).abs() < 1e-9);
    }

    #[test]
    fn test_short_session_blink_rate_floor() {
        let stats = SessionStats { blink_count: 1, ..SessionStats::default() };
        let summary = SessionSummary::new(&stats, 0.2, 0.0);
        assert!((summary.blink_rate - 60.0).abs() < 1e-9);
        assert_eq!(summary.engagement, EngagementBand::Low);
    }
}
