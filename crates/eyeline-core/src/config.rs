//! Tunable thresholds for the eye-contact pipeline.
//!
//! The right operating point depends on camera placement and lighting, so
//! every threshold is configuration. Two presets cover the common setups.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("{0} must be finite")]
    NotFinite(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Capacity of the angle smoothing window.
    pub smoothing_window: usize,
    /// Frames to observe before the calibration baseline is captured.
    /// Zero captures it from the first frame with a usable pose.
    pub warmup_frames: u64,
    /// Maximum calibrated |yaw| in degrees for contact.
    pub yaw_threshold_deg: f64,
    /// Maximum calibrated |pitch| in degrees for contact.
    pub pitch_threshold_deg: f64,
    /// Maximum |gaze x| and |gaze y| for contact.
    pub gaze_threshold: f64,
    /// Raw gaze magnitude above which the gaze reading is treated as corrupt.
    pub gaze_sanity_bound: f64,
    /// Contact must be held this long before it is reported as confirmed.
    pub persistence_secs: f64,
    /// Blink ratio at or below which the eyes count as closed.
    pub blink_threshold: f64,
    /// Consecutive closed frames required for one blink.
    pub blink_min_frames: u32,
    /// Face width in millimetres used to scale the 3D reference model.
    pub face_width_mm: f64,
    /// Apply the pitch sign/fold normalization after pose extraction.
    pub normalize_pitch: bool,
    /// Decoded images are resized to this size before extraction (0 keeps native size).
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            warmup_frames: 0,
            yaw_threshold_deg: 45.0,
            pitch_threshold_deg: 45.0,
            gaze_threshold: 0.8,
            gaze_sanity_bound: 2.0,
            persistence_secs: 2.0,
            blink_threshold: 0.51,
            blink_min_frames: 2,
            face_width_mm: 140.0,
            normalize_pitch: true,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

impl TrackerConfig {
    /// Stricter thresholds and heavier smoothing for a standalone live monitor.
    pub fn monitor() -> Self {
        Self {
            smoothing_window: 10,
            warmup_frames: 30,
            yaw_threshold_deg: 30.0,
            pitch_threshold_deg: 30.0,
            gaze_threshold: 0.5,
            ..Self::default()
        }
    }

    /// Look up a preset by name ("web" or "monitor").
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "web" | "default" => Some(Self::default()),
            "monitor" => Some(Self::monitor()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smoothing_window == 0 {
            return Err(ConfigError::NotPositive("smoothing_window"));
        }
        if self.blink_min_frames == 0 {
            return Err(ConfigError::NotPositive("blink_min_frames"));
        }
        let positive = [
            ("yaw_threshold_deg", self.yaw_threshold_deg),
            ("pitch_threshold_deg", self.pitch_threshold_deg),
            ("gaze_threshold", self.gaze_threshold),
            ("gaze_sanity_bound", self.gaze_sanity_bound),
            ("blink_threshold", self.blink_threshold),
            ("face_width_mm", self.face_width_mm),
        ];
        for (name, value) in positive {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if !self.persistence_secs.is_finite() {
            return Err(ConfigError::NotFinite("persistence_secs"));
        }
        Ok(())
    }
}
