use serde::{Deserialize, Serialize};

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleTriple {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl AngleTriple {
    pub const ZERO: AngleTriple = AngleTriple { pitch: 0.0, yaw: 0.0, roll: 0.0 };

    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Component-wise difference `self - baseline`.
    pub fn relative_to(&self, baseline: &AngleTriple) -> AngleTriple {
        AngleTriple {
            pitch: self.pitch - baseline.pitch,
            yaw: self.yaw - baseline.yaw,
            roll: self.roll - baseline.roll,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

/// Iris offset relative to the eye-corner span, averaged over both eyes.
///
/// Components are in [-1, 1]. `reliable` is false when the raw offset exceeded
/// the sanity bound, which means the eye geometry was degenerate rather than
/// the user looking far away.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeVector {
    pub x: f64,
    pub y: f64,
    pub reliable: bool,
}

impl GazeVector {
    pub fn centered() -> Self {
        Self { x: 0.0, y: 0.0, reliable: true }
    }
}

impl Default for GazeVector {
    fn default() -> Self {
        Self::centered()
    }
}

/// Classifier output for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactReading {
    /// No calibration baseline yet; pose-relative thresholds cannot be evaluated.
    Uncalibrated,
    Contact,
    NoContact,
}

impl ContactReading {
    pub fn is_contact(&self) -> bool {
        matches!(self, ContactReading::Contact)
    }
}

/// Gaze components as reported to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeReport {
    pub x: f64,
    pub y: f64,
}

/// Structured record emitted for every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub face_detected: bool,
    pub landmarks_detected: bool,
    pub calibrated: bool,
    pub reading: Option<ContactReading>,
    pub eye_contact: bool,
    /// Contact has been held for at least the configured persistence time.
    pub eye_contact_confirmed: bool,
    pub eye_contact_percentage: f64,
    /// Closed contact intervals plus the interval in progress, in seconds.
    pub eye_contact_seconds: f64,
    pub blink_count: u64,
    pub gaze_direction: GazeReport,
    pub head_pose: AngleTriple,
}

impl FrameAnalysis {
    /// Round reported values the way clients display them.
    pub(crate) fn rounded(mut self) -> Self {
        self.eye_contact_percentage = round_to(self.eye_contact_percentage, 1);
        self.eye_contact_seconds = round_to(self.eye_contact_seconds, 1);
        self.gaze_direction.x = round_to(self.gaze_direction.x, 3);
        self.gaze_direction.y = round_to(self.gaze_direction.y, 3);
        self.head_pose.pitch = round_to(self.head_pose.pitch, 1);
        self.head_pose.yaw = round_to(self.head_pose.yaw, 1);
        self.head_pose.roll = round_to(self.head_pose.roll, 1);
        self
    }
}

/// Round `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
