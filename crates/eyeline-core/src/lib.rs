//! eyeline-core — Webcam eye-contact estimation and engagement scoring.
//!
//! Extracts face-mesh landmarks via ONNX Runtime, recovers head pose and
//! iris gaze from them, and classifies each frame as eye contact or not
//! relative to a per-session calibration baseline. Session statistics are
//! combined with speech and voice metrics into a single engagement score.

pub mod blink;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod decode;
pub mod engagement;
pub mod extractor;
pub mod geometry;
pub mod gesture;
pub mod landmarks;
pub mod pose;
pub mod session;
pub mod smoothing;
pub mod speech;
pub mod tracker;
pub mod types;
pub mod voice;

use std::path::PathBuf;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::TrackerConfig;
pub use engagement::{engagement_score, CombinedAnalysis, EngagementInputs, EngagementWeights};
pub use extractor::{FaceMeshExtractor, LandmarkExtractor};
pub use landmarks::{Landmark, LandmarkSet};
pub use session::{SessionStats, SessionSummary};
pub use speech::{evaluate_transcript, SpeechMetrics};
pub use tracker::{EyeTracker, TrackerError};
pub use types::{AngleTriple, ContactReading, FrameAnalysis, GazeVector};
pub use voice::{VoiceMetrics, VoiceSample, VoiceTrack};

/// File name of the refined face-mesh model inside the model directory.
pub const FACE_MESH_MODEL: &str = "face_landmarks_478.onnx";

/// Model directory used when none is configured: `$XDG_DATA_HOME/eyeline/models`,
/// falling back to `~/.local/share/eyeline/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("eyeline")
        .join("models")
}
