use eyeline_core::{EngagementInputs, EngagementWeights, VoiceSample};
use serde::Serialize;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the Eyeline session daemon.
///
/// Bus name: org.eyeline.Eyeline1
/// Object path: /org/eyeline/Eyeline1
pub struct EyelineService {
    pub engine: EngineHandle,
    pub weights: EngagementWeights,
    pub model_path: String,
    pub preset: String,
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::SessionNotFound(_) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        EngineError::Tracker(eyeline_core::TrackerError::Decode(_)) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        EngineError::TooManySessions(_) => zbus::fdo::Error::LimitsExceeded(e.to_string()),
        _ => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.eyeline.Eyeline1")]
impl EyelineService {
    /// Open (or restart) a session. An empty id requests a generated one.
    async fn start_session(&self, id: &str) -> zbus::fdo::Result<String> {
        self.engine.start(id.to_string()).await.map_err(to_fdo)
    }

    /// Process one encoded frame (JPEG/PNG bytes or a base64 data URL).
    async fn process_frame(&self, id: &str, frame: Vec<u8>) -> zbus::fdo::Result<String> {
        let analysis = self
            .engine
            .process_frame(id.to_string(), frame)
            .await
            .map_err(to_fdo)?;
        to_json(&analysis)
    }

    /// Drop the session's baseline; the next usable frame sets a new one.
    async fn recalibrate(&self, id: &str) -> zbus::fdo::Result<()> {
        tracing::info!(session = id, "recalibrate requested");
        self.engine.recalibrate(id.to_string()).await.map_err(to_fdo)
    }

    async fn reset_session(&self, id: &str) -> zbus::fdo::Result<()> {
        tracing::info!(session = id, "reset requested");
        self.engine.reset(id.to_string()).await.map_err(to_fdo)
    }

    /// Store a voice level sample. Returns whether the speaker is talking.
    async fn push_voice(
        &self,
        id: &str,
        timestamp_ms: f64,
        volume: f64,
        pitch: f64,
    ) -> zbus::fdo::Result<bool> {
        let sample = VoiceSample {
            timestamp_ms,
            volume,
            pitch,
        };
        self.engine
            .push_voice(id.to_string(), sample)
            .await
            .map_err(to_fdo)
    }

    /// Evaluate a transcript of the session's speech.
    async fn submit_transcript(
        &self,
        id: &str,
        text: &str,
        duration_secs: f64,
    ) -> zbus::fdo::Result<String> {
        let metrics = self
            .engine
            .submit_transcript(id.to_string(), text.to_string(), duration_secs)
            .await
            .map_err(to_fdo)?;
        to_json(&metrics)
    }

    /// Stop the session and return its combined analysis.
    async fn stop_session(&self, id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(session = id, "stop requested");
        let analysis = self.engine.stop(id.to_string()).await.map_err(to_fdo)?;
        to_json(&analysis)
    }

    /// Stop the session, free its slot, and return the final analysis.
    async fn close_session(&self, id: &str) -> zbus::fdo::Result<String> {
        let analysis = self.engine.close(id.to_string()).await.map_err(to_fdo)?;
        to_json(&analysis)
    }

    /// Combined analysis so far without stopping the session.
    async fn analyze(&self, id: &str) -> zbus::fdo::Result<String> {
        let analysis = self.engine.analyze(id.to_string()).await.map_err(to_fdo)?;
        to_json(&analysis)
    }

    /// Engagement score for explicit inputs, using the daemon's weights.
    async fn score(
        &self,
        eye_contact_ratio: f64,
        speech_accuracy: f64,
        speaking_rate_wpm: f64,
        voice_factor: f64,
    ) -> f64 {
        self.weights.score(&EngagementInputs {
            eye_contact_ratio,
            speech_accuracy,
            speaking_rate_wpm,
            voice_factor,
        })
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model": self.model_path,
            "preset": self.preset,
            "max_sessions": status.max_sessions,
            "sessions": status.sessions,
        })
        .to_string())
    }
}
