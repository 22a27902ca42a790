use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyeline_core::extractor::ExtractorError;
use eyeline_core::{
    evaluate_transcript, Clock, CombinedAnalysis, EngagementWeights, EyeTracker, FaceMeshExtractor,
    FrameAnalysis, LandmarkExtractor, MonotonicClock, SpeechMetrics, TrackerConfig, TrackerError,
    VoiceSample, VoiceTrack,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("no session with id {0}")]
    SessionNotFound(String),
    #[error("session limit reached ({0})")]
    TooManySessions(usize),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Per-session state. Only the engine thread touches it.
struct Session {
    tracker: EyeTracker,
    voice: VoiceTrack,
    speech: Option<SpeechMetrics>,
    opened_at: DateTime<Utc>,
}

impl Session {
    fn analysis(&self, weights: &EngagementWeights) -> CombinedAnalysis {
        CombinedAnalysis::new(
            self.tracker.summary(),
            self.speech.clone(),
            self.voice.metrics(),
            weights,
        )
    }
}

/// One open session as reported by `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub opened_at: DateTime<Utc>,
    pub frames: u64,
    pub calibrated: bool,
    pub stopped: bool,
}

/// Engine-wide state reported by `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub max_sessions: usize,
    pub sessions: Vec<SessionInfo>,
}

/// All sessions, keyed by id. Every method runs on the engine thread.
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    tracker_config: TrackerConfig,
    weights: EngagementWeights,
    max_sessions: usize,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(
        tracker_config: TrackerConfig,
        weights: EngagementWeights,
        max_sessions: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            tracker_config,
            weights,
            max_sessions,
            clock,
        }
    }

    /// Open a session. An empty id gets a generated one; an existing id is
    /// restarted from scratch.
    pub fn start(&mut self, id: &str) -> Result<String, EngineError> {
        let id = if id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };

        if let Some(session) = self.sessions.get_mut(&id) {
            session.tracker.start();
            session.voice.clear();
            session.speech = None;
            session.opened_at = Utc::now();
            tracing::info!(session = %id, "session restarted");
            return Ok(id);
        }

        if self.sessions.len() >= self.max_sessions {
            return Err(EngineError::TooManySessions(self.max_sessions));
        }
        let tracker = EyeTracker::new(self.tracker_config.clone(), self.clock.clone())?;
        self.sessions.insert(
            id.clone(),
            Session {
                tracker,
                voice: VoiceTrack::default(),
                speech: None,
                opened_at: Utc::now(),
            },
        );
        tracing::info!(session = %id, open = self.sessions.len(), "session started");
        Ok(id)
    }

    fn session(&mut self, id: &str) -> Result<&mut Session, EngineError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    pub fn process_frame(
        &mut self,
        extractor: &mut dyn LandmarkExtractor,
        id: &str,
        frame: &[u8],
    ) -> Result<FrameAnalysis, EngineError> {
        let session = self.session(id)?;
        let analysis = session.tracker.process_image(extractor, frame)?;
        tracing::trace!(
            session = id,
            contact = analysis.eye_contact,
            percentage = analysis.eye_contact_percentage,
            "frame processed"
        );
        Ok(analysis)
    }

    pub fn recalibrate(&mut self, id: &str) -> Result<(), EngineError> {
        self.session(id)?.tracker.recalibrate();
        Ok(())
    }

    pub fn reset(&mut self, id: &str) -> Result<(), EngineError> {
        let session = self.session(id)?;
        session.tracker.reset();
        session.voice.clear();
        session.speech = None;
        Ok(())
    }

    /// Store a voice sample; returns whether it counts as speech.
    pub fn push_voice(&mut self, id: &str, sample: VoiceSample) -> Result<bool, EngineError> {
        Ok(self.session(id)?.voice.push(sample))
    }

    pub fn submit_transcript(
        &mut self,
        id: &str,
        text: &str,
        duration_secs: f64,
    ) -> Result<SpeechMetrics, EngineError> {
        let session = self.session(id)?;
        let metrics = evaluate_transcript(text, duration_secs);
        tracing::debug!(
            session = id,
            words = metrics.word_count,
            accuracy = metrics.accuracy_score,
            "transcript evaluated"
        );
        session.speech = Some(metrics.clone());
        Ok(metrics)
    }

    /// Stop the session's tracker and return the combined analysis. The
    /// session stays open for `analyze` until closed or restarted.
    pub fn stop(&mut self, id: &str) -> Result<CombinedAnalysis, EngineError> {
        let weights = self.weights;
        let session = self.session(id)?;
        session.tracker.stop();
        Ok(session.analysis(&weights))
    }

    pub fn analyze(&mut self, id: &str) -> Result<CombinedAnalysis, EngineError> {
        let weights = self.weights;
        Ok(self.session(id)?.analysis(&weights))
    }

    /// Stop and forget a session, freeing its slot.
    pub fn close(&mut self, id: &str) -> Result<CombinedAnalysis, EngineError> {
        let analysis = self.stop(id)?;
        self.sessions.remove(id);
        tracing::info!(session = id, open = self.sessions.len(), "session closed");
        Ok(analysis)
    }

    pub fn status(&self) -> EngineStatus {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                id: id.clone(),
                opened_at: s.opened_at,
                frames: s.tracker.stats().total_frames,
                calibrated: s.tracker.is_calibrated(),
                stopped: s.tracker.is_stopped(),
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        EngineStatus {
            max_sessions: self.max_sessions,
            sessions,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Start { id: String, reply: Reply<String> },
    ProcessFrame { id: String, frame: Vec<u8>, reply: Reply<FrameAnalysis> },
    Recalibrate { id: String, reply: Reply<()> },
    Reset { id: String, reply: Reply<()> },
    PushVoice { id: String, sample: VoiceSample, reply: Reply<bool> },
    SubmitTranscript { id: String, text: String, duration_secs: f64, reply: Reply<SpeechMetrics> },
    Stop { id: String, reply: Reply<CombinedAnalysis> },
    Analyze { id: String, reply: Reply<CombinedAnalysis> },
    Close { id: String, reply: Reply<CombinedAnalysis> },
    Status { reply: oneshot::Sender<EngineStatus> },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn start(&self, id: String) -> Result<String, EngineError> {
        self.call(|reply| EngineRequest::Start { id, reply }).await
    }

    pub async fn process_frame(
        &self,
        id: String,
        frame: Vec<u8>,
    ) -> Result<FrameAnalysis, EngineError> {
        self.call(|reply| EngineRequest::ProcessFrame { id, frame, reply }).await
    }

    pub async fn recalibrate(&self, id: String) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::Recalibrate { id, reply }).await
    }

    pub async fn reset(&self, id: String) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::Reset { id, reply }).await
    }

    pub async fn push_voice(&self, id: String, sample: VoiceSample) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::PushVoice { id, sample, reply }).await
    }

    pub async fn submit_transcript(
        &self,
        id: String,
        text: String,
        duration_secs: f64,
    ) -> Result<SpeechMetrics, EngineError> {
        self.call(|reply| EngineRequest::SubmitTranscript {
            id,
            text,
            duration_secs,
            reply,
        })
        .await
    }

    pub async fn stop(&self, id: String) -> Result<CombinedAnalysis, EngineError> {
        self.call(|reply| EngineRequest::Stop { id, reply }).await
    }

    pub async fn analyze(&self, id: String) -> Result<CombinedAnalysis, EngineError> {
        self.call(|reply| EngineRequest::Analyze { id, reply }).await
    }

    pub async fn close(&self, id: String) -> Result<CombinedAnalysis, EngineError> {
        self.call(|reply| EngineRequest::Close { id, reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Load the face-mesh model and spawn the engine. Fails fast if the model
/// is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let model_path = config.model_path();
    let extractor = FaceMeshExtractor::load(&model_path, config.model_channels_last)?;
    tracing::info!(path = %model_path, "face mesh extractor loaded");

    let registry = SessionRegistry::new(
        config.tracker.clone(),
        config.weights,
        config.max_sessions,
        Arc::new(MonotonicClock::new()),
    );
    spawn_with(Box::new(extractor), registry)
}

/// Spawn the engine on a dedicated OS thread around an already loaded
/// extractor. Every session is processed on this one thread.
pub fn spawn_with(
    mut extractor: Box<dyn LandmarkExtractor>,
    mut registry: SessionRegistry,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("eyeline-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                dispatch(&mut registry, extractor.as_mut(), req);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn dispatch(
    registry: &mut SessionRegistry,
    extractor: &mut dyn LandmarkExtractor,
    req: EngineRequest,
) {
    // A dropped receiver means the caller gave up; nothing to do.
    match req {
        EngineRequest::Start { id, reply } => {
            let _ = reply.send(registry.start(&id));
        }
        EngineRequest::ProcessFrame { id, frame, reply } => {
            let _ = reply.send(registry.process_frame(extractor, &id, &frame));
        }
        EngineRequest::Recalibrate { id, reply } => {
            let _ = reply.send(registry.recalibrate(&id));
        }
        EngineRequest::Reset { id, reply } => {
            let _ = reply.send(registry.reset(&id));
        }
        EngineRequest::PushVoice { id, sample, reply } => {
            let _ = reply.send(registry.push_voice(&id, sample));
        }
        EngineRequest::SubmitTranscript {
            id,
            text,
            duration_secs,
            reply,
        } => {
            let _ = reply.send(registry.submit_transcript(&id, &text, duration_secs));
        }
        EngineRequest::Stop { id, reply } => {
            let _ = reply.send(registry.stop(&id));
        }
        EngineRequest::Analyze { id, reply } => {
            let _ = reply.send(registry.analyze(&id));
        }
        EngineRequest::Close { id, reply } => {
            let _ = reply.send(registry.close(&id));
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(registry.status());
        }
    }
}
