//! Per-session eye-contact tracker.
//!
//! Owns every piece of mutable session state (smoothing buffer, calibration,
//! contact state, blink counter and frame counters) and runs one frame to
//! completion per call. One tracker per session; callers serialize access.

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blink::BlinkCounter;
use crate::classifier::{ContactThresholds, EyeContactClassifier, EyeContactState};
use crate::clock::Clock;
use crate::config::{ConfigError, TrackerConfig};
use crate::decode::{decode_frame, DecodeError};
use crate::extractor::LandmarkExtractor;
use crate::geometry::{blink_ratio, gaze_vector};
use crate::landmarks::LandmarkSet;
use crate::pose::HeadPoseSolver;
use crate::session::{SessionStats, SessionSummary};
use crate::smoothing::{AngleBuffer, Calibration};
use crate::types::{AngleTriple, ContactReading, FrameAnalysis, GazeReport};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("invalid tracker config: {0}")]
    Config(#[from] ConfigError),
    #[error("frame decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("session already stopped")]
    Stopped,
}

pub struct EyeTracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    solver: HeadPoseSolver,
    classifier: EyeContactClassifier,
    buffer: AngleBuffer,
    calibration: Calibration,
    contact: EyeContactState,
    blinks: BlinkCounter,
    stats: SessionStats,
    /// Frames in which a face was found, for the calibration warm-up.
    frames_seen: u64,
    started_at: f64,
    stopped_at: Option<f64>,
    last: FrameAnalysis,
}

impl EyeTracker {
    /// Create a tracker and start its session.
    pub fn new(config: TrackerConfig, clock: Arc<dyn Clock>) -> Result<Self, TrackerError> {
        config.validate()?;
        let started_at = clock.now();
        Ok(Self {
            solver: HeadPoseSolver::new(config.face_width_mm, config.normalize_pitch),
            classifier: EyeContactClassifier::new(ContactThresholds::from(&config)),
            buffer: AngleBuffer::new(config.smoothing_window),
            calibration: Calibration::new(config.warmup_frames),
            contact: EyeContactState::new(),
            blinks: BlinkCounter::new(config.blink_threshold, config.blink_min_frames),
            stats: SessionStats::default(),
            frames_seen: 0,
            started_at,
            stopped_at: None,
            last: empty_analysis(),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    pub fn baseline(&self) -> Option<AngleTriple> {
        self.calibration.baseline()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    /// Wipe all session state and start a new session now.
    pub fn start(&mut self) {
        self.buffer.reset();
        self.calibration.clear();
        self.contact.reset();
        self.blinks.reset();
        self.stats.reset();
        self.frames_seen = 0;
        self.started_at = self.clock.now();
        self.stopped_at = None;
        self.last = empty_analysis();
        info!("tracker session started");
    }

    pub fn reset(&mut self) {
        self.start();
    }

    /// Drop the baseline and the smoothing history; the next usable frame
    /// captures a new baseline. An open contact interval ends here, since
    /// no frame can be classified until the baseline is back.
    pub fn recalibrate(&mut self) {
        self.buffer.reset();
        self.calibration.clear();
        self.contact.finish(self.clock.now());
        info!("calibration cleared");
    }

    /// Decode a submitted frame and process it. On decode failure the session
    /// is left untouched and [`EyeTracker::last_analysis`] still holds the
    /// previous record.
    pub fn process_image(
        &mut self,
        extractor: &mut dyn LandmarkExtractor,
        bytes: &[u8],
    ) -> Result<FrameAnalysis, TrackerError> {
        if self.is_stopped() {
            return Err(TrackerError::Stopped);
        }
        let image = decode_frame(bytes, self.config.frame_width, self.config.frame_height)?;
        self.process_rgb(extractor, &image)
    }

    /// Process an already decoded frame.
    pub fn process_rgb(
        &mut self,
        extractor: &mut dyn LandmarkExtractor,
        image: &RgbImage,
    ) -> Result<FrameAnalysis, TrackerError> {
        if self.is_stopped() {
            return Err(TrackerError::Stopped);
        }
        let landmarks = match extractor.extract(image) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "landmark extraction failed, treating frame as empty");
                None
            }
        };
        self.process_landmarks(landmarks.as_ref(), image.width(), image.height())
    }

    /// Process one frame's landmarks for a `width` x `height` image.
    pub fn process_landmarks(
        &mut self,
        landmarks: Option<&LandmarkSet>,
        width: u32,
        height: u32,
    ) -> Result<FrameAnalysis, TrackerError> {
        if self.is_stopped() {
            return Err(TrackerError::Stopped);
        }
        let now = self.clock.now();

        let Some(landmarks) = landmarks else {
            self.contact.update(false, now);
            self.stats.record_frame(false, false);
            let analysis = FrameAnalysis {
                face_detected: false,
                landmarks_detected: false,
                reading: None,
                gaze_direction: GazeReport::default(),
                head_pose: AngleTriple::ZERO,
                ..self.aggregate(now)
            };
            self.last = analysis.rounded();
            return Ok(self.last.clone());
        };

        self.frames_seen += 1;

        if let Some(ratio) = blink_ratio(landmarks) {
            if self.blinks.update(ratio) {
                self.stats.record_blink();
                debug!(total = self.stats.blink_count, "blink");
            }
        }

        let gaze = gaze_vector(landmarks, width, height, self.config.gaze_sanity_bound);

        match self.solver.solve(landmarks, width, height) {
            Ok(estimate) => self.buffer.push(estimate.angles),
            Err(e) => debug!(error = %e, "head pose unavailable this frame"),
        }
        let smoothed = self.buffer.smoothed();

        if self.calibration.observe(self.frames_seen, smoothed) {
            let baseline = self.calibration.baseline().unwrap_or_default();
            info!(
                pitch = baseline.pitch,
                yaw = baseline.yaw,
                roll = baseline.roll,
                frames = self.frames_seen,
                "calibration baseline captured"
            );
        }

        let relative = smoothed.and_then(|s| self.calibration.relative(&s));
        let reading = self.classifier.classify(relative.as_ref(), gaze.as_ref());
        match reading {
            ContactReading::Contact => {
                self.contact.update(true, now);
            }
            ContactReading::NoContact => {
                self.contact.update(false, now);
            }
            ContactReading::Uncalibrated => {}
        }

        let contact = reading.is_contact();
        self.stats.record_frame(true, contact);

        let gaze = gaze.unwrap_or_default();
        let analysis = FrameAnalysis {
            face_detected: true,
            landmarks_detected: true,
            reading: Some(reading),
            eye_contact: contact,
            eye_contact_confirmed: contact
                && self.contact.is_confirmed(now, self.config.persistence_secs),
            gaze_direction: GazeReport { x: gaze.x, y: gaze.y },
            head_pose: relative.or(smoothed).unwrap_or(AngleTriple::ZERO),
            ..self.aggregate(now)
        };
        self.last = analysis.rounded();
        Ok(self.last.clone())
    }

    /// Session-level fields of a frame record.
    fn aggregate(&self, now: f64) -> FrameAnalysis {
        FrameAnalysis {
            face_detected: self.last.face_detected,
            landmarks_detected: self.last.landmarks_detected,
            calibrated: self.calibration.is_calibrated(),
            reading: self.last.reading,
            eye_contact: false,
            eye_contact_confirmed: self.contact.is_confirmed(now, self.config.persistence_secs),
            eye_contact_percentage: self.stats.percentage(),
            eye_contact_seconds: self.contact.total_secs(now),
            blink_count: self.stats.blink_count,
            gaze_direction: self.last.gaze_direction,
            head_pose: self.last.head_pose,
        }
    }

    /// Record of the most recent frame.
    pub fn last_analysis(&self) -> FrameAnalysis {
        self.last.clone()
    }

    /// Summary so far. Any open contact interval is counted up to now.
    pub fn summary(&self) -> SessionSummary {
        let end = self.stopped_at.unwrap_or_else(|| self.clock.now());
        SessionSummary::new(&self.stats, end - self.started_at, self.contact.total_secs(end))
    }

    /// Close the session and return its summary. Further frames are rejected.
    pub fn stop(&mut self) -> SessionSummary {
        if self.stopped_at.is_none() {
            let now = self.clock.now();
            self.contact.finish(now);
            self.stopped_at = Some(now);
            info!(
                frames = self.stats.total_frames,
                contact_frames = self.stats.eye_contact_frames,
                blinks = self.stats.blink_count,
                "tracker session stopped"
            );
        }
        self.summary()
    }
}

fn empty_analysis() -> FrameAnalysis {
    FrameAnalysis {
        face_detected: false,
        landmarks_detected: false,
        calibrated: false,
        reading: None,
        eye_contact: false,
        eye_contact_confirmed: false,
        eye_contact_percentage: 0.0,
        eye_contact_seconds: 0.0,
        blink_count: 0,
        gaze_direction: GazeReport::default(),
        head_pose: AngleTriple::ZERO,
    }
}
