//! Real-time voice level samples and the derived stability factor.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Samples retained per session; older samples are dropped first.
pub const MAX_VOICE_SAMPLES: usize = 1000;

/// Volume above which the speaker is considered to be talking.
pub const SPEAKING_VOLUME: f64 = 5.0;

/// Variance at which volume consistency bottoms out.
const VARIANCE_SCALE: f64 = 1000.0;
/// Pitch range at which pitch variation saturates.
const PITCH_RANGE_SCALE: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSample {
    pub timestamp_ms: f64,
    pub volume: f64,
    pub pitch: f64,
}

pub fn is_speaking(volume: f64) -> bool {
    volume > SPEAKING_VOLUME
}

/// Bounded FIFO of voice samples for one session.
#[derive(Debug, Clone)]
pub struct VoiceTrack {
    samples: VecDeque<VoiceSample>,
    capacity: usize,
}

impl Default for VoiceTrack {
    fn default() -> Self {
        Self::new(MAX_VOICE_SAMPLES)
    }
}

impl VoiceTrack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(MAX_VOICE_SAMPLES)),
            capacity,
        }
    }

    /// Store a sample and report whether it counts as speech. Non-finite samples are dropped.
    pub fn push(&mut self, sample: VoiceSample) -> bool {
        if !(sample.volume.is_finite()
            && sample.pitch.is_finite()
            && sample.timestamp_ms.is_finite())
        {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        is_speaking(sample.volume)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn metrics(&self) -> Option<VoiceMetrics> {
        let samples: Vec<VoiceSample> = self.samples.iter().copied().collect();
        VoiceMetrics::from_samples(&samples)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetrics {
    pub average_volume: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    /// Population variance of the volume.
    pub volume_variance: f64,
    pub average_pitch: f64,
    pub pitch_range: f64,
    pub sample_count: usize,
    pub duration_secs: f64,
    /// `1 - min(variance / 1000, 1)`.
    pub volume_consistency: f64,
    /// `min(pitch_range / 200, 1)`.
    pub pitch_variation: f64,
    pub voice_factor: f64,
}

impl VoiceMetrics {
    /// `None` for an empty sample list.
    pub fn from_samples(samples: &[VoiceSample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;
        let n = samples.len() as f64;

        let average_volume = samples.iter().map(|s| s.volume).sum::<f64>() / n;
        let volume_variance = samples
            .iter()
            .map(|s| (s.volume - average_volume).powi(2))
            .sum::<f64>()
            / n;
        let min_volume = samples.iter().map(|s| s.volume).fold(f64::INFINITY, f64::min);
        let max_volume = samples.iter().map(|s| s.volume).fold(f64::NEG_INFINITY, f64::max);
        let average_pitch = samples.iter().map(|s| s.pitch).sum::<f64>() / n;
        let min_pitch = samples.iter().map(|s| s.pitch).fold(f64::INFINITY, f64::min);
        let max_pitch = samples.iter().map(|s| s.pitch).fold(f64::NEG_INFINITY, f64::max);
        let pitch_range = max_pitch - min_pitch;

        let volume_consistency = 1.0 - (volume_variance / VARIANCE_SCALE).min(1.0);
        let pitch_variation = (pitch_range / PITCH_RANGE_SCALE).min(1.0);

        Some(Self {
            average_volume,
            min_volume,
            max_volume,
            volume_variance,
            average_pitch,
            pitch_range,
            sample_count: samples.len(),
            duration_secs: ((last.timestamp_ms - first.timestamp_ms) / 1000.0).max(0.0),
            volume_consistency,
            pitch_variation,
            voice_factor: (volume_consistency + pitch_variation) / 2.0,
        })
    }
}
