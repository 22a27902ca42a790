//! Engagement score: a weighted, explainable blend of eye contact, speech
//! accuracy, speaking rate and voice stability.

use serde::{Deserialize, Serialize};

use crate::session::SessionSummary;
use crate::speech::SpeechMetrics;
use crate::types::round_to;
use crate::voice::VoiceMetrics;

/// Snapshot of the four signals for one scoring call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementInputs {
    /// Share of frames with eye contact, [0, 1].
    pub eye_contact_ratio: f64,
    /// Transcript accuracy, [0, 100].
    pub speech_accuracy: f64,
    pub speaking_rate_wpm: f64,
    /// Voice stability factor, [0, 1].
    pub voice_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    pub eye_contact: f64,
    pub speech: f64,
    pub rate: f64,
    pub voice: f64,
    /// Speaking rate that earns the full rate score.
    pub ideal_wpm: f64,
    /// Rate points lost per wpm of deviation from `ideal_wpm`.
    pub rate_penalty_per_wpm: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            eye_contact: 0.35,
            speech: 0.35,
            rate: 0.15,
            voice: 0.15,
            ideal_wpm: 135.0,
            rate_penalty_per_wpm: 2.0,
        }
    }
}

impl EngagementWeights {
    /// Rate sub-score in [0, 100].
    pub fn rate_score(&self, wpm: f64) -> f64 {
        if !wpm.is_finite() {
            return 0.0;
        }
        (100.0 - self.rate_penalty_per_wpm * (wpm - self.ideal_wpm).abs()).clamp(0.0, 100.0)
    }

    /// Weighted score in [0, 100]. Out-of-range inputs are clamped to their domain.
    pub fn score(&self, inputs: &EngagementInputs) -> f64 {
        let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let eye = unit(inputs.eye_contact_ratio) * 100.0;
        let speech = unit(inputs.speech_accuracy / 100.0) * 100.0;
        let voice = unit(inputs.voice_factor) * 100.0;
        let rate = self.rate_score(inputs.speaking_rate_wpm);

        let total = eye * self.eye_contact
            + speech * self.speech
            + rate * self.rate
            + voice * self.voice;
        total.clamp(0.0, 100.0)
    }
}

/// Score with the default weights.
pub fn engagement_score(inputs: &EngagementInputs) -> f64 {
    EngagementWeights::default().score(inputs)
}

/// Session summary joined with the optional speech and voice results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    pub session: SessionSummary,
    pub speech: Option<SpeechMetrics>,
    pub voice: Option<VoiceMetrics>,
    pub inputs: EngagementInputs,
    pub engagement_score: f64,
}

impl CombinedAnalysis {
    /// Missing speech or voice data contributes zero to the score.
    pub fn new(
        session: SessionSummary,
        speech: Option<SpeechMetrics>,
        voice: Option<VoiceMetrics>,
        weights: &EngagementWeights,
    ) -> Self {
        let inputs = EngagementInputs {
            eye_contact_ratio: session.eye_contact_ratio(),
            speech_accuracy: speech.as_ref().map_or(0.0, |s| s.accuracy_score),
            speaking_rate_wpm: speech.as_ref().map_or(0.0, |s| s.words_per_minute),
            voice_factor: voice.as_ref().map_or(0.0, |v| v.voice_factor),
        };
        let engagement_score = round_to(weights.score(&inputs), 1);
        Self {
            session,
            speech,
            voice,
            inputs,
            engagement_score,
        }
    }
}
