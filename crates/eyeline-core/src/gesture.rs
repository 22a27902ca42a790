//! Hand-gesture slide control: swipe detection over a short time window with
//! a cooldown, on/off toggling and a smoothed air pointer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::Landmark;

/// Index fingertip in the 21-point hand landmark model.
pub const HAND_INDEX_TIP: usize = 8;

pub const LABEL_THUMB_UP: &str = "Thumb_Up";
pub const LABEL_THUMB_DOWN: &str = "Thumb_Down";
pub const LABEL_POINTING_UP: &str = "Pointing_Up";
pub const LABEL_SWIPE_LEFT: &str = "Swipe_Left";
pub const LABEL_SWIPE_RIGHT: &str = "Swipe_Right";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwipeConfig {
    /// Length of the position history window.
    pub history_secs: f64,
    /// Minimum horizontal travel, as a fraction of frame width.
    pub min_delta: f64,
    /// Minimum speed in frame widths per second.
    pub min_speed: f64,
    pub min_samples: usize,
    /// No further action is recognized for this long after one fires.
    pub cooldown_secs: f64,
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            history_secs: 0.40,
            min_delta: 0.20,
            min_speed: 0.80,
            min_samples: 3,
            cooldown_secs: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwipeDirection {
    Left,
    Right,
}

impl SwipeDirection {
    /// Left advances the deck, right goes back.
    pub fn action(self) -> GestureAction {
        match self {
            SwipeDirection::Left => GestureAction::NextSlide,
            SwipeDirection::Right => GestureAction::PreviousSlide,
        }
    }
}

/// Horizontal swipe detector over a rolling time window.
#[derive(Debug, Clone)]
pub struct SwipeDetector {
    config: SwipeConfig,
    history: VecDeque<(f64, f64)>,
    last_action: Option<f64>,
}

impl SwipeDetector {
    pub fn new(config: SwipeConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            last_action: None,
        }
    }

    pub fn in_cooldown(&self, now: f64) -> bool {
        self.last_action
            .is_some_and(|last| now - last < self.config.cooldown_secs)
    }

    /// Feed one fingertip x position (normalized). Samples are ignored during
    /// the cooldown.
    pub fn observe(&mut self, now: f64, x: f64) -> Option<SwipeDirection> {
        if self.in_cooldown(now) || !x.is_finite() {
            return None;
        }
        self.history.push_back((now, x));
        let cutoff = now - self.config.history_secs;
        while self.history.front().is_some_and(|&(t, _)| t < cutoff) {
            self.history.pop_front();
        }

        let direction = self.detect()?;
        self.mark_action(now);
        Some(direction)
    }

    fn detect(&self) -> Option<SwipeDirection> {
        if self.history.len() < self.config.min_samples.max(2) {
            return None;
        }
        let &(t0, x0) = self.history.front()?;
        let &(t1, x1) = self.history.back()?;
        let delta = x1 - x0;
        let speed = delta.abs() / (t1 - t0).max(1e-6);
        if delta.abs() >= self.config.min_delta && speed >= self.config.min_speed {
            Some(if delta > 0.0 { SwipeDirection::Right } else { SwipeDirection::Left })
        } else {
            None
        }
    }

    /// Start the cooldown, e.g. after an externally recognized swipe.
    pub fn mark_action(&mut self, now: f64) {
        self.last_action = Some(now);
        self.history.clear();
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_action = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub swipe: SwipeConfig,
    /// Minimum time between two control toggles.
    pub toggle_debounce_secs: f64,
    /// EMA factor for the pointer, 0..1; higher is snappier.
    pub pointer_smoothing: f64,
    /// Use swipe labels from the gesture model before the landmark fallback.
    pub prefer_model_swipes: bool,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe: SwipeConfig::default(),
            toggle_debounce_secs: 1.0,
            pointer_smoothing: 0.25,
            prefer_model_swipes: true,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureAction {
    ControlOn,
    ControlOff,
    NextSlide,
    PreviousSlide,
    MovePointer { x: u32, y: u32 },
}

/// One frame of gesture-model output for the primary hand.
#[derive(Debug, Clone, Default)]
pub struct HandObservation {
    /// Top gesture category, if any.
    pub label: Option<String>,
    pub score: f32,
    /// Normalized hand landmarks, if a hand was found.
    pub landmarks: Option<Vec<Landmark>>,
}

impl HandObservation {
    fn index_tip(&self) -> Option<Landmark> {
        self.landmarks.as_ref()?.get(HAND_INDEX_TIP).copied()
    }
}

pub struct GestureController {
    config: GestureConfig,
    swipe: SwipeDetector,
    control_on: bool,
    last_toggle: Option<f64>,
    pointer: (f64, f64),
}

impl GestureController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            swipe: SwipeDetector::new(config.swipe),
            control_on: true,
            last_toggle: None,
            pointer: (config.screen_width as f64 / 2.0, config.screen_height as f64 / 2.0),
            config,
        }
    }

    pub fn is_control_on(&self) -> bool {
        self.control_on
    }

    pub fn pointer(&self) -> (f64, f64) {
        self.pointer
    }

    pub fn process(&mut self, now: f64, hand: &HandObservation) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        let label = hand.label.as_deref();

        if let Some(on) = match label {
            Some(LABEL_THUMB_UP) => Some(true),
            Some(LABEL_THUMB_DOWN) => Some(false),
            _ => None,
        } {
            let debounced = self
                .last_toggle
                .is_some_and(|last| now - last <= self.config.toggle_debounce_secs);
            if !debounced {
                self.control_on = on;
                self.last_toggle = Some(now);
                debug!(control_on = on, "gesture control toggled");
                actions.push(if on { GestureAction::ControlOn } else { GestureAction::ControlOff });
            }
        }

        if !self.control_on {
            return actions;
        }

        let tip = hand.index_tip();
        if label == Some(LABEL_POINTING_UP) {
            if let Some(tip) = tip {
                actions.push(self.move_pointer(tip));
            }
        }

        if self.swipe.in_cooldown(now) {
            return actions;
        }
        let prefer_model = self.config.prefer_model_swipes;
        let model_swipe = match label {
            Some(LABEL_SWIPE_LEFT) if prefer_model => Some(SwipeDirection::Left),
            Some(LABEL_SWIPE_RIGHT) if prefer_model => Some(SwipeDirection::Right),
            _ => None,
        };
        if let Some(direction) = model_swipe {
            self.swipe.mark_action(now);
            debug!(?direction, "model swipe");
            actions.push(direction.action());
        } else if let Some(tip) = tip {
            if let Some(direction) = self.swipe.observe(now, tip.x as f64) {
                debug!(?direction, "landmark swipe");
                actions.push(direction.action());
            }
        }

        actions
    }

    fn move_pointer(&mut self, tip: Landmark) -> GestureAction {
        let max_x = self.config.screen_width.saturating_sub(1) as f64;
        let max_y = self.config.screen_height.saturating_sub(1) as f64;
        let target_x = (tip.x as f64 * self.config.screen_width as f64).clamp(0.0, max_x);
        let target_y = (tip.y as f64 * self.config.screen_height as f64).clamp(0.0, max_y);
        let alpha = self.config.pointer_smoothing.clamp(0.0, 1.0);
        self.pointer.0 += (target_x - self.pointer.0) * alpha;
        self.pointer.1 += (target_y - self.pointer.1) * alpha;
        GestureAction::MovePointer {
            x: self.pointer.0.round() as u32,
            y: self.pointer.1.round() as u32,
        }
    }

    pub fn reset(&mut self) {
        self.swipe.reset();
        self.control_on = true;
        self.last_toggle = None;
        self.pointer = (
            self.config.screen_width as f64 / 2.0,
            self.config.screen_height as f64 / 2.0,
        );
    }
}
