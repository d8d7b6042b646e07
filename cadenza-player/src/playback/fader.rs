//! Linear volume fades
//!
//! A [`FadeController`] is a pure function of elapsed time. The owning stream samples
//! it once per update tick, applies the [`AfterFadeAction`] when it reports finished,
//! and then drops it, so the action runs exactly once.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// What a stream does once its fade reaches the target volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterFadeAction {
    #[default]
    None,
    Pause,
    Stop,
    Close,
}

impl FromStr for AfterFadeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(AfterFadeAction::None),
            "pause" => Ok(AfterFadeAction::Pause),
            "stop" => Ok(AfterFadeAction::Stop),
            "close" => Ok(AfterFadeAction::Close),
            other => Err(Error::Playback(format!("Unknown fade action: {}", other))),
        }
    }
}

impl fmt::Display for AfterFadeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AfterFadeAction::None => write!(f, "none"),
            AfterFadeAction::Pause => write!(f, "pause"),
            AfterFadeAction::Stop => write!(f, "stop"),
            AfterFadeAction::Close => write!(f, "close"),
        }
    }
}

/// One in-flight fade from `from` to `to` over `duration` seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeController {
    from: f32,
    to: f32,
    duration: f64,
    action: AfterFadeAction,
}

impl FadeController {
    /// Start a fade; non-positive (or NaN) durations jump straight to `to`
    pub fn start(from: f32, to: f32, seconds: f64, action: AfterFadeAction) -> Self {
        let duration = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        Self {
            from,
            to,
            duration,
            action,
        }
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn action(&self) -> AfterFadeAction {
        self.action
    }

    pub fn is_finished(&self, elapsed: f64) -> bool {
        elapsed >= self.duration
    }

    /// Volume after `elapsed` seconds
    pub fn value(&self, elapsed: f64) -> f32 {
        if self.is_finished(elapsed) {
            return self.to;
        }
        let t = (elapsed / self.duration).clamp(0.0, 1.0) as f32;
        self.from + (self.to - self.from) * t
    }

    /// Volume and finished flag in one call
    pub fn sample(&self, elapsed: f64) -> (f32, bool) {
        (self.value(elapsed), self.is_finished(elapsed))
    }
}
