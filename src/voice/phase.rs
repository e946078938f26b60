//! Atomic voice-phase tracking.
//!
//! The session task is the only writer, but the phase is read from other
//! threads (tests, diagnostics), so it lives in an `AtomicU8`.

use std::sync::atomic::{AtomicU8, Ordering};

/// Where the voice session currently is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoicePhase {
    /// No run in progress.
    Idle = 0,
    /// Microphone audio is being forwarded to the controller.
    Streaming = 1,
    /// Speech ended; waiting for the controller's TTS.
    AwaitingTts = 2,
    /// TTS or announcement playback in progress.
    PlayingTts = 3,
    /// A finished timer is ringing.
    TimerRinging = 4,
}

impl VoicePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Streaming,
            2 => Self::AwaitingTts,
            3 => Self::PlayingTts,
            4 => Self::TimerRinging,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for VoicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::AwaitingTts => write!(f, "awaiting_tts"),
            Self::PlayingTts => write!(f, "playing_tts"),
            Self::TimerRinging => write!(f, "timer_ringing"),
        }
    }
}

#[derive(Debug)]
pub struct PhaseTracker {
    phase: AtomicU8,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(VoicePhase::Idle as u8),
        }
    }

    pub fn current(&self) -> VoicePhase {
        VoicePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: VoicePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.current(), VoicePhase::Idle);
        tracker.set(VoicePhase::Streaming);
        assert_eq!(tracker.current(), VoicePhase::Streaming);
        tracker.set(VoicePhase::TimerRinging);
        assert_eq!(tracker.current(), VoicePhase::TimerRinging);
        assert_eq!(tracker.current().to_string(), "timer_ringing");
    }
}
