//! Core event channel.
//!
//! External collaborators (capture thread, playback workers, the wake-word
//! engine) never touch session state directly. They post events through an
//! unbounded channel and the connection task applies them between socket
//! reads, so every state transition happens on the core task.

use tokio::sync::mpsc;

use crate::audio::PlaybackOutcome;

/// Which playback started the run whose completion is being reported.
/// Routes `PlayerDone` to the right consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackToken {
    /// Wake acknowledgement chime. Completion is ignored.
    Wakeup,
    /// TTS response for the current voice run.
    Tts,
    /// One item of an announcement playlist.
    Announce,
    /// One pass of the timer-finished ringing loop.
    TimerRing,
    /// One item of a media-player playlist.
    Media,
}

/// Events posted back to the core task.
#[derive(Debug)]
pub enum CoreEvent {
    /// A microphone chunk (16-bit LE PCM, 16 kHz mono).
    MicChunk(Vec<u8>),
    /// The wake-word engine matched a model.
    Wake { id: String, phrase: String },
    /// A `play()` run terminated.
    PlayerDone {
        token: PlaybackToken,
        outcome: PlaybackOutcome,
    },
    /// The inter-ring pause of the timer loop elapsed.
    TimerRingRepeat,
}

pub type EventSender = mpsc::UnboundedSender<CoreEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoreEvent>;

/// Create the core event channel.
pub fn core_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
