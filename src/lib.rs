//! Voice assistant satellite core.
//!
//! Makes a desktop workstation appear on the local network as an
//! ESPHome-native voice-capable device: a Home Assistant controller
//! discovers it over mDNS, connects over the ESPHome Native API on a
//! single TCP socket, streams wake-word-triggered microphone audio out
//! of it and plays synthesized speech, announcements, and timer chimes
//! back through it.

pub mod audio;
pub mod config;
pub mod entities;
pub mod events;
pub mod mdns;
pub mod protocol;
pub mod server;
pub mod state;
pub mod voice;
pub mod wake_word;
