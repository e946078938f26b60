//! Audio playback via rodio.
//!
//! Each `play()` spawns a worker thread that owns its own output stream
//! and sink, decodes the media (downloading URLs to a temp file first),
//! and polls until the sink drains or the run is superseded. A generation
//! counter arbitrates overlapping runs: bumping it cancels the previous
//! worker, whose done callback still fires.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, warn};

use super::{AudioOutput, DoneCallback, PlaybackOutcome};

/// Poll interval while waiting for the sink to drain.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Rodio-backed player. Music and TTS each get their own instance.
pub struct RodioPlayer {
    label: &'static str,
    generation: Arc<AtomicU64>,
    sink: Arc<Mutex<Option<Arc<Sink>>>>,
    volume: Arc<AtomicU8>,
    paused: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
}

impl RodioPlayer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            generation: Arc::new(AtomicU64::new(0)),
            sink: Arc::new(Mutex::new(None)),
            volume: Arc::new(AtomicU8::new(100)),
            paused: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AudioOutput for RodioPlayer {
    fn play(&self, uri: &str, on_done: Option<DoneCallback>) {
        let my_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Cancel whatever is currently playing; its worker observes the
        // generation bump and fires its own callback.
        if let Some(old) = self.sink.lock().unwrap().take() {
            old.stop();
        }
        self.paused.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);

        let label = self.label;
        let uri = uri.to_string();
        let generation = Arc::clone(&self.generation);
        let sink_slot = Arc::clone(&self.sink);
        let volume = Arc::clone(&self.volume);
        let active = Arc::clone(&self.active);

        std::thread::spawn(move || {
            debug!(player = label, %uri, "playback start");
            let outcome = run_playback(&uri, my_gen, &generation, &sink_slot, &volume);
            if let Err(msg) = &outcome {
                warn!(player = label, %uri, "playback failed: {msg}");
            }

            // Only the still-current run may clear the shared state.
            {
                let mut slot = sink_slot.lock().unwrap();
                if generation.load(Ordering::SeqCst) == my_gen {
                    *slot = None;
                    active.store(false, Ordering::SeqCst);
                }
            }

            let result = match outcome {
                Ok(o) => o,
                Err(_) => PlaybackOutcome::Failed,
            };
            debug!(player = label, ?result, "playback done");
            if let Some(cb) = on_done {
                cb(result);
            }
        });
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.stop();
        }
        self.active.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn pause(&self) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.pause();
        }
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.play();
        }
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_volume(&self, volume: u8) {
        let clamped = volume.min(100);
        self.volume.store(clamped, Ordering::SeqCst);
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.set_volume(f32::from(clamped) / 100.0);
        }
    }

    fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.paused.load(Ordering::SeqCst)
    }
}

/// Decode and drain one media item. Runs on the worker thread.
fn run_playback(
    uri: &str,
    my_gen: u64,
    generation: &AtomicU64,
    sink_slot: &Mutex<Option<Arc<Sink>>>,
    volume: &AtomicU8,
) -> Result<PlaybackOutcome, String> {
    // Resolve the media first so a bad URI fails without touching the
    // output device.
    let (file, _tmp) = resolve_source(uri)?;

    let (_stream, handle) =
        OutputStream::try_default().map_err(|e| format!("no audio output: {e}"))?;
    let sink = Sink::try_new(&handle).map_err(|e| format!("failed to create sink: {e}"))?;
    let sink = Arc::new(sink);
    sink.set_volume(f32::from(volume.load(Ordering::SeqCst)) / 100.0);

    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| format!("decode error: {e}"))?;

    // Publish the sink for stop/pause/volume, unless a newer run already
    // took over while we were setting up.
    {
        let mut slot = sink_slot.lock().unwrap();
        if generation.load(Ordering::SeqCst) != my_gen {
            return Ok(PlaybackOutcome::Stopped);
        }
        *slot = Some(Arc::clone(&sink));
    }

    sink.append(decoder);

    loop {
        if generation.load(Ordering::SeqCst) != my_gen {
            return Ok(PlaybackOutcome::Stopped);
        }
        if sink.empty() {
            return Ok(PlaybackOutcome::Finished);
        }
        std::thread::sleep(DRAIN_POLL);
    }
}

/// Open a local file, or download a URL into a temp file first.
/// The temp handle must outlive the decoder.
fn resolve_source(uri: &str) -> Result<(File, Option<tempfile::NamedTempFile>), String> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let mut resp = reqwest::blocking::get(uri)
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("download failed: {e}"))?;
        let mut tmp =
            tempfile::NamedTempFile::new().map_err(|e| format!("temp file failed: {e}"))?;
        std::io::copy(&mut resp, &mut tmp).map_err(|e| format!("download write failed: {e}"))?;
        let file = tmp.reopen().map_err(|e| format!("temp reopen failed: {e}"))?;
        Ok((file, Some(tmp)))
    } else {
        let file = File::open(uri).map_err(|e| format!("cannot open {uri}: {e}"))?;
        Ok((file, None))
    }
}
