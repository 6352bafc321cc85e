//! Real-time playback of narratives onto logical mixer channels.
//!
//! A `Player` flattens a narrative into its event timeline and dispatches
//! every event at `origin + beat_time * beat_duration`, always measured from
//! the fixed origin so sleep overshoot never accumulates. A pause is honoured
//! only at bar boundaries; the origin moves forward by the paused time so the
//! remaining bars keep their spacing.
//!
//! A `Replayer` is a second player that borrows the primary's `PlaybackGate`
//! to pause it for the duration of an ad-hoc replay.

pub mod gate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::dsp::AudioBuffer;
use crate::error::Result;
use crate::history::HistoryManager;
use crate::narrative::signature;
use crate::narrative::{BEATS_PER_BAR, Bar, Event, EventKind, Narrative, flatten};
use crate::pipeline::{SampleBank, SampleCache};

pub use gate::{PlaybackGate, ReplayGuard};

/// How long a replayer keeps the primary paused after its replay ends.
pub const DEFAULT_REPLAY_GRACE: Duration = Duration::from_millis(500);

// ── Output ──────────────────────────────────────────────────

/// Logical output slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlaybackChannel {
    Chords,
    Melody,
    Bass,
    Drums,
}

/// Audio output with one voice per channel.
pub trait Mixer: Send {
    /// Start `sample` on `channel`. Drums layer; other channels are stopped
    /// by the player before replacing their sound.
    fn play(&mut self, channel: PlaybackChannel, sample_id: &str, sample: &AudioBuffer);

    fn stop(&mut self, channel: PlaybackChannel);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerAction {
    Play(String),
    Stop,
}

/// One recorded mixer call.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub at: Instant,
    pub channel: PlaybackChannel,
    pub action: MixerAction,
}

/// Mixer that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryMixer {
    log: Arc<Mutex<Vec<Dispatch>>>,
}

impl MemoryMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.log.lock().clone()
    }

    /// Ids of started samples in order.
    pub fn played(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|d| match &d.action {
                MixerAction::Play(id) => Some(id.clone()),
                MixerAction::Stop => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, channel: PlaybackChannel, action: MixerAction) {
        self.log.lock().push(Dispatch {
            at: Instant::now(),
            channel,
            action,
        });
    }
}

impl Mixer for MemoryMixer {
    fn play(&mut self, channel: PlaybackChannel, sample_id: &str, _sample: &AudioBuffer) {
        self.record(channel, MixerAction::Play(sample_id.to_string()));
    }

    fn stop(&mut self, channel: PlaybackChannel) {
        self.record(channel, MixerAction::Stop);
    }
}

// ── Player ──────────────────────────────────────────────────

/// Extra information recorded with a play.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayMetadata {
    /// Musical key name.
    pub key: Option<String>,
}

impl PlayMetadata {
    pub fn with_key(key: impl Into<String>) -> Self {
        PlayMetadata { key: Some(key.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub signature_key: Option<String>,
    pub musical_key: Option<String>,
}

pub struct Player {
    bpm: f64,
    samples: Arc<SampleCache>,
    mixer: Mutex<Box<dyn Mixer>>,
    gate: Arc<PlaybackGate>,
    now_playing: Mutex<Option<NowPlaying>>,
    history: Arc<Mutex<HistoryManager>>,
}

impl Player {
    pub fn new(bpm: f64, samples: Arc<SampleCache>, mixer: Box<dyn Mixer>, history: HistoryManager) -> Self {
        Self::with_gate(bpm, samples, mixer, history, Arc::new(PlaybackGate::new()))
    }

    pub fn with_gate(
        bpm: f64,
        samples: Arc<SampleCache>,
        mixer: Box<dyn Mixer>,
        history: HistoryManager,
        gate: Arc<PlaybackGate>,
    ) -> Self {
        Player {
            bpm: if bpm > 0.0 { bpm } else { 124.0 },
            samples,
            mixer: Mutex::new(mixer),
            gate,
            now_playing: Mutex::new(None),
            history: Arc::new(Mutex::new(history)),
        }
    }

    /// Record plays into a history shared with another player.
    pub fn with_history(mut self, history: Arc<Mutex<HistoryManager>>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> Arc<Mutex<HistoryManager>> {
        Arc::clone(&self.history)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }

    /// The gate a replayer uses to pause this player.
    pub fn gate(&self) -> Arc<PlaybackGate> {
        Arc::clone(&self.gate)
    }

    pub fn is_playing(&self) -> bool {
        self.gate.is_playing()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.lock().clone()
    }

    /// Stop at the next bar boundary.
    pub fn pause(&self) {
        log::info!("Pause requested");
        self.gate.request_pause();
    }

    pub fn unpause(&self) {
        log::info!("Unpause requested");
        self.gate.release_pause();
    }

    pub fn like(&self, signature_key: &str) {
        self.history.lock().like(signature_key);
    }

    pub fn dislike(&self, signature_key: &str) {
        self.history.lock().dislike(signature_key);
    }

    pub fn add_tag(&self, signature_key: &str, tag: &str) {
        self.history.lock().add_tag(signature_key, tag);
    }

    /// Merge this session's history into `path`, or the default file.
    pub fn save_history(&self, path: Option<&Path>) -> Result<PathBuf> {
        self.history.lock().save(path)
    }

    pub fn play_narrative(&self, narrative: &Narrative, metadata: &PlayMetadata) -> Result<()> {
        self.play(narrative.bars(), Some(narrative.signature_key()), metadata)
    }

    /// Play bars to completion, blocking the calling thread. Bars with an
    /// offset outside the bar are rejected before anything plays.
    pub fn play(&self, bars: &[Bar], signature_key: Option<&str>, metadata: &PlayMetadata) -> Result<()> {
        for bar in bars {
            bar.validate()?;
        }
        log::info!(
            "Playing {} at {} BPM",
            signature_key.unwrap_or("<unsigned narrative>"),
            self.bpm
        );
        *self.now_playing.lock() = Some(NowPlaying {
            signature_key: signature_key.map(str::to_string),
            musical_key: metadata.key.clone(),
        });

        let bank = self.samples.bank();
        let beat = self.beat_duration();
        let mut events = flatten(bars).into_iter().peekable();
        let mut mixer = self.mixer.lock();

        self.gate.set_playing(true);
        let mut origin = Instant::now();
        for bar in 0..bars.len() {
            sleep_until(origin + beat.mul_f64(bar as f64 * BEATS_PER_BAR));
            let held = self.gate.wait_if_paused();
            if !held.is_zero() {
                origin += held;
                log::debug!("Resuming at bar {bar}");
            }

            while let Some(event) = events.next_if(|e| e.bar == bar) {
                sleep_until(origin + beat.mul_f64(event.time));
                dispatch(mixer.as_mut(), &bank, &event);
            }
        }
        sleep_until(origin + beat.mul_f64(bars.len() as f64 * BEATS_PER_BAR));
        drop(mixer);

        self.gate.set_playing(false);
        *self.now_playing.lock() = None;
        if let Some(signature_key) = signature_key {
            let mut history = self.history.lock();
            history.add(signature_key, metadata.key.as_deref());
            history.incr_played(signature_key);
        }
        Ok(())
    }
}

fn dispatch(mixer: &mut dyn Mixer, bank: &SampleBank, event: &Event) {
    let Some(sample) = bank.get(&event.sample_id) else {
        log::debug!("No sample named {}, skipping", event.sample_id);
        return;
    };
    let buffer = sample.buffer.as_ref();
    match event.kind {
        EventKind::Chord => {
            mixer.stop(PlaybackChannel::Melody);
            mixer.play(PlaybackChannel::Chords, &event.sample_id, buffer);
        }
        EventKind::Melody => {
            mixer.stop(PlaybackChannel::Melody);
            mixer.play(PlaybackChannel::Melody, &event.sample_id, buffer);
        }
        EventKind::Bass => {
            mixer.stop(PlaybackChannel::Bass);
            mixer.play(PlaybackChannel::Bass, &event.sample_id, buffer);
        }
        EventKind::Drum => mixer.play(PlaybackChannel::Drums, &event.sample_id, buffer),
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

// ── Replayer ────────────────────────────────────────────────

/// Plays a stored signature while the primary player is held paused.
pub struct Replayer {
    player: Player,
    primary: Arc<PlaybackGate>,
    grace: Duration,
    timeout: Option<Duration>,
}

impl Replayer {
    pub fn new(player: Player, primary: Arc<PlaybackGate>) -> Self {
        Replayer {
            player,
            primary,
            grace: DEFAULT_REPLAY_GRACE,
            timeout: None,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Bound every handshake wait.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    /// Decode `signature_key` (compact or JSON), pause the primary, play it,
    /// then release the primary after the grace period. A pause that was
    /// already requested on the primary stays requested afterwards.
    pub fn replay(&self, signature_key: &str, musical_key: Option<&str>) -> Result<()> {
        let bars = signature::decode_any(signature_key);
        if bars.is_empty() {
            log::warn!("Nothing to replay for {signature_key}");
            return Ok(());
        }

        let claim = self.primary.acquire_replay(self.timeout)?;
        claim.pause_primary(self.timeout)?;
        log::info!("Primary paused, replaying {signature_key}");

        let metadata = PlayMetadata {
            key: musical_key.map(str::to_string),
        };
        self.player.play(&bars, Some(signature_key), &metadata)?;

        thread::sleep(self.grace);
        drop(claim);
        log::info!("Replay finished, primary released");
        Ok(())
    }
}
