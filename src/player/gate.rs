//! Pause handshake between the primary player and a replayer.
//!
//! The primary checks the gate at every bar boundary. A replayer first claims
//! the gate (one replay at a time), requests a pause and waits for the
//! primary to acknowledge by reporting not-playing. Every wait sleeps on the
//! condition variable in `poll` slices so progress is logged and a timeout
//! can bound it.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{RadioError, Result};

/// Interval between progress checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct GateState {
    pause_requested: bool,
    playing: bool,
    replay_active: bool,
}

#[derive(Debug)]
pub struct PlaybackGate {
    state: Mutex<GateState>,
    changed: Condvar,
    poll: Duration,
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self::with_poll(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll(poll: Duration) -> Self {
        PlaybackGate {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll
    }

    // ── Primary side ────────────────────────────────────────

    pub fn set_playing(&self, playing: bool) {
        self.state.lock().playing = playing;
        self.changed.notify_all();
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn request_pause(&self) {
        self.state.lock().pause_requested = true;
        self.changed.notify_all();
    }

    pub fn release_pause(&self) {
        self.state.lock().pause_requested = false;
        self.changed.notify_all();
    }

    pub fn is_pause_requested(&self) -> bool {
        self.state.lock().pause_requested
    }

    /// Bar-boundary check. When a pause is requested, report not-playing,
    /// block until it is released, then report playing again. Returns how
    /// long playback was held.
    pub fn wait_if_paused(&self) -> Duration {
        let mut state = self.state.lock();
        if !state.pause_requested {
            return Duration::ZERO;
        }

        let started = Instant::now();
        state.playing = false;
        self.changed.notify_all();
        log::info!("Playback paused");

        self.wait_while(&mut state, "pause release", None, |s| s.pause_requested);

        state.playing = true;
        self.changed.notify_all();
        let held = started.elapsed();
        log::info!("Playback resumed after {held:?}");
        held
    }

    // ── Replayer side ───────────────────────────────────────

    /// Claim the gate for a replay, waiting for any replay in progress.
    pub fn acquire_replay(&self, timeout: Option<Duration>) -> Result<ReplayGuard<'_>> {
        let mut state = self.state.lock();
        if !self.wait_while(&mut state, "previous replay", timeout, |s| s.replay_active) {
            return Err(RadioError::HandshakeTimeout(timeout.unwrap_or_default()));
        }
        state.replay_active = true;
        Ok(ReplayGuard {
            gate: self,
            paused_before: state.pause_requested,
        })
    }

    pub fn is_replay_active(&self) -> bool {
        self.state.lock().replay_active
    }

    /// Wait while `blocked` holds. Returns false if `timeout` ran out first.
    fn wait_while(
        &self,
        state: &mut MutexGuard<'_, GateState>,
        what: &str,
        timeout: Option<Duration>,
        blocked: impl Fn(&GateState) -> bool,
    ) -> bool {
        let started = Instant::now();
        while blocked(&**state) {
            let waited = started.elapsed();
            let slice = match timeout {
                Some(limit) if waited >= limit => {
                    log::warn!("Gave up waiting for {what} after {waited:?}");
                    return false;
                }
                Some(limit) => self.poll.min(limit - waited),
                None => self.poll,
            };
            if self.changed.wait_for(state, slice).timed_out() && blocked(&**state) {
                log::debug!("Still waiting for {what} ({:?})", started.elapsed());
            }
        }
        true
    }
}

/// An active replay claim. Dropping it releases the claim and puts the
/// pause request back to what it was when the claim was taken.
#[derive(Debug)]
pub struct ReplayGuard<'a> {
    gate: &'a PlaybackGate,
    paused_before: bool,
}

impl ReplayGuard<'_> {
    /// Request a pause and wait until the primary reports not-playing.
    pub fn pause_primary(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.gate.state.lock();
        state.pause_requested = true;
        self.gate.changed.notify_all();
        if self.gate.wait_while(&mut state, "primary to pause", timeout, |s| s.playing) {
            Ok(())
        } else {
            Err(RadioError::HandshakeTimeout(timeout.unwrap_or_default()))
        }
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.pause_requested = self.paused_before;
        state.replay_active = false;
        drop(state);
        self.gate.changed.notify_all();
    }
}
