//! Bounded narrative queue fed by a background producer thread.
//!
//! The producer composes narratives ahead of playback and offers them with
//! `try_send`. A full queue hands the item back; the producer sleeps the
//! backoff and offers the same item again, so nothing is dropped and no lock
//! is held while waiting. The consumer polls with `try_get_next`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::error::{RadioError, Result};
use crate::narrative::Narrative;
use crate::narrative::generator::NarrativeSource;
use crate::narrative::keys::MusicalKey;

/// Producer sleep when the queue is full or generation failed.
pub const DEFAULT_PRODUCER_BACKOFF: Duration = Duration::from_secs(30);

/// Longest single sleep before the stop flag is checked again.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// A composed narrative waiting to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub narrative: Narrative,
    pub signature_key: String,
    pub musical_key: MusicalKey,
}

// ── Key rotation ────────────────────────────────────────────

/// Cycles through keys, staying on each for `per_key` narratives.
#[derive(Debug, Clone)]
pub struct KeyRotation {
    keys: Vec<MusicalKey>,
    per_key: usize,
    index: usize,
    produced_in_key: usize,
}

impl KeyRotation {
    pub fn new(keys: Vec<MusicalKey>, per_key: usize) -> Result<Self> {
        if keys.is_empty() {
            return Err(RadioError::Config("no playable keys configured".to_string()));
        }
        Ok(KeyRotation {
            keys,
            per_key: per_key.max(1),
            index: 0,
            produced_in_key: 0,
        })
    }

    /// Key for the next narrative.
    pub fn current(&self) -> MusicalKey {
        self.keys[self.index]
    }

    /// Record one narrative in the current key, moving on when its quota is met.
    pub fn advance(&mut self) {
        self.produced_in_key += 1;
        if self.produced_in_key >= self.per_key {
            self.produced_in_key = 0;
            self.index = (self.index + 1) % self.keys.len();
        }
    }

    pub fn keys(&self) -> &[MusicalKey] {
        &self.keys
    }
}

// ── Queue ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueSettings {
    pub capacity: usize,
    /// Bars per narrative.
    pub bars: usize,
    pub backoff: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            capacity: 10,
            bars: 8,
            backoff: DEFAULT_PRODUCER_BACKOFF,
        }
    }
}

/// Producer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Narratives accepted by the queue.
    pub produced: u64,
    /// Offers refused because the queue was full.
    pub deferred: u64,
    /// Generation failures.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    deferred: AtomicU64,
    failures: AtomicU64,
}

pub struct NarrativeQueue {
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
    pending: Option<(Box<dyn NarrativeSource>, KeyRotation)>,
    settings: QueueSettings,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    producer: Option<JoinHandle<()>>,
}

impl NarrativeQueue {
    pub fn new(source: Box<dyn NarrativeSource>, rotation: KeyRotation, settings: QueueSettings) -> Self {
        let (sender, receiver) = bounded(settings.capacity.max(1));
        NarrativeQueue {
            sender,
            receiver,
            pending: Some((source, rotation)),
            settings,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            producer: None,
        }
    }

    /// Spawn the producer thread. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<()> {
        let Some((mut source, mut rotation)) = self.pending.take() else {
            log::warn!("Producer already started");
            return Ok(());
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let sender = self.sender.clone();
        let settings = self.settings;

        let handle = thread::Builder::new()
            .name("narrative-producer".into())
            .spawn(move || {
                log::info!("Starting producer thread");
                produce(source.as_mut(), &mut rotation, &sender, settings, &running, &counters);
                log::info!("Producer thread exiting");
            });
        match handle {
            Ok(handle) => {
                self.producer = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Ask the producer to finish and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                log::error!("Producer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Next narrative, if one is ready.
    pub fn try_get_next(&self) -> Option<QueueItem> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(_) => {
                log::debug!("Narrative queue is empty");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity.max(1)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            produced: self.counters.produced.load(Ordering::Relaxed),
            deferred: self.counters.deferred.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for NarrativeQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(
    source: &mut dyn NarrativeSource,
    rotation: &mut KeyRotation,
    sender: &Sender<QueueItem>,
    settings: QueueSettings,
    running: &AtomicBool,
    counters: &Counters,
) {
    while running.load(Ordering::SeqCst) {
        let key = rotation.current();
        log::debug!("Producing narrative in {key}");
        let narrative = match source.generate(&key, settings.bars) {
            Ok(narrative) => narrative,
            Err(e) => {
                log::error!("Narrative generation failed in {key}: {e}");
                counters.failures.fetch_add(1, Ordering::Relaxed);
                sleep_while_running(settings.backoff, running);
                continue;
            }
        };
        rotation.advance();

        let mut item = QueueItem {
            signature_key: narrative.signature_key().to_string(),
            narrative,
            musical_key: key,
        };
        loop {
            match sender.try_send(item) {
                Ok(()) => {
                    counters.produced.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(TrySendError::Full(refused)) => {
                    counters.deferred.fetch_add(1, Ordering::Relaxed);
                    log::info!("Queue is full, waiting for the consumer to catch up");
                    item = refused;
                    if !sleep_while_running(settings.backoff, running) {
                        return;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Sleep in short slices; returns whether the producer should keep going.
fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{Bar, Hit};
    use std::sync::atomic::AtomicUsize;

    struct FakeSource {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    impl NarrativeSource for FakeSource {
        fn generate(&mut self, key: &MusicalKey, bars: usize) -> Result<Narrative> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(RadioError::Generation("boom".to_string()));
            }
            let bars = (0..bars)
                .map(|_| Bar::new(vec![Hit::new(key.chords[0], 0.0)], vec![]))
                .collect();
            Ok(Narrative::new(bars)?)
        }
    }

    fn key(notation: &str) -> MusicalKey {
        MusicalKey::from_notation(notation).unwrap()
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn queue(capacity: usize, backoff_ms: u64, fail_first: usize) -> NarrativeQueue {
        let source = FakeSource {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first,
        };
        let rotation = KeyRotation::new(vec![key("C"), key("G")], 1).unwrap();
        NarrativeQueue::new(
            Box::new(source),
            rotation,
            QueueSettings {
                capacity,
                bars: 2,
                backoff: Duration::from_millis(backoff_ms),
            },
        )
    }

    #[test]
    fn rotation_stays_on_a_key_for_its_quota() {
        let mut rotation = KeyRotation::new(vec![key("C"), key("G"), key("E")], 2).unwrap();
        let mut names = Vec::new();
        for _ in 0..7 {
            names.push(rotation.current().name);
            rotation.advance();
        }
        assert_eq!(
            names,
            vec!["CMajor", "CMajor", "GMajor", "GMajor", "EMajor", "EMajor", "CMajor"]
        );
    }

    #[test]
    fn rotation_with_repeated_keys_follows_list_order() {
        let keys = ["C", "G", "E", "G"].map(key).to_vec();
        let mut rotation = KeyRotation::new(keys, 1).unwrap();
        let mut names = Vec::new();
        for _ in 0..5 {
            names.push(rotation.current().name);
            rotation.advance();
        }
        assert_eq!(names, vec!["CMajor", "GMajor", "EMajor", "GMajor", "CMajor"]);
    }

    #[test]
    fn rotation_needs_keys() {
        assert!(matches!(KeyRotation::new(vec![], 1), Err(RadioError::Config(_))));
    }

    #[test]
    fn full_queue_defers_until_drained() {
        let mut q = queue(2, 20, 0);
        q.start().unwrap();

        assert!(wait_until(Duration::from_secs(2), || q.stats().deferred >= 1));
        assert_eq!(q.len(), 2);
        assert_eq!(q.stats().produced, 2);

        let first = q.try_get_next().unwrap();
        assert_eq!(first.musical_key.name, "CMajor");
        assert_eq!(first.signature_key, first.narrative.signature_key());
        assert_eq!(first.narrative.bar_count(), 2);

        assert!(wait_until(Duration::from_secs(2), || q.stats().produced == 3));
        assert_eq!(q.len(), 2);
        let second = q.try_get_next().unwrap();
        assert_eq!(second.musical_key.name, "GMajor");
        q.stop();
    }

    #[test]
    fn generation_failures_back_off_and_continue() {
        let mut q = queue(1, 10, 2);
        q.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || q.stats().produced == 1));
        assert_eq!(q.stats().failures, 2);
        assert!(q.try_get_next().is_some());
        q.stop();
    }

    #[test]
    fn stop_interrupts_a_long_backoff() {
        let mut q = queue(1, 60_000, 0);
        q.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || q.stats().deferred >= 1));

        let started = Instant::now();
        q.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!q.is_running());
    }

    #[test]
    fn empty_queue_returns_none() {
        let q = queue(3, 10, 0);
        assert!(q.try_get_next().is_none());
        assert!(q.is_empty());
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    fn start_twice_is_harmless() {
        let mut q = queue(1, 10, 0);
        q.start().unwrap();
        q.start().unwrap();
        q.stop();
    }
}
