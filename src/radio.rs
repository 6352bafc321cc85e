//! The radio loop: queued narratives into the player, each repeated
//! `repeat` times, until stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::RadioConfig;
use crate::error::Result;
use crate::history::HistoryManager;
use crate::narrative::generator::{NarrativeSource, RandomNarrativeGenerator};
use crate::narrative::keys::parse_key_list;
use crate::pipeline::{SampleCache, SampleManifest};
use crate::player::{Mixer, PlayMetadata, PlaybackGate, Player, Replayer};
use crate::queue::{KeyRotation, NarrativeQueue};

const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Stops a running radio after the narrative in progress.
#[derive(Debug, Clone)]
pub struct RadioHandle {
    running: Arc<AtomicBool>,
}

impl RadioHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct Radio {
    config: RadioConfig,
    samples: Arc<SampleCache>,
    queue: NarrativeQueue,
    player: Arc<Player>,
    running: Arc<AtomicBool>,
    cycle_len: usize,
    played: u64,
}

impl Radio {
    /// Load the sample manifest and build a radio around the reference
    /// generator.
    pub fn from_config(config: RadioConfig, mixer: Box<dyn Mixer>) -> Result<Self> {
        config.validate()?;
        let manifest = SampleManifest::load(&config.sample_manifest)?;
        let samples = Arc::new(SampleCache::new(manifest).with_sample_rate(config.sample_rate));
        let source: Box<dyn NarrativeSource> = match config.seed {
            Some(seed) => Box::new(RandomNarrativeGenerator::seeded(seed, config.generator_options())),
            None => Box::new(RandomNarrativeGenerator::new(config.generator_options())),
        };
        Self::new(config, samples, mixer, source)
    }

    pub fn new(
        config: RadioConfig,
        samples: Arc<SampleCache>,
        mixer: Box<dyn Mixer>,
        source: Box<dyn NarrativeSource>,
    ) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let keys = parse_key_list(&config.keys, &mut rng);
        let rotation = KeyRotation::new(keys, config.narratives_per_key)?;
        let cycle_len = rotation.keys().len() * config.narratives_per_key * config.repeat;
        log::info!(
            "Radio keys: {}",
            rotation.keys().iter().map(|k| k.name).collect::<Vec<_>>().join(", ")
        );

        let queue = NarrativeQueue::new(source, rotation, config.queue_settings());
        let gate = Arc::new(PlaybackGate::with_poll(config.timing.pause_poll()));
        let player = Player::with_gate(
            config.bpm,
            Arc::clone(&samples),
            mixer,
            HistoryManager::new(&config.history_path),
            gate,
        );

        Ok(Radio {
            config,
            samples,
            queue,
            player: Arc::new(player),
            running: Arc::new(AtomicBool::new(false)),
            cycle_len,
            played: 0,
        })
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// The primary player, for pause/like/dislike from other threads.
    pub fn player(&self) -> Arc<Player> {
        Arc::clone(&self.player)
    }

    pub fn handle(&self) -> RadioHandle {
        RadioHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn queue(&self) -> &NarrativeQueue {
        &self.queue
    }

    /// A replayer on its own output that pauses this radio's player. Its
    /// plays go into the radio's history.
    pub fn replayer(&self, mixer: Box<dyn Mixer>) -> Replayer {
        let player = Player::new(
            self.config.bpm,
            Arc::clone(&self.samples),
            mixer,
            HistoryManager::new(&self.config.history_path),
        )
        .with_history(self.player.history());
        Replayer::new(player, self.player.gate()).with_grace(self.config.timing.replay_grace())
    }

    /// Narratives played so far, counting repeats.
    pub fn played(&self) -> u64 {
        self.played
    }

    /// Play the next queued narrative `repeat` times. Returns false when the
    /// queue had nothing ready.
    pub fn play_next(&mut self) -> bool {
        let Some(item) = self.queue.try_get_next() else {
            return false;
        };
        let metadata = PlayMetadata::with_key(item.musical_key.name);
        for _ in 0..self.config.repeat {
            if let Err(e) = self.player.play_narrative(&item.narrative, &metadata) {
                log::error!("Skipping {}: {e}", item.signature_key);
                break;
            }
            self.played += 1;
            log::info!("[{}/{}] played", self.played, self.cycle_len);
        }
        true
    }

    /// Run until stopped through a `RadioHandle` or until `max_narratives`
    /// queued narratives have played. History is saved on the way out.
    pub fn run(&mut self, max_narratives: Option<u64>) -> Result<PathBuf> {
        self.samples.bank();
        self.running.store(true, Ordering::SeqCst);
        self.queue.start()?;

        let mut narratives = 0;
        while self.running.load(Ordering::SeqCst) {
            if max_narratives.is_some_and(|limit| narratives >= limit) {
                break;
            }
            if self.play_next() {
                narratives += 1;
            } else {
                self.wait_for_queue();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.queue.stop();
        self.player.save_history(None)
    }

    fn wait_for_queue(&self) {
        let deadline = Instant::now() + self.config.timing.empty_queue_wait();
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::dsp::AudioBuffer;
    use crate::error::RadioError;
    use crate::narrative::keys::MusicalKey;
    use crate::narrative::{Bar, Hit, Narrative};
    use crate::pipeline::{ProcessedSample, SampleCategory};
    use crate::player::MemoryMixer;
    use std::collections::HashMap;

    struct OneBarSource;

    impl NarrativeSource for OneBarSource {
        fn generate(&mut self, key: &MusicalKey, bars: usize) -> Result<Narrative> {
            let bars = (0..bars)
                .map(|_| Bar::new(vec![Hit::new(key.chords[0], 0.0)], vec![]))
                .collect();
            Ok(Narrative::new(bars)?)
        }
    }

    fn samples() -> Arc<SampleCache> {
        let bank: HashMap<String, ProcessedSample> = ["C_maj_chord", "G_maj_chord"]
            .iter()
            .map(|id| {
                let sample = ProcessedSample {
                    category: SampleCategory::Chord,
                    buffer: Arc::new(AudioBuffer::mono(44100, vec![0; 8])),
                };
                (id.to_string(), sample)
            })
            .collect();
        Arc::new(SampleCache::preloaded(bank))
    }

    fn config(dir: &std::path::Path) -> RadioConfig {
        RadioConfig {
            bpm: 6000.0,
            bars: 1,
            repeat: 2,
            keys: "C,G".to_string(),
            history_path: dir.join("history.json"),
            timing: TimingConfig {
                producer_backoff_ms: 10,
                pause_poll_ms: 5,
                replay_grace_ms: 5,
                empty_queue_wait_ms: 5,
            },
            ..RadioConfig::default()
        }
    }

    #[test]
    fn plays_queued_narratives_with_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = MemoryMixer::new();
        let mut radio = Radio::new(config(dir.path()), samples(), Box::new(mixer.clone()), Box::new(OneBarSource)).unwrap();

        let path = radio.run(Some(2)).unwrap();
        assert_eq!(radio.played(), 4);
        assert_eq!(
            mixer.played(),
            vec!["C_maj_chord", "C_maj_chord", "G_maj_chord", "G_maj_chord"]
        );

        let stored = HistoryManager::load(&path).unwrap();
        assert_eq!(stored["C_maj_chord@0.0:"].played, 2);
        assert_eq!(stored["C_maj_chord@0.0:"].key.as_deref(), Some("CMajor"));
        assert_eq!(stored["G_maj_chord@0.0:"].played, 2);
    }

    #[test]
    fn handle_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut radio = Radio::new(
            config(dir.path()),
            samples(),
            Box::new(MemoryMixer::new()),
            Box::new(OneBarSource),
        )
        .unwrap();
        let handle = radio.handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.stop();
        });
        radio.run(None).unwrap();
        stopper.join().unwrap();
        assert!(!radio.handle().is_running());
        assert!(!radio.queue().is_running());
    }

    #[test]
    fn replayer_pauses_the_radio_player() {
        let dir = tempfile::tempdir().unwrap();
        let radio = Radio::new(
            config(dir.path()),
            samples(),
            Box::new(MemoryMixer::new()),
            Box::new(OneBarSource),
        )
        .unwrap();
        let replay_mixer = MemoryMixer::new();
        let replayer = radio.replayer(Box::new(replay_mixer.clone()));
        // Primary is idle, so the handshake completes at once
        replayer.replay("G_maj_chord@0.0:", Some("GMajor")).unwrap();
        assert_eq!(replay_mixer.played(), vec!["G_maj_chord"]);
        assert!(!radio.player().gate().is_pause_requested());

        let path = radio.player().save_history(None).unwrap();
        let stored = HistoryManager::load(&path).unwrap();
        assert_eq!(stored["G_maj_chord@0.0:"].played, 1);
        assert_eq!(stored["G_maj_chord@0.0:"].key.as_deref(), Some("GMajor"));
    }

    #[test]
    fn unknown_keys_only_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RadioConfig {
            keys: "H,X".to_string(),
            ..config(dir.path())
        };
        let result = Radio::new(config, samples(), Box::new(MemoryMixer::new()), Box::new(OneBarSource));
        assert!(matches!(result, Err(RadioError::Config(_))));
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = RadioConfig {
            sample_manifest: dir.path().join("nope.json"),
            ..config(dir.path())
        };
        assert!(matches!(
            Radio::from_config(config, Box::new(MemoryMixer::new())),
            Err(RadioError::Manifest { .. })
        ));
    }
}
