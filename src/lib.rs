pub mod config;
pub mod dsp;
pub mod error;
pub mod history;
pub mod narrative;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod radio;

pub use config::RadioConfig;
pub use error::{RadioError, Result};
pub use narrative::{Bar, Narrative};
pub use pipeline::{SampleCache, SampleManifest};
pub use player::{Mixer, Player, Replayer};
pub use queue::NarrativeQueue;
pub use radio::Radio;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `env_logger` backend with an `info` default, overridable
/// through `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn init_logging_twice_is_harmless() {
        init_logging();
        init_logging();
    }
}
