//! DSP layer: filters, dynamics and edits applied once to raw samples.
//!
//! Every processor implements [`Processor`] and works offline on a whole
//! [`AudioBuffer`]. Chains run each stage fail-open so a broken effect never
//! silences a sample.

pub mod buffer;
pub mod compressor;
pub mod edit;
pub mod equalizer;
pub mod filter;
pub mod limiter;
pub mod multiband;
pub mod processor;

pub use buffer::AudioBuffer;
pub use processor::{EffectChain, Processed, Processor, run_fail_open};
