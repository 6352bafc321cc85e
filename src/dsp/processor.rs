//! The processor contract shared by filters, dynamics and edits.

use std::panic::{self, AssertUnwindSafe};

use super::buffer::AudioBuffer;
use crate::error::DspError;

/// An offline audio processor.
///
/// A processor owns its per-channel state; `process` takes `&mut self`, so a
/// single instance can never be driven from two threads at once.
pub trait Processor: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Process a whole buffer, returning a new one.
    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError>;

    /// Clear filter history and envelopes.
    fn reset(&mut self) {}
}

/// Outcome of a fail-open processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// The stage ran and produced this buffer.
    Applied(AudioBuffer),
    /// The stage failed; the buffer is the unmodified input.
    Fallback { buffer: AudioBuffer, reason: String },
}

impl Processed {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Processed::Fallback { .. })
    }

    pub fn buffer(&self) -> &AudioBuffer {
        match self {
            Processed::Applied(b) => b,
            Processed::Fallback { buffer, .. } => buffer,
        }
    }

    /// Take the buffer, accepting the pass-through on failure.
    pub fn into_buffer(self) -> AudioBuffer {
        match self {
            Processed::Applied(b) => b,
            Processed::Fallback { buffer, .. } => buffer,
        }
    }
}

/// Run a processor, falling back to the original input on any error or panic.
pub fn run_fail_open(processor: &mut dyn Processor, input: &AudioBuffer) -> Processed {
    let name = processor.name();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(input)));
    let reason = match outcome {
        Ok(Ok(buffer)) => return Processed::Applied(buffer),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => {
            // state may be half-updated after a panic
            processor.reset();
            panic_message(payload.as_ref())
        }
    };
    log::error!("{name} failed, passing input through unmodified: {reason}");
    Processed::Fallback {
        buffer: input.clone(),
        reason,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

/// Apply `f` to every channel of `input` in sample units and rebuild a
/// clipped buffer. `f` receives the channel index for state lookup.
pub fn process_planar<F>(input: &AudioBuffer, mut f: F) -> Result<AudioBuffer, DspError>
where
    F: FnMut(usize, &[f64]) -> Result<Vec<f64>, DspError>,
{
    let planar = input.to_planar();
    let mut out = Vec::with_capacity(planar.len());
    for (channel, samples) in planar.iter().enumerate() {
        out.push(f(channel, samples)?);
    }
    AudioBuffer::from_planar(input.sample_rate(), &out)
}

/// An ordered chain of processors, each stage run fail-open.
#[derive(Default)]
pub struct EffectChain {
    stages: Vec<Box<dyn Processor>>,
}

impl EffectChain {
    pub fn new() -> Self {
        EffectChain { stages: Vec::new() }
    }

    pub fn with(mut self, stage: impl Processor + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn Processor>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order. A failed stage passes its input through and
    /// the chain continues.
    pub fn run(&mut self, input: &AudioBuffer) -> AudioBuffer {
        let mut current = input.clone();
        for stage in self.stages.iter_mut() {
            current = run_fail_open(stage.as_mut(), &current).into_buffer();
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Processor for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn process(&mut self, _input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
            Err(DspError::InvalidParameter("boom".to_string()))
        }
    }

    struct Panicking;

    impl Processor for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn process(&mut self, _input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
            panic!("index out of range");
        }
    }

    struct Doubler;

    impl Processor for Doubler {
        fn name(&self) -> &'static str {
            "doubler"
        }

        fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
            process_planar(input, |_, s| Ok(s.iter().map(|x| x * 2.0).collect()))
        }
    }

    fn buffer() -> AudioBuffer {
        AudioBuffer::mono(8000, vec![100, -200, 300])
    }

    #[test]
    fn error_falls_back_to_input() {
        let out = run_fail_open(&mut Failing, &buffer());
        assert!(out.is_fallback());
        assert_eq!(out.into_buffer(), buffer());
    }

    #[test]
    fn panic_falls_back_to_input() {
        let out = run_fail_open(&mut Panicking, &buffer());
        match out {
            Processed::Fallback { buffer: b, reason } => {
                assert_eq!(b, buffer());
                assert!(reason.contains("index out of range"), "reason: {reason}");
            }
            Processed::Applied(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn chain_continues_after_failed_stage() {
        let mut chain = EffectChain::new().with(Doubler).with(Failing).with(Doubler);
        assert_eq!(chain.names(), vec!["doubler", "failing", "doubler"]);
        let out = chain.run(&buffer());
        assert_eq!(out.samples(), &[400, -800, 1200]);
    }
}
