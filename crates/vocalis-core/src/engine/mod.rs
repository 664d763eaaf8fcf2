//! Contracts for the external inference engines.
//!
//! Engines are opaque: a synthesis engine turns text into a lazy sequence of
//! sample buffers, a transcription engine turns audio bytes into a lazy
//! sequence of timed segments. Both sequences are pulled with blocking calls,
//! so callers drive them from the blocking pool.

mod synthesis;
mod transcription;

pub use synthesis::{EngineSequence, SampleStream, SynthesisEngine, SynthesisStep};
pub use transcription::{
    Segment, SegmentStream, TranscribeOptions, TranscriptionEngine, TranscriptionInfo,
};
