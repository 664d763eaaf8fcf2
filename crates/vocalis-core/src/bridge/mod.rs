//! Engines hosted by an out-of-process speech worker.
//!
//! The worker owns the acoustic models; this side only speaks the framed
//! protocol in [`protocol`] over a Unix socket.

mod daemon;
pub mod protocol;
mod stt;
mod tts;

pub use daemon::WorkerBridge;
pub use stt::{BridgeSttLoader, BridgeTranscriptionEngine};
pub use tts::{BridgeSynthesisEngine, BridgeTtsLoader};
