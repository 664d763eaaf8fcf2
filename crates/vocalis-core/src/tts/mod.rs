//! Text-to-speech: request validation, bulk synthesis and streamed delivery.

mod request;
mod session;
mod synthesizer;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use request::{Delivery, SpeechJob, SpeechRequest, MAX_SPEED, MIN_SPEED};
pub use session::{SpeechStream, StreamAborted};
pub use synthesizer::SpeechSynthesizer;
pub use transport::{
    audio_delta_event, audio_done_event, error_event, SessionPhase, StreamFormat, Usage,
    SSE_CONTENT_TYPE,
};
