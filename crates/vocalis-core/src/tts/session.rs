//! One streaming synthesis-and-delivery session.
//!
//! The session runs on its own task. Every engine pull and every encode runs
//! on the blocking pool, and finished units are pushed into an unbounded
//! channel without waiting for the peer. Disconnect is detected by polling
//! between pulls: a dropped [`SpeechStream`] cancels the session token and
//! closes the channel. Each pull is bounded by the engine pull timeout, so
//! the time from disconnect to the last engine call is at most one pull.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::transport::{error_event, Framer, SessionPhase, StreamFormat, SSE_CONTENT_TYPE};
use crate::audio::AudioEncoder;
use crate::engine::{EngineSequence, SampleStream, SynthesisEngine};
use crate::error::{Error, Result};

/// The stream ended because of a server-side failure, not because it completed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("speech stream aborted: {0}")]
pub struct StreamAborted(pub String);

type Unit = std::result::Result<Bytes, StreamAborted>;

/// Wire units of one session, in engine order.
///
/// Dropping the stream signals a disconnect to the session.
pub struct SpeechStream {
    rx: mpsc::UnboundedReceiver<Unit>,
    cancel: CancellationToken,
    content_type: &'static str,
}

impl SpeechStream {
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for SpeechStream {
    type Item = Unit;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Unit>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for SpeechStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) struct Session {
    pub(crate) engine: Arc<dyn SynthesisEngine>,
    pub(crate) text: String,
    pub(crate) voice: String,
    pub(crate) speed: f32,
    pub(crate) encoder: AudioEncoder,
    pub(crate) mode: StreamFormat,
    pub(crate) pull_timeout: Duration,
}

impl Session {
    /// Spawn the session. Returns before the engine produces anything.
    pub(crate) fn start(self, cancel: CancellationToken) -> SpeechStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let content_type = match self.mode {
            StreamFormat::Audio => self.encoder.content_type(),
            StreamFormat::Sse => SSE_CONTENT_TYPE,
        };

        let mut outlet = Outlet {
            tx,
            cancel: cancel.clone(),
            mode: self.mode,
            chunks: 0,
            sent: false,
            phase: SessionPhase::HeaderPending,
        };
        tokio::spawn(async move {
            self.drive(&mut outlet).await;
            info!(
                "{} Session cleanup ({:?}), sent {} chunks",
                outlet.mode.log_prefix(),
                outlet.phase,
                outlet.chunks
            );
        });

        SpeechStream {
            rx,
            cancel,
            content_type,
        }
    }

    async fn drive(self, outlet: &mut Outlet) {
        let Session {
            engine,
            text,
            voice,
            speed,
            encoder,
            mode,
            pull_timeout,
        } = self;
        let prefix = mode.log_prefix();

        info!(
            "{} Starting {} stream: text_length={}, voice='{}'",
            prefix,
            encoder.format(),
            text.chars().count(),
            voice
        );

        let (mut framer, eager) = Framer::new(mode, encoder.create_header());
        if let Some(header) = eager {
            info!(
                "{} Sending {} header ({} bytes)",
                prefix,
                encoder.format(),
                header.len()
            );
            if !outlet.emit(header) {
                info!("{} Client disconnected before header", prefix);
                outlet.phase = SessionPhase::Done;
                return;
            }
        }

        let run_text = text.clone();
        let started = on_blocking_pool(pull_timeout, move || {
            engine.run(&run_text, &voice, speed)
        })
        .await;
        let stream: Box<dyn SampleStream> = match started {
            Ok(stream) => stream,
            Err(e) => {
                outlet.fail(e);
                return;
            }
        };
        outlet.phase = SessionPhase::Streaming;

        let mut pipeline = Pipeline {
            sequence: EngineSequence::new(stream),
            encoder,
        };

        loop {
            if outlet.disconnected() {
                info!("{} Client disconnected, stopping generation", prefix);
                pipeline.abandon().await;
                outlet.phase = SessionPhase::Done;
                return;
            }

            let token = outlet.cancel.clone();
            let pulled = on_blocking_pool(pull_timeout, move || {
                let step = pipeline.pull(&token);
                step.map(|pulled| (pipeline, pulled))
            })
            .await;

            let pulled = match pulled {
                Ok((returned, pulled)) => {
                    pipeline = returned;
                    pulled
                }
                Err(e) => {
                    outlet.fail(e);
                    return;
                }
            };

            match pulled {
                Pulled::Exhausted => break,
                Pulled::Cancelled => {
                    info!("{} Client disconnected, stopping generation", prefix);
                    pipeline.abandon().await;
                    outlet.phase = SessionPhase::Done;
                    return;
                }
                Pulled::Silent => {
                    debug!("{} Engine produced no audio for this span, skipping", prefix);
                }
                Pulled::Encoded(bytes) => {
                    let Some(frame) = framer.payload(bytes) else {
                        continue;
                    };
                    if !outlet.emit_chunk(frame, prefix) {
                        info!("{} Client disconnected, stopping generation", prefix);
                        pipeline.abandon().await;
                        outlet.phase = SessionPhase::Done;
                        return;
                    }
                }
            }
        }

        debug!("{} Engine sequence exhausted, finalizing", prefix);
        outlet.phase = SessionPhase::Finalizing;
        let tail = on_blocking_pool(pull_timeout, move || pipeline.finish()).await;
        match tail {
            Ok(Some(bytes)) => {
                if let Some(frame) = framer.payload(bytes) {
                    outlet.emit(frame);
                }
            }
            Ok(None) => {}
            Err(e) => {
                outlet.fail(e);
                return;
            }
        }

        if let Some(done) = framer.done(&text) {
            info!(
                "{} Sending done event, total_chunks={}",
                prefix, outlet.chunks
            );
            outlet.emit(done);
        }
        outlet.phase = SessionPhase::Done;
    }
}

enum Pulled {
    Encoded(Vec<u8>),
    Silent,
    Exhausted,
    Cancelled,
}

/// Engine sequence and encoder of one session. Moves into each blocking step.
struct Pipeline {
    sequence: EngineSequence,
    encoder: AudioEncoder,
}

impl Pipeline {
    fn pull(&mut self, cancel: &CancellationToken) -> Result<Pulled> {
        let Some(step) = self.sequence.pull()? else {
            return Ok(Pulled::Exhausted);
        };
        if cancel.is_cancelled() {
            return Ok(Pulled::Cancelled);
        }
        match step.into_samples() {
            Some(samples) => Ok(Pulled::Encoded(self.encoder.encode_chunk(&samples)?)),
            None => Ok(Pulled::Silent),
        }
    }

    fn finish(mut self) -> Result<Option<Vec<u8>>> {
        self.sequence.release();
        self.encoder.finalize()
    }

    /// Release the engine and close the encoder, discarding trailing bytes.
    async fn abandon(self) {
        if let Err(e) = tokio::task::spawn_blocking(move || self.finish()).await {
            debug!("Cleanup task failed: {}", e);
        }
    }
}

/// Run `work` on the blocking pool, bounded by `timeout`.
///
/// On timeout the work keeps running detached; whatever it owns is dropped
/// when it returns.
async fn on_blocking_pool<T, F>(timeout: Duration, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Err(_) => Err(Error::Timeout(format!(
            "Synthesis engine did not respond within {}s",
            timeout.as_secs_f32()
        ))),
        Ok(Err(join)) => Err(Error::Synthesis(format!("Engine task failed: {}", join))),
        Ok(Ok(result)) => result.map_err(Error::into_synthesis),
    }
}

struct Outlet {
    tx: mpsc::UnboundedSender<Unit>,
    cancel: CancellationToken,
    mode: StreamFormat,
    chunks: usize,
    sent: bool,
    phase: SessionPhase,
}

impl Outlet {
    fn disconnected(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Queue a unit unless the peer is gone.
    fn emit(&mut self, unit: Bytes) -> bool {
        if self.disconnected() {
            return false;
        }
        self.sent = true;
        self.tx.send(Ok(unit)).is_ok()
    }

    fn emit_chunk(&mut self, unit: Bytes, prefix: &str) -> bool {
        self.chunks += 1;
        info!(
            "{} Sending chunk #{}, size={} bytes",
            prefix,
            self.chunks,
            unit.len()
        );
        self.emit(unit)
    }

    /// Best-effort error indication, then the stream ends.
    fn fail(&mut self, err: Error) {
        self.phase = SessionPhase::Errored;
        error!(
            "{} Streaming synthesis failed: {}",
            self.mode.log_prefix(),
            err
        );
        if self.disconnected() {
            return;
        }
        match self.mode {
            StreamFormat::Sse if !self.sent => {
                let _ = self.tx.send(Ok(error_event(&err.to_string())));
            }
            StreamFormat::Sse => {}
            // Chunked audio has no in-band error: abort the body instead of completing it.
            StreamFormat::Audio => {
                let _ = self.tx.send(Err(StreamAborted(err.to_string())));
            }
        }
    }
}
