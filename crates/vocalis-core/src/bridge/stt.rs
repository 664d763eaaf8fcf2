//! Transcription engine served by the speech worker.

use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tracing::info;

use super::daemon::{unexpected, WorkerBridge};
use super::protocol::{encode_bytes, read_frame, WorkerFrame, WorkerRequest};
use crate::engine::{Segment, SegmentStream, TranscribeOptions, TranscriptionEngine, TranscriptionInfo};
use crate::error::{Error, Result};
use crate::model::{EngineLoader, SttIdentity};

/// Loads recognition models in the worker.
pub struct BridgeSttLoader {
    bridge: Arc<WorkerBridge>,
    device: Option<String>,
}

impl BridgeSttLoader {
    pub fn new(bridge: Arc<WorkerBridge>, device: Option<String>) -> Self {
        Self { bridge, device }
    }
}

impl EngineLoader<SttIdentity, Arc<dyn TranscriptionEngine>> for BridgeSttLoader {
    fn load(&self, identity: &SttIdentity) -> Result<Arc<dyn TranscriptionEngine>> {
        let request = WorkerRequest {
            kind: Some("stt".to_string()),
            model_id: Some(identity.model_id.clone()),
            compute_type: Some(identity.compute_type.clone()),
            device: self.device.clone(),
            ..WorkerRequest::command("load")
        };

        match self.bridge.call_load(&request)? {
            WorkerFrame::Status { status, device, .. } if status == "ok" => {
                info!(
                    "Worker loaded {} on {}",
                    identity,
                    device.as_deref().unwrap_or("default device")
                );
                Ok(Arc::new(BridgeTranscriptionEngine {
                    bridge: self.bridge.clone(),
                    identity: identity.clone(),
                }))
            }
            other => Err(Error::ModelLoad(unexpected(other).to_string())),
        }
    }
}

pub struct BridgeTranscriptionEngine {
    bridge: Arc<WorkerBridge>,
    identity: SttIdentity,
}

impl TranscriptionEngine for BridgeTranscriptionEngine {
    fn transcribe(
        &self,
        audio: &[u8],
        options: &TranscribeOptions,
    ) -> Result<(TranscriptionInfo, Box<dyn SegmentStream>)> {
        let request = WorkerRequest {
            model_id: Some(self.identity.model_id.clone()),
            audio_base64: Some(encode_bytes(audio)),
            options: Some(options.clone()),
            ..WorkerRequest::command("transcribe")
        };
        let mut stream = self.bridge.open(&request)?;

        match read_frame(&mut stream)? {
            WorkerFrame::Info {
                language,
                language_probability,
            } => Ok((
                TranscriptionInfo {
                    language,
                    language_probability,
                },
                Box::new(WorkerSegmentStream {
                    stream: Some(stream),
                }),
            )),
            other => Err(Error::Transcription(unexpected(other).to_string())),
        }
    }
}

struct WorkerSegmentStream {
    stream: Option<UnixStream>,
}

impl SegmentStream for WorkerSegmentStream {
    fn next_segment(&mut self) -> Result<Option<Segment>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match read_frame(stream)? {
            WorkerFrame::Segment { start, end, text } => Ok(Some(Segment { start, end, text })),
            WorkerFrame::Done => {
                self.stream = None;
                Ok(None)
            }
            other => Err(Error::Transcription(unexpected(other).to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn frame(json: &str) -> Vec<u8> {
        let mut out = (json.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(json.as_bytes());
        out
    }

    #[test]
    fn segments_end_at_done() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        remote
            .write_all(&frame(r#"{"type":"segment","start":0.0,"end":0.8,"text":" Hello"}"#))
            .unwrap();
        remote
            .write_all(&frame(r#"{"type":"segment","start":0.8,"end":1.6,"text":" world."}"#))
            .unwrap();
        remote.write_all(&frame(r#"{"type":"done"}"#)).unwrap();

        let mut segments = WorkerSegmentStream {
            stream: Some(local),
        };
        let mut texts = Vec::new();
        while let Some(segment) = segments.next_segment().unwrap() {
            texts.push(segment.text);
        }
        assert_eq!(texts, vec![" Hello", " world."]);
    }

    #[test]
    fn worker_error_is_a_transcription_error() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        remote
            .write_all(&frame(r#"{"type":"error","message":"decode failed"}"#))
            .unwrap();

        let mut segments = WorkerSegmentStream {
            stream: Some(local),
        };
        assert!(matches!(
            segments.next_segment(),
            Err(Error::Transcription(ref m)) if m.contains("decode failed")
        ));
    }
}
