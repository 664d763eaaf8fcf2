//! Synthesis engine served by the speech worker.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tracing::{debug, info};

use super::daemon::{unexpected, WorkerBridge};
use super::protocol::{decode_samples, read_frame, WorkerFrame, WorkerRequest};
use crate::engine::{SampleStream, SynthesisEngine, SynthesisStep};
use crate::error::{Error, Result};
use crate::model::{EngineLoader, TtsIdentity};

/// Loads synthesis pipelines in the worker.
pub struct BridgeTtsLoader {
    bridge: Arc<WorkerBridge>,
    device: Option<String>,
    default_sample_rate: u32,
}

impl BridgeTtsLoader {
    pub fn new(bridge: Arc<WorkerBridge>, device: Option<String>, default_sample_rate: u32) -> Self {
        Self {
            bridge,
            device,
            default_sample_rate,
        }
    }
}

impl EngineLoader<TtsIdentity, Arc<dyn SynthesisEngine>> for BridgeTtsLoader {
    fn load(&self, identity: &TtsIdentity) -> Result<Arc<dyn SynthesisEngine>> {
        let request = WorkerRequest {
            kind: Some("tts".to_string()),
            model_id: Some(identity.model_id.clone()),
            lang_code: Some(identity.lang_code.clone()),
            device: self.device.clone(),
            ..WorkerRequest::command("load")
        };

        match self.bridge.call_load(&request)? {
            WorkerFrame::Status {
                status,
                voices,
                sample_rate,
                ..
            } if status == "ok" => {
                info!(
                    "Worker loaded {} with {} voices",
                    identity,
                    voices.len()
                );
                Ok(Arc::new(BridgeSynthesisEngine {
                    bridge: self.bridge.clone(),
                    identity: identity.clone(),
                    voices,
                    sample_rate: sample_rate.unwrap_or(self.default_sample_rate),
                }))
            }
            other => Err(Error::ModelLoad(unexpected(other).to_string())),
        }
    }
}

pub struct BridgeSynthesisEngine {
    bridge: Arc<WorkerBridge>,
    identity: TtsIdentity,
    voices: Vec<String>,
    sample_rate: u32,
}

impl SynthesisEngine for BridgeSynthesisEngine {
    fn run(&self, text: &str, voice: &str, speed: f32) -> Result<Box<dyn SampleStream>> {
        let request = WorkerRequest {
            model_id: Some(self.identity.model_id.clone()),
            lang_code: Some(self.identity.lang_code.clone()),
            text: Some(text.to_string()),
            voice: Some(voice.to_string()),
            speed: Some(speed),
            ..WorkerRequest::command("synthesize")
        };
        let stream = self.bridge.open(&request)?;
        Ok(Box::new(WorkerSampleStream {
            stream: Some(stream),
        }))
    }

    fn voices(&self) -> Vec<String> {
        self.voices.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

struct WorkerSampleStream {
    stream: Option<UnixStream>,
}

impl SampleStream for WorkerSampleStream {
    fn next_step(&mut self) -> Result<Option<SynthesisStep>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match read_frame(stream)? {
            WorkerFrame::Audio {
                samples_base64,
                graphemes,
                phonemes,
            } => Ok(Some(SynthesisStep {
                graphemes,
                phonemes,
                audio: Some(decode_samples(&samples_base64)?),
            })),
            WorkerFrame::Skip {
                graphemes,
                phonemes,
            } => Ok(Some(SynthesisStep {
                graphemes,
                phonemes,
                audio: None,
            })),
            WorkerFrame::Done => {
                self.stream = None;
                Ok(None)
            }
            other => Err(unexpected(other)),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Closing synthesis connection before completion");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
