//! In-memory engines and request helpers for handler tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use vocalis_core::engine::{
    SampleStream, Segment, SegmentStream, SynthesisEngine, SynthesisStep, TranscribeOptions,
    TranscriptionEngine, TranscriptionInfo,
};
use vocalis_core::{
    Error, Result, ServiceConfig, SpeechSynthesizer, SttIdentity, SttModelState, Transcriber,
    TtsIdentity, TtsModelState,
};

use crate::state::AppState;

pub const TTS_MODEL: &str = "hexgrad/Kokoro-82M";
pub const STT_MODEL: &str = "Systran/faster-distil-whisper-small.en";
/// Model id the loaders refuse.
pub const MISSING_MODEL: &str = "nobody/missing-model";
/// Total samples produced by [`ToneEngine`] for any input.
pub const TONE_SAMPLES: usize = 4800;

const BOUNDARY: &str = "vocalis-test-boundary";

struct ToneEngine;

struct Tone(VecDeque<SynthesisStep>);

impl SampleStream for Tone {
    fn next_step(&mut self) -> Result<Option<SynthesisStep>> {
        Ok(self.0.pop_front())
    }

    fn close(&mut self) {}
}

impl SynthesisEngine for ToneEngine {
    fn run(&self, _text: &str, _voice: &str, _speed: f32) -> Result<Box<dyn SampleStream>> {
        let half = TONE_SAMPLES / 2;
        Ok(Box::new(Tone(VecDeque::from(vec![
            SynthesisStep::audio(vec![0.25; half]),
            SynthesisStep::silent(),
            SynthesisStep::audio(vec![-0.25; half]),
        ]))))
    }

    fn voices(&self) -> Vec<String> {
        vec!["af_heart".to_string(), "am_adam".to_string()]
    }

    fn sample_rate(&self) -> u32 {
        24_000
    }
}

struct EchoEngine;

struct Texts(VecDeque<&'static str>);

impl SegmentStream for Texts {
    fn next_segment(&mut self) -> Result<Option<Segment>> {
        Ok(self.0.pop_front().map(|text| Segment {
            start: 0.0,
            end: 1.0,
            text: text.to_string(),
        }))
    }
}

impl TranscriptionEngine for EchoEngine {
    fn transcribe(
        &self,
        audio: &[u8],
        _options: &TranscribeOptions,
    ) -> Result<(TranscriptionInfo, Box<dyn SegmentStream>)> {
        if audio.is_empty() {
            return Err(Error::Bridge("Invalid data found when processing input".into()));
        }
        Ok((
            TranscriptionInfo {
                language: "en".into(),
                language_probability: 0.99,
            },
            Box::new(Texts(VecDeque::from(vec![" hello", "world "]))),
        ))
    }
}

/// State whose loaders build in-memory engines, optionally preloaded.
pub async fn state_with(config: ServiceConfig, load_tts: bool, load_stt: bool) -> AppState {
    let tts = Arc::new(TtsModelState::new(
        "tts",
        Arc::new(|identity: &TtsIdentity| -> Result<Arc<dyn SynthesisEngine>> {
            if identity.model_id == MISSING_MODEL {
                return Err(Error::ModelLoad("repository not found".into()));
            }
            Ok(Arc::new(ToneEngine))
        }),
        Duration::from_secs(5),
    ));
    let stt = Arc::new(SttModelState::new(
        "stt",
        Arc::new(|identity: &SttIdentity| -> Result<Arc<dyn TranscriptionEngine>> {
            if identity.model_id == MISSING_MODEL {
                return Err(Error::ModelLoad("repository not found".into()));
            }
            Ok(Arc::new(EchoEngine))
        }),
        Duration::from_secs(5),
    ));

    if load_tts {
        tts.load(TtsIdentity::new(TTS_MODEL, "a")).await.unwrap();
    }
    if load_stt {
        stt.load(SttIdentity::new(STT_MODEL, "auto")).await.unwrap();
    }

    let synthesizer = SpeechSynthesizer::from_config(tts, &config);
    let transcriber = Transcriber::from_config(stt, &config);
    AppState::new(config, synthesizer, transcriber)
}

pub async fn loaded_state() -> AppState {
    state_with(ServiceConfig::default(), true, true).await
}

pub async fn unloaded_state() -> AppState {
    state_with(ServiceConfig::default(), false, false).await
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn multipart_request(fields: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if *name == "file" {
            body.extend_from_slice(
                b"Content-Disposition: form-data; name=\"file\"; filename=\"test.wav\"\r\n\
                  Content-Type: audio/wav\r\n\r\n",
            );
        } else {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
        }
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/v1/audio/transcriptions")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}
