//! Scripted synthesis engine for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{SampleStream, SynthesisEngine, SynthesisStep};
use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub(crate) struct Script {
    pub buffers: Vec<Option<Vec<f32>>>,
    pub fail_run: bool,
    /// 1-based pull that returns an error.
    pub fail_on_pull: Option<usize>,
    /// 1-based pull during which the token is cancelled.
    pub cancel_on_pull: Option<(usize, CancellationToken)>,
    pub pull_delay: Option<Duration>,
}

impl Script {
    pub fn buffers(buffers: Vec<Option<Vec<f32>>>) -> Self {
        Self {
            buffers,
            ..Default::default()
        }
    }
}

pub(crate) struct ScriptedEngine {
    script: Script,
    pulls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    runs: AtomicUsize,
    last_speed: Mutex<Option<f32>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            pulls: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            runs: AtomicUsize::new(0),
            last_speed: Mutex::new(None),
        })
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn last_speed(&self) -> Option<f32> {
        *self.last_speed.lock().unwrap()
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn run(&self, _text: &str, _voice: &str, speed: f32) -> Result<Box<dyn SampleStream>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_speed.lock().unwrap() = Some(speed);
        if self.script.fail_run {
            return Err(Error::Synthesis("engine refused the text".into()));
        }
        Ok(Box::new(ScriptedStream {
            remaining: self.script.buffers.clone().into(),
            script: self.script.clone(),
            pulls: self.pulls.clone(),
            closes: self.closes.clone(),
        }))
    }

    fn voices(&self) -> Vec<String> {
        vec!["af_heart".into()]
    }

    fn sample_rate(&self) -> u32 {
        24000
    }
}

struct ScriptedStream {
    remaining: VecDeque<Option<Vec<f32>>>,
    script: Script,
    pulls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl SampleStream for ScriptedStream {
    fn next_step(&mut self) -> Result<Option<SynthesisStep>> {
        let pull = self.pulls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.script.pull_delay {
            std::thread::sleep(delay);
        }
        if let Some((at, token)) = &self.script.cancel_on_pull {
            if *at == pull {
                token.cancel();
            }
        }
        if self.script.fail_on_pull == Some(pull) {
            return Err(Error::Bridge("worker crashed".into()));
        }
        Ok(self.remaining.pop_front().map(|audio| SynthesisStep {
            graphemes: String::new(),
            phonemes: String::new(),
            audio,
        }))
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
