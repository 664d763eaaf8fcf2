use crate::error::Result;

/// One item of a synthesis sequence.
///
/// `audio` is `None` when the engine produced nothing for this span of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisStep {
    pub graphemes: String,
    pub phonemes: String,
    pub audio: Option<Vec<f32>>,
}

impl SynthesisStep {
    pub fn audio(samples: Vec<f32>) -> Self {
        Self {
            audio: Some(samples),
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    /// Samples, if the step carries any.
    pub fn into_samples(self) -> Option<Vec<f32>> {
        self.audio.filter(|s| !s.is_empty())
    }
}

/// Lazy, finite, non-restartable sequence of synthesis steps.
pub trait SampleStream: Send {
    /// Block until the next step is available. `Ok(None)` ends the sequence.
    fn next_step(&mut self) -> Result<Option<SynthesisStep>>;

    /// Release engine resources held by the sequence. Called exactly once.
    fn close(&mut self);
}

/// A loaded text-to-speech engine. Shared by all concurrent requests.
pub trait SynthesisEngine: Send + Sync {
    fn run(&self, text: &str, voice: &str, speed: f32) -> Result<Box<dyn SampleStream>>;

    /// Known voice ids. Empty when the engine does not enumerate voices.
    fn voices(&self) -> Vec<String>;

    fn sample_rate(&self) -> u32;
}

/// Scoped owner of a [`SampleStream`]: closes it on drop or on [`release`].
///
/// [`release`]: EngineSequence::release
pub struct EngineSequence {
    stream: Option<Box<dyn SampleStream>>,
}

impl EngineSequence {
    pub fn new(stream: Box<dyn SampleStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Next step, or `Ok(None)` once exhausted or released.
    pub fn pull(&mut self) -> Result<Option<SynthesisStep>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_step(),
            None => Ok(None),
        }
    }

    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for EngineSequence {
    fn drop(&mut self) {
        self.release();
    }
}
