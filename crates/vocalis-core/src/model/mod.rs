//! Model identities and loaded-engine state.

mod state;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{SynthesisEngine, TranscriptionEngine};

pub use state::{EngineLoader, ModelState};

/// Which synthesis model is loaded, and for which language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TtsIdentity {
    pub model_id: String,
    pub lang_code: String,
}

impl TtsIdentity {
    pub fn new(model_id: impl Into<String>, lang_code: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            lang_code: lang_code.into(),
        }
    }
}

impl fmt::Display for TtsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (lang {})", self.model_id, self.lang_code)
    }
}

/// Which recognition model is loaded, and at which precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SttIdentity {
    pub model_id: String,
    pub compute_type: String,
}

impl SttIdentity {
    pub fn new(model_id: impl Into<String>, compute_type: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            compute_type: compute_type.into(),
        }
    }
}

impl fmt::Display for SttIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model_id, self.compute_type)
    }
}

pub type TtsModelState = ModelState<TtsIdentity, Arc<dyn SynthesisEngine>>;
pub type SttModelState = ModelState<SttIdentity, Arc<dyn TranscriptionEngine>>;
