//! Service readiness derived from the two model slots.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelReadiness {
    Ok,
    NotLoaded,
}

impl From<bool> for ModelReadiness {
    fn from(ready: bool) -> Self {
        if ready {
            ModelReadiness::Ok
        } else {
            ModelReadiness::NotLoaded
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub stt_model: ModelReadiness,
    pub tts_model: ModelReadiness,
}

impl HealthReport {
    /// Healthy with both models, degraded with one, unhealthy with none.
    pub fn from_readiness(stt_ready: bool, tts_ready: bool) -> Self {
        let status = match (stt_ready, tts_ready) {
            (true, true) => ServiceStatus::Healthy,
            (false, false) => ServiceStatus::Unhealthy,
            _ => ServiceStatus::Degraded,
        };
        Self {
            status,
            stt_model: stt_ready.into(),
            tts_model: tts_ready.into(),
        }
    }
}
