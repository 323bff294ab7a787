//! ModelRuntime: the per-request pipeline of decode -> window push -> backend
//! inference -> OOD gate/blend -> temporal smoothing.
//!
//! Constructed once at startup and shared read-only across requests; all
//! mutable state lives in the session store.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::backend::{Backend, Inference};
use crate::config::Config;
use crate::dataset;
use crate::error::PredictError;
use crate::features::{WindowFrame, decode_frame};
use crate::profile::DatasetProfile;
use crate::session::SessionStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const LABEL_PREVIEW_LEN: usize = 10;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub text: String,
    pub confidence: f32,
    pub ready: bool,
    pub source: &'static str,
    pub profile: &'static str,
    pub dataset1_found: bool,
    pub dataset1_labels_count: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub runtime_loaded: bool,
    pub mode: &'static str,
    pub model_id: String,
    pub profile: &'static str,
    pub profile_threshold: f32,
    pub profile_samples: usize,
    pub active_sessions: usize,
    pub dataset1_found: bool,
    pub dataset1_labels_count: usize,
    pub dataset1_labels_preview: Vec<String>,
}

pub struct ModelRuntime {
    config: Config,
    backend: Backend,
    profile: DatasetProfile,
    dataset_found: bool,
    labels: Vec<String>,
    label_keys: HashSet<String>,
    sessions: SessionStore,
}

impl ModelRuntime {
    pub async fn new(config: Config) -> Result<Self, BoxError> {
        let dataset_path = Path::new(&config.dataset_path);
        let dataset_found = dataset_path.is_dir();
        let labels = dataset::load_labels(dataset_path);
        let label_keys = labels.iter().map(|l| dataset::normalize_label(l)).collect();
        println!(
            "[runtime] dataset {}: {} labels",
            config.dataset_path,
            labels.len()
        );

        let profile = DatasetProfile::load_or_build(&config).await;
        let backend = Backend::from_config(&config)?;
        let sessions = SessionStore::new(config.sequence_len, config.history_len, config.max_sessions);

        Ok(ModelRuntime {
            config,
            backend,
            profile,
            dataset_found,
            labels,
            label_keys,
            sessions,
        })
    }

    /// Run one frame through the full pipeline for the given session.
    pub async fn predict(
        &self,
        session_id: &str,
        image_base64: &str,
    ) -> Result<PredictResponse, PredictError> {
        // Decode before touching any session state, so bad input mutates nothing.
        let img = decode_frame(image_base64)?;
        let frame = WindowFrame::from_image(&img, self.config.frame_size)?;

        let session = self.sessions.checkout(session_id);
        let mut session = session.lock().await;

        let ready = session.push(frame);
        if !ready {
            return Ok(self.response("", 0.0, false));
        }

        let window = session.window();
        let raw = self.backend.infer(&window).await?;
        let kept = keep_prediction(raw, self.config.min_confidence, &self.label_keys);

        let latest = window.last().expect("ready window is non-empty");
        let match_score = self.profile.match_score(&latest.descriptor);
        let gated = gate_and_blend(
            kept,
            match_score,
            self.config.match_floor,
            self.config.blend_weight,
        );

        let text = if gated.label.is_empty() {
            gated.label
        } else {
            session.record_label(&gated.label)
        };

        Ok(self.response(&text, gated.confidence, true))
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            runtime_loaded: true,
            mode: self.backend.mode(),
            model_id: self.config.model_id.clone(),
            profile: self.profile.status(),
            profile_threshold: self.profile.threshold(),
            profile_samples: self.profile.sample_count(),
            active_sessions: self.sessions.len(),
            dataset1_found: self.dataset_found,
            dataset1_labels_count: self.labels.len(),
            dataset1_labels_preview: self.labels.iter().take(LABEL_PREVIEW_LEN).cloned().collect(),
        }
    }

    fn response(&self, text: &str, confidence: f32, ready: bool) -> PredictResponse {
        PredictResponse {
            text: text.to_string(),
            confidence,
            ready,
            source: self.backend.mode(),
            profile: self.profile.status(),
            dataset1_found: self.dataset_found,
            dataset1_labels_count: self.labels.len(),
        }
    }
}

/// Drop predictions below the confidence floor or outside the dataset's
/// label set. An empty whitelist keeps every label.
fn keep_prediction(inference: Inference, min_confidence: f32, label_keys: &HashSet<String>) -> Inference {
    if inference.confidence < min_confidence || inference.label.is_empty() {
        return Inference::none();
    }
    if label_keys.is_empty() || label_keys.contains(&dataset::normalize_label(&inference.label)) {
        inference
    } else {
        Inference::none()
    }
}

/// Blend backend confidence with the dataset match score; a match score
/// below the floor suppresses the label entirely, whatever the backend said.
fn gate_and_blend(inference: Inference, match_score: f32, floor: f32, weight: f32) -> Inference {
    if match_score < floor {
        return Inference::new("", match_score);
    }
    if inference.label.is_empty() {
        return Inference::none();
    }
    let blended = weight * inference.confidence + (1.0 - weight) * match_score;
    Inference::new(inference.label, blended)
}
