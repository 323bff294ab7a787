//! Interchangeable inference backends behind one tagged union.
//!
//! Exactly one backend is constructed at startup from configuration and held
//! for the service lifetime; nothing selects a backend at request time.

use crate::config::{BackendKind, Config};
use crate::error::PredictError;
use crate::features::WindowFrame;

mod classifier;
mod index;
mod remote;

pub use classifier::{ClassifierArtifact, LocalClassifier};
pub use index::{IndexArtifact, NearestIndex};
pub use remote::RemoteDetector;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single backend verdict. An empty label means "no confident prediction";
/// confidence is always clamped to [0,1] whatever the backend's raw scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub label: String,
    pub confidence: f32,
}

impl Inference {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Inference {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn none() -> Self {
        Inference {
            label: String::new(),
            confidence: 0.0,
        }
    }
}

/// One concrete strategy per backend kind, selected by configuration.
pub enum Backend {
    Classifier(LocalClassifier),
    Index(NearestIndex),
    Remote(RemoteDetector),
}

impl Backend {
    pub fn from_config(config: &Config) -> Result<Self, BoxError> {
        match config.backend {
            BackendKind::Classifier => {
                let classifier = LocalClassifier::load(config)?;
                println!(
                    "[runtime] classifier backend: {} labels from {}",
                    classifier.label_count(),
                    config.model_path
                );
                Ok(Backend::Classifier(classifier))
            }
            BackendKind::Index => {
                let index = NearestIndex::load(config)?;
                println!(
                    "[runtime] nearest-index backend: {} rows from {}",
                    index.len(),
                    config.index_path
                );
                Ok(Backend::Index(index))
            }
            BackendKind::Remote => {
                let detector = RemoteDetector::new(config)?;
                println!(
                    "[runtime] remote backend: {} at {}",
                    config.model_id, config.api_url
                );
                Ok(Backend::Remote(detector))
            }
        }
    }

    /// Short name reported in responses and health checks.
    pub fn mode(&self) -> &'static str {
        match self {
            Backend::Classifier(_) => "classifier",
            Backend::Index(_) => "index",
            Backend::Remote(_) => "remote",
        }
    }

    /// Run the backend over the full, ready window (the remote detector only
    /// looks at the most recent frame).
    pub async fn infer(&self, window: &[WindowFrame]) -> Result<Inference, PredictError> {
        match self {
            Backend::Classifier(classifier) => classifier.infer(window),
            Backend::Index(index) => index.infer(window),
            Backend::Remote(detector) => detector.infer(window).await,
        }
    }
}
