//! Nearest-neighbor backend: cosine similarity against a precomputed index
//! of labeled training vectors.

use serde::Deserialize;

use crate::config::Config;
use crate::error::PredictError;
use crate::features::{WindowFrame, flatten_window};

use super::{BoxError, Inference};

/// Exported index rows. Vectors are re-normalized at load so cosine
/// similarity reduces to a dot product.
#[derive(Debug, Deserialize)]
pub struct IndexArtifact {
    pub labels: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

pub struct NearestIndex {
    labels: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl NearestIndex {
    pub fn load(config: &Config) -> Result<Self, BoxError> {
        let raw = std::fs::read_to_string(&config.index_path)?;
        let artifact: IndexArtifact = serde_json::from_str(&raw)?;
        Self::from_artifact(artifact, config.sequence_len * config.descriptor_dim())
    }

    pub fn from_artifact(artifact: IndexArtifact, expected_dim: usize) -> Result<Self, BoxError> {
        if artifact.labels.len() != artifact.vectors.len() {
            return Err("index artifact has mismatched label/vector counts".into());
        }
        if artifact.vectors.is_empty() {
            return Err("index artifact is empty".into());
        }
        if artifact.vectors.iter().any(|v| v.len() != expected_dim) {
            return Err(format!("index artifact rows must all have dimension {}", expected_dim).into());
        }

        let mut labels = Vec::with_capacity(artifact.labels.len());
        let mut vectors = Vec::with_capacity(artifact.vectors.len());
        for (label, vector) in artifact.labels.into_iter().zip(artifact.vectors) {
            match l2_normalize(&vector) {
                Some(normalized) => {
                    labels.push(label);
                    vectors.push(normalized);
                }
                None => {
                    eprintln!("[runtime] dropping zero-norm index row for '{}'", label);
                }
            }
        }
        if vectors.is_empty() {
            return Err("index artifact has no usable rows".into());
        }
        Ok(NearestIndex { labels, vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Cosine match of the flattened, normalized window against every row;
    /// confidence rescales similarity from [-1,1] to [0,1].
    pub fn infer(&self, window: &[WindowFrame]) -> Result<Inference, PredictError> {
        let flat = flatten_window(window);
        let Some(query) = l2_normalize(&flat) else {
            return Ok(Inference::none());
        };
        if query.len() != self.vectors[0].len() {
            return Err(PredictError::Artifact(format!(
                "window produced {} features, index expects {}",
                query.len(),
                self.vectors[0].len()
            )));
        }

        let mut best_idx = 0;
        let mut best_sim = f32::NEG_INFINITY;
        for (i, row) in self.vectors.iter().enumerate() {
            let sim: f32 = row.iter().zip(&query).map(|(a, b)| a * b).sum();
            if sim > best_sim {
                best_sim = sim;
                best_idx = i;
            }
        }

        Ok(Inference::new(
            self.labels[best_idx].clone(),
            (best_sim + 1.0) / 2.0,
        ))
    }
}

fn l2_normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return None;
    }
    Some(vector.iter().map(|v| v / norm).collect())
}
