//! Local probabilistic classifier: a standardize + linear + softmax pipeline
//! exported from offline training as a JSON artifact.

use serde::Deserialize;

use crate::config::Config;
use crate::error::PredictError;
use crate::features::{WindowFrame, flatten_window};

use super::{BoxError, Inference};

/// Exported model weights. `coef` is `labels x (sequence_len * feature_dim)`.
#[derive(Debug, Deserialize)]
pub struct ClassifierArtifact {
    pub labels: Vec<String>,
    pub sequence_len: usize,
    pub feature_dim: usize,
    pub scaler_mean: Vec<f32>,
    pub scaler_scale: Vec<f32>,
    pub coef: Vec<Vec<f32>>,
    pub intercept: Vec<f32>,
}

pub struct LocalClassifier {
    artifact: ClassifierArtifact,
}

impl LocalClassifier {
    pub fn load(config: &Config) -> Result<Self, BoxError> {
        let raw = std::fs::read_to_string(&config.model_path)?;
        let artifact: ClassifierArtifact = serde_json::from_str(&raw)?;
        Self::from_artifact(artifact, config.sequence_len, config.descriptor_dim())
    }

    pub fn from_artifact(
        artifact: ClassifierArtifact,
        sequence_len: usize,
        descriptor_dim: usize,
    ) -> Result<Self, BoxError> {
        let input_dim = artifact.sequence_len * artifact.feature_dim;
        if artifact.sequence_len != sequence_len || artifact.feature_dim != descriptor_dim {
            return Err(format!(
                "classifier artifact trained for seq {} x dim {}, runtime configured for {} x {}",
                artifact.sequence_len, artifact.feature_dim, sequence_len, descriptor_dim
            )
            .into());
        }
        if artifact.coef.len() != artifact.labels.len()
            || artifact.intercept.len() != artifact.labels.len()
        {
            return Err("classifier artifact has mismatched label/weight counts".into());
        }
        if artifact.scaler_mean.len() != input_dim
            || artifact.scaler_scale.len() != input_dim
            || artifact.coef.iter().any(|row| row.len() != input_dim)
        {
            return Err("classifier artifact has mismatched weight dimensions".into());
        }
        if artifact.labels.is_empty() {
            return Err("classifier artifact has no labels".into());
        }
        Ok(LocalClassifier { artifact })
    }

    pub fn label_count(&self) -> usize {
        self.artifact.labels.len()
    }

    /// Flatten the window, run the pipeline, and take the max-posterior class.
    pub fn infer(&self, window: &[WindowFrame]) -> Result<Inference, PredictError> {
        let flat = flatten_window(window);
        let input_dim = self.artifact.sequence_len * self.artifact.feature_dim;
        if flat.len() != input_dim {
            return Err(PredictError::Artifact(format!(
                "window produced {} features, classifier expects {}",
                flat.len(),
                input_dim
            )));
        }

        let standardized: Vec<f32> = flat
            .iter()
            .zip(&self.artifact.scaler_mean)
            .zip(&self.artifact.scaler_scale)
            .map(|((x, mean), scale)| {
                // A constant training feature exports scale 0.
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect();

        let logits: Vec<f32> = self
            .artifact
            .coef
            .iter()
            .zip(&self.artifact.intercept)
            .map(|(row, bias)| {
                row.iter().zip(&standardized).map(|(w, x)| w * x).sum::<f32>() + bias
            })
            .collect();

        let probs = softmax(&logits);
        let (best_idx, best_prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("NaN probability"))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));

        Ok(Inference::new(
            self.artifact.labels[best_idx].clone(),
            best_prob,
        ))
    }
}

/// Numerically-stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(values: &[&[f32]]) -> Vec<WindowFrame> {
        values
            .iter()
            .map(|v| WindowFrame {
                descriptor: v.to_vec(),
                jpeg: vec![],
            })
            .collect()
    }

    fn tiny_classifier() -> LocalClassifier {
        // Two frames of two features; class "b" fires on the second feature
        // of either frame.
        let artifact = ClassifierArtifact {
            labels: vec!["a".to_string(), "b".to_string()],
            sequence_len: 2,
            feature_dim: 2,
            scaler_mean: vec![0.0; 4],
            scaler_scale: vec![1.0; 4],
            coef: vec![vec![4.0, 0.0, 4.0, 0.0], vec![0.0, 4.0, 0.0, 4.0]],
            intercept: vec![0.0, 0.0],
        };
        LocalClassifier::from_artifact(artifact, 2, 2).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_infer_picks_max_posterior() {
        let clf = tiny_classifier();
        let result = clf
            .infer(&window_of(&[&[1.0, 0.0], &[1.0, 0.0]]))
            .unwrap();
        assert_eq!(result.label, "a");
        assert!(result.confidence > 0.5 && result.confidence <= 1.0);

        let result = clf
            .infer(&window_of(&[&[0.0, 1.0], &[0.0, 1.0]]))
            .unwrap();
        assert_eq!(result.label, "b");
    }

    #[test]
    fn test_infer_rejects_wrong_window_shape() {
        let clf = tiny_classifier();
        assert!(matches!(
            clf.infer(&window_of(&[&[1.0, 0.0]])),
            Err(PredictError::Artifact(_))
        ));
    }

    #[test]
    fn test_artifact_validation() {
        let artifact = ClassifierArtifact {
            labels: vec!["a".to_string()],
            sequence_len: 2,
            feature_dim: 2,
            scaler_mean: vec![0.0; 4],
            scaler_scale: vec![1.0; 4],
            coef: vec![vec![0.0; 3]], // wrong column count
            intercept: vec![0.0],
        };
        assert!(LocalClassifier::from_artifact(artifact, 2, 2).is_err());
    }

    #[test]
    fn test_artifact_dimension_mismatch_with_runtime() {
        let artifact = ClassifierArtifact {
            labels: vec!["a".to_string()],
            sequence_len: 4,
            feature_dim: 1024,
            scaler_mean: vec![0.0; 4096],
            scaler_scale: vec![1.0; 4096],
            coef: vec![vec![0.0; 4096]],
            intercept: vec![0.0],
        };
        // Runtime configured for a different window length.
        assert!(LocalClassifier::from_artifact(artifact, 2, 1024).is_err());
    }
}
