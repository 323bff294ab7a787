//! Remote detection backend: submits the most recent frame to an external
//! HTTP service and picks the highest-confidence candidate it returns.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::PredictError;
use crate::features::WindowFrame;

use super::{BoxError, Inference};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub predictions: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(rename = "class", default)]
    pub class_name: String,
    #[serde(default)]
    pub confidence: f32,
}

pub struct RemoteDetector {
    http: Client,
    api_url: String,
    model_id: String,
    api_key: String,
}

impl RemoteDetector {
    pub fn new(config: &Config) -> Result<Self, BoxError> {
        if config.api_key.is_empty() {
            return Err(
                "remote API key not set (use ROBOFLOW_API_KEY or pick another backend)".into(),
            );
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(RemoteDetector {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.trim().trim_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Only the newest frame is submitted; the service scores single images.
    pub async fn infer(&self, window: &[WindowFrame]) -> Result<Inference, PredictError> {
        let latest = window
            .last()
            .ok_or_else(|| PredictError::Backend("empty frame window".to_string()))?;

        let part = reqwest::multipart::Part::bytes(latest.jpeg.clone())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PredictError::Backend(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/{}", self.api_url, self.model_id);
        let resp = self
            .http
            .post(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            // Hard failure, no retry at this layer.
            return Err(PredictError::Backend(format!("HTTP {}: {}", status.as_u16(), preview)));
        }

        let detection: DetectionResponse = resp.json().await?;
        Ok(pick_best(&detection))
    }
}

/// Highest-confidence candidate, or the empty prediction for an empty list.
pub fn pick_best(response: &DetectionResponse) -> Inference {
    response
        .predictions
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|best| Inference::new(best.class_name.trim(), best.confidence))
        .unwrap_or_else(Inference::none)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_best_selects_highest_confidence() {
        let response: DetectionResponse = serde_json::from_str(
            r#"{"predictions": [
                {"class": "Merhaba", "confidence": 0.41},
                {"class": "Evet", "confidence": 0.87},
                {"class": "Hayir", "confidence": 0.12}
            ]}"#,
        )
        .unwrap();
        let best = pick_best(&response);
        assert_eq!(best.label, "Evet");
        assert!((best.confidence - 0.87).abs() < 1e-6);
    }

    #[test]
    fn test_pick_best_empty_predictions() {
        let response: DetectionResponse = serde_json::from_str(r#"{"predictions": []}"#).unwrap();
        assert_eq!(pick_best(&response), Inference::none());
    }

    #[test]
    fn test_pick_best_missing_predictions_field() {
        let response: DetectionResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(pick_best(&response), Inference::none());
    }

    #[test]
    fn test_pick_best_clamps_confidence() {
        let response: DetectionResponse = serde_json::from_str(
            r#"{"predictions": [{"class": "Su", "confidence": 1.7}]}"#,
        )
        .unwrap();
        assert_eq!(pick_best(&response).confidence, 1.0);
    }

    #[test]
    fn test_new_requires_api_key() {
        let mut config = Config::from_env();
        config.api_key = String::new();
        assert!(RemoteDetector::new(&config).is_err());
    }
}
