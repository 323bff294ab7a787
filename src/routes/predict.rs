//! Prediction and health endpoints (/predict, /health).
//!
//! Request failures come back as `{error}` JSON bodies rather than HTTP
//! error statuses; the browser extension treats any non-JSON response as a
//! dead server.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub session_id: String,
    pub image_base64: String,
}

/// POST /predict - Push one frame into the session and return the smoothed label
async fn predict(State(state): State<Arc<AppState>>, Json(req): Json<PredictRequest>) -> Json<Value> {
    match state
        .runtime
        .predict(&req.session_id, &req.image_base64)
        .await
    {
        Ok(response) => Json(serde_json::to_value(response).unwrap_or_else(|e| {
            eprintln!("[server] response serialization error: {}", e);
            json!({ "error": "internal serialization failure" })
        })),
        Err(e) => {
            eprintln!("[server] predict error for session {}: {}", req.session_id, e);
            Json(json!({ "error": e.to_string() }))
        }
    }
}

/// GET /health - Report backend and profile status, independent of sessions
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::to_value(state.runtime.health()).unwrap_or_else(|e| {
        eprintln!("[server] health serialization error: {}", e);
        json!({ "ok": false })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_request_wire_format() {
        let req: PredictRequest = serde_json::from_str(
            r#"{"session_id": "s1", "image_base64": "data:image/jpeg;base64,AAAA"}"#,
        )
        .unwrap();
        assert_eq!(req.session_id, "s1");
        assert!(req.image_base64.starts_with("data:"));
    }
}
