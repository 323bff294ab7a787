pub mod predict;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the inference API.
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new().merge(predict::routes())
}
