mod backend;
mod config;
mod dataset;
mod error;
mod features;
mod profile;
mod routes;
mod runtime;
mod session;

use std::sync::Arc;

use tower_http::cors::CorsLayer;

use config::Config;
use runtime::ModelRuntime;

pub struct AppState {
    pub runtime: ModelRuntime,
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    let runtime = match ModelRuntime::new(config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("[server] failed to construct runtime: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState { runtime });

    // The browser extension calls from arbitrary page origins.
    let app = routes::build_routes()
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    println!("[server] listening on http://{}", addr);
    axum::serve(listener, app).await.expect("Server failed");
}
