//! ==============================================================================
//! server.rs - pull endpoints
//! ==============================================================================
//!
//! purpose:
//!     serves the gauge registry as prometheus text and the curated sensor
//!     snapshot as json. handlers only read; the pump is the sole writer.
//!
//! routes (paths configurable):
//!     GET /metrics  -> text/plain; version=0.0.4
//!     GET /json     -> {"pm25":..,"formaldehyde":..,"co2":..,"temperature":..,"humidity":..}
//!
//! ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::HttpConfig;
use crate::registry::GaugeRegistry;
use crate::sensor::SensorState;

/// shared handles the handlers read from
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GaugeRegistry>,
    pub sensor: Arc<SensorState>,
}

pub fn router(state: AppState, http: &HttpConfig) -> Router {
    Router::new()
        .route(&http.metrics_path, get(metrics_handler))
        .route(&http.json_path, get(json_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn run_server(state: AppState, http: &HttpConfig) -> Result<()> {
    let addr = http.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Prometheus metrics listens on {}", addr);
    axum::serve(listener, router(state, http))
        .await
        .context("http server failed")?;
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.registry.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, state.registry.content_type())], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response(),
    }
}

async fn json_handler(State(state): State<AppState>) -> Response {
    match serde_json::to_vec(&state.sensor.get()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
