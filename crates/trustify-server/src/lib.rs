//! HTTP service assembly for Trustify.
//!
//! Nests the JSON API under `/api`, adds a liveness check, and wraps
//! everything in request tracing. The binary in `main.rs` supplies the
//! configuration and the store.

use std::{fmt, path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use trustify_core::store::CertificationStore;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` layered
/// under `TRUSTIFY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub backend:    BackendConfig,
}

/// Credentials for the hosted authentication backend. They are opaque to
/// this service and passed through to whatever fronts it.
#[derive(Deserialize, Clone, Default)]
#[serde(default)]
pub struct BackendConfig {
  pub api_key:     Option<String>,
  pub project_id:  Option<String>,
  pub auth_domain: Option<String>,
}

impl fmt::Debug for BackendConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackendConfig")
      .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
      .field("project_id", &self.project_id)
      .field("auth_domain", &self.auth_domain)
      .finish()
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

/// Build the complete service router for `store`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: CertificationStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", trustify_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
