//! JSON REST API for Trustify.
//!
//! Exposes an axum [`Router`] backed by any
//! [`trustify_core::store::CertificationStore`]. Authentication and TLS are
//! the gateway's responsibility; see [`auth`] for how the verified principal
//! reaches the handlers.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", trustify_api::api_router(store.clone()))
//! ```

pub mod applications;
pub mod auth;
pub mod error;
pub mod etag;
pub mod users;
pub mod verify;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use trustify_core::store::CertificationStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: CertificationStore + 'static,
{
  Router::new()
    // Identity
    .route("/me", get(users::me::<S>))
    // Applications
    .route(
      "/applications",
      get(applications::list::<S>).post(applications::create::<S>),
    )
    .route("/applications/events", get(applications::events::<S>))
    .route("/applications/{id}", get(applications::get_one::<S>))
    .route(
      "/applications/{id}/transitions",
      post(applications::transition::<S>),
    )
    .route(
      "/applications/{id}/certificate",
      get(applications::certificate::<S>),
    )
    // Users
    .route("/users", get(users::list::<S>))
    .route("/users/{id}/role", put(users::set_role::<S>))
    .route("/users/{id}", axum::routing::delete(users::delete::<S>))
    // Public
    .route("/verify/{code}", get(verify::handler::<S>))
    .with_state(store)
}
