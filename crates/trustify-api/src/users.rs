//! Handlers for identity and `/users` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/me` | Binds the caller; first sight creates a student |
//! | `GET`    | `/users` | Admin only |
//! | `PUT`    | `/users/{id}/role` | Admin only. Body: `{"role":"tutor"}` |
//! | `DELETE` | `/users/{id}` | Admin only. 204, or 404 if absent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::Deserialize;
use trustify_core::{
  identity,
  store::CertificationStore,
  user::{Role, UserRecord},
  workflow,
};

use crate::{
  auth::{Authenticated, Caller},
  error::ApiError,
};

/// `GET /me`
///
/// Unlike role resolution for other routes, a store failure here is reported
/// rather than defaulted.
pub async fn me<S>(
  State(store): State<Arc<S>>,
  Authenticated(principal): Authenticated,
) -> Result<Json<UserRecord>, ApiError>
where
  S: CertificationStore + 'static,
{
  let user = identity::bind(store.as_ref(), &principal)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(user))
}

/// `GET /users`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
) -> Result<Json<Vec<UserRecord>>, ApiError>
where
  S: CertificationStore + 'static,
{
  Ok(Json(workflow::list_users(store.as_ref(), &caller.actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub role: Role,
}

/// `PUT /users/{id}/role`
pub async fn set_role<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<String>,
  Json(body): Json<RoleBody>,
) -> Result<Json<UserRecord>, ApiError>
where
  S: CertificationStore + 'static,
{
  let user = workflow::change_role(store.as_ref(), &caller.actor, &id, body.role).await?;
  Ok(Json(user))
}

/// `DELETE /users/{id}`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: CertificationStore + 'static,
{
  workflow::delete_user(store.as_ref(), &caller.actor, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}
