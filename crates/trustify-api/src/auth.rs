//! Principal extraction.
//!
//! Authentication happens upstream, in the identity provider and the gateway
//! in front of this service. What arrives here is the verified identity as
//! request headers:
//!
//! | Header | Required |
//! |---|---|
//! | `x-principal-id` | yes, 401 otherwise |
//! | `x-principal-email` | no |
//! | `x-principal-name` | no |

use std::sync::Arc;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use trustify_core::{
  identity,
  store::CertificationStore,
  transition::Actor,
  user::Principal,
};

use crate::error::ApiError;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_EMAIL_HEADER: &str = "x-principal-email";
pub const PRINCIPAL_NAME_HEADER: &str = "x-principal-name";

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

/// Read the principal handed over by the authentication provider.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
  let id = header_str(headers, PRINCIPAL_ID_HEADER).ok_or(ApiError::Unauthenticated)?;
  Ok(Principal {
    id:    id.to_owned(),
    email: header_str(headers, PRINCIPAL_EMAIL_HEADER).map(str::to_owned),
    name:  header_str(headers, PRINCIPAL_NAME_HEADER).map(str::to_owned),
  })
}

/// An authenticated principal, without a role lookup.
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    principal_from_headers(&parts.headers).map(Authenticated)
  }
}

/// An authenticated principal together with its current role.
///
/// The role is resolved against the store on every request.
pub struct Caller {
  pub principal: Principal,
  pub actor:     Actor,
}

impl<S> FromRequestParts<Arc<S>> for Caller
where
  S: CertificationStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    store: &Arc<S>,
  ) -> Result<Self, Self::Rejection> {
    let principal = principal_from_headers(&parts.headers)?;
    let actor = identity::resolve_actor(store.as_ref(), &principal).await;
    Ok(Caller { principal, actor })
  }
}
