//! Public certificate verification.
//!
//! `GET /verify/{code}` needs no principal. It answers only for approved
//! applications and reveals nothing about the rest: an unknown code and a
//! code whose application is still under review both read as 404.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use tracing::debug;
use trustify_core::{
  certificate::{Certificate, VerifiedCertificate},
  store::CertificationStore,
};

use crate::error::ApiError;

/// `GET /verify/{code}`
pub async fn handler<S>(
  State(store): State<Arc<S>>,
  Path(code): Path<String>,
) -> Result<Json<VerifiedCertificate>, ApiError>
where
  S: CertificationStore + 'static,
{
  let not_found = || ApiError::NotFound(format!("no approved certificate with code {code}"));

  let record = store
    .find_by_verification_code(&code)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;
  let cert = Certificate::from_record(&record).map_err(|_| not_found())?;

  debug!(code = %cert.verification_code, "certificate verified");
  Ok(Json(VerifiedCertificate::from(&cert)))
}
