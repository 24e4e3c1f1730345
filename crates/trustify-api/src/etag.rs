//! Entity tags for application records.
//!
//! An ETag is a SHA-256 over the record id and its revision, so it changes
//! with every write and with nothing else.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use trustify_core::application::ApplicationRecord;

/// Compute the quoted ETag for `record`.
pub fn compute_etag(record: &ApplicationRecord) -> String {
  let mut hasher = Sha256::new();
  hasher.update(record.id.as_bytes());
  hasher.update(record.revision.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// The raw `If-Match` value, if the client sent one.
pub fn if_match(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::IF_MATCH)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
}

/// Whether an `If-Match` value admits `record`. `*` matches any existing
/// record; otherwise one of the listed tags must match exactly.
pub fn matches(if_match: &str, record: &ApplicationRecord) -> bool {
  if if_match == "*" {
    return true;
  }
  let current = compute_etag(record);
  if_match
    .split(',')
    .map(str::trim)
    .any(|tag| tag == current)
}
