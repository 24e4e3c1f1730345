//! Error types for `trustify-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{application::ApplicationStatus, transition::Action, user::Role};

#[derive(Debug, Error)]
pub enum Error {
  // ── Validation ────────────────────────────────────────────────────────────
  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("end date {end} is not after start date {start}")]
  InvalidDateRange { start: NaiveDate, end: NaiveDate },

  #[error("internship must last at least {min_months} months")]
  DurationTooShort { min_months: u32 },

  #[error("internship must last at most {max_months} months")]
  DurationTooLong { max_months: u32 },

  #[error("{0} requires a non-empty reason")]
  BlankReason(Action),

  // ── Authorization ─────────────────────────────────────────────────────────
  #[error("role {role} may not perform {operation}")]
  Forbidden { role: Role, operation: String },

  #[error("cannot {action} an application in state {from}")]
  IllegalTransition {
    from:   ApplicationStatus,
    action: Action,
  },

  // ── State ─────────────────────────────────────────────────────────────────
  #[error("application not found: {0}")]
  ApplicationNotFound(Uuid),

  #[error("user not found: {0}")]
  UserNotFound(String),

  #[error("application {0} is not approved")]
  NotApproved(Uuid),

  #[error("application {id} is at revision {actual}, expected {expected}")]
  RevisionConflict { id: Uuid, expected: u64, actual: u64 },

  #[error("a command for application {0} is already in flight")]
  AlreadyInFlight(Uuid),

  // ── Decoding ──────────────────────────────────────────────────────────────
  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the error was caused by caller input rather than state or
  /// permissions. Validation failures never reach the store.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::MissingField(_)
        | Self::InvalidDateRange { .. }
        | Self::DurationTooShort { .. }
        | Self::DurationTooLong { .. }
        | Self::BlankReason(_)
    )
  }

  pub fn is_authorization(&self) -> bool {
    matches!(self, Self::Forbidden { .. } | Self::IllegalTransition { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
