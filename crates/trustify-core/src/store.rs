//! The `CertificationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `trustify-store-sqlite`). Higher layers (`trustify-api`, the server) depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  application::{ApplicationDraft, ApplicationRecord, ApplicationStatus},
  transition::Transition,
  user::{Role, UserRecord},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which applications a reader is interested in. Shared by one-shot queries
/// and live subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
  /// Restrict to one owning student.
  pub student_id: Option<String>,
  /// Restrict to these statuses. Empty means any. A record without a stored
  /// status matches `Pending`.
  pub statuses:   Vec<ApplicationStatus>,
}

impl ApplicationFilter {
  pub fn owned_by(student_id: impl Into<String>) -> Self {
    Self { student_id: Some(student_id.into()), statuses: Vec::new() }
  }

  pub fn matches(&self, record: &ApplicationRecord) -> bool {
    if let Some(owner) = &self.student_id
      && owner != &record.student_id
    {
      return false;
    }
    self.statuses.is_empty() || self.statuses.contains(&record.status)
  }
}

/// Parameters for [`CertificationStore::query_applications`].
///
/// Results are ordered by `created_at` descending.
#[derive(Debug, Clone, Default)]
pub struct ApplicationQuery {
  pub filter:         ApplicationFilter,
  /// Case-insensitive substring over the searchable text fields.
  pub text:           Option<String>,
  pub created_after:  Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// The result of [`CertificationStore::apply_transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
  Applied(ApplicationRecord),
  NotFound,
  /// The caller's expected revision did not match the stored one.
  Conflict { actual: u64 },
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

/// One push from a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
  /// A record matching the filter was created or changed.
  Changed(ApplicationRecord),
  /// The subscriber fell behind and missed events; it must re-query.
  Resync,
}

/// A live feed of record changes. Dropping it releases the listener.
pub trait Subscription: Send {
  /// Wait for the next event. `None` once the store has shut down.
  fn next(&mut self) -> impl Future<Output = Option<SubscriptionEvent>> + Send + '_;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the backing store for applications and users.
///
/// The store performs no authorization: callers go through
/// [`crate::workflow`], which consults the state machine first.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CertificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  type Subscription: Subscription + 'static;

  // ── Applications ──────────────────────────────────────────────────────

  /// Persist a validated draft. The store assigns the id and sets the
  /// revision to 1.
  fn insert_application(
    &self,
    draft: ApplicationDraft,
  ) -> impl Future<Output = Result<ApplicationRecord, Self::Error>> + Send + '_;

  /// Retrieve an application by id. Returns `None` if not found.
  fn get_application(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ApplicationRecord>, Self::Error>> + Send + '_;

  /// Look an application up by its verification code.
  fn find_by_verification_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<ApplicationRecord>, Self::Error>> + Send + 'a;

  fn query_applications<'a>(
    &'a self,
    query: &'a ApplicationQuery,
  ) -> impl Future<Output = Result<Vec<ApplicationRecord>, Self::Error>> + Send + 'a;

  /// Atomically write `transition` (status, `updated_at`, annotation patch)
  /// and bump the revision. With `expected_revision` set, the write only
  /// happens if the stored revision matches.
  fn apply_transition<'a>(
    &'a self,
    id: Uuid,
    transition: &'a Transition,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<TransitionOutcome, Self::Error>> + Send + 'a;

  // ── Users ─────────────────────────────────────────────────────────────

  fn get_user<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Insert `user` unless a record with the same id exists; return whichever
  /// record is stored afterwards.
  fn get_or_insert_user(
    &self,
    user: UserRecord,
  ) -> impl Future<Output = Result<UserRecord, Self::Error>> + Send + '_;

  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<UserRecord>, Self::Error>> + Send + '_;

  /// Returns the updated user, or `None` if no such user exists.
  fn set_user_role<'a>(
    &'a self,
    id: &'a str,
    role: Role,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Hard delete. Returns whether a record existed.
  fn delete_user<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Live reads ────────────────────────────────────────────────────────

  /// Open a subscription receiving every subsequent write that matches
  /// `filter`. Callers should subscribe before taking their initial
  /// snapshot so no write falls between the two.
  fn subscribe(&self, filter: ApplicationFilter) -> Self::Subscription;
}
