//! Read projections and command gating shared by every dashboard.
//!
//! Backing stores rarely guarantee arrival order once an ownership filter is
//! applied, so every projection re-sorts newest-first after each batch.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  application::{ApplicationRecord, ApplicationStatus},
  store::{ApplicationFilter, SubscriptionEvent},
  transition::Action,
  user::Role,
};

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Sort by `created_at` descending; ties broken by id for a stable order.
pub fn sort_newest_first(records: &mut [ApplicationRecord]) {
  records.sort_by(|a, b| {
    b.created_at
      .cmp(&a.created_at)
      .then_with(|| b.id.cmp(&a.id))
  });
}

// ─── Feed ────────────────────────────────────────────────────────────────────

/// A live, ordered view over the applications matching one filter.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFeed {
  filter:  ApplicationFilter,
  records: Vec<ApplicationRecord>,
}

/// What a feed needs from its owner after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedUpdate {
  Updated,
  /// Events were missed; reload a snapshot and pass it to
  /// [`ApplicationFeed::replace_all`].
  NeedsResync,
}

impl ApplicationFeed {
  pub fn new(filter: ApplicationFilter) -> Self {
    Self { filter, records: Vec::new() }
  }

  pub fn records(&self) -> &[ApplicationRecord] { &self.records }

  pub fn filter(&self) -> &ApplicationFilter { &self.filter }

  /// Replace the contents with a fresh snapshot.
  pub fn replace_all(&mut self, snapshot: Vec<ApplicationRecord>) {
    self.records = snapshot
      .into_iter()
      .filter(|r| self.filter.matches(r))
      .collect();
    sort_newest_first(&mut self.records);
  }

  /// Apply a batch of pushed events, re-sorting once at the end.
  pub fn apply_batch(
    &mut self,
    events: impl IntoIterator<Item = SubscriptionEvent>,
  ) -> FeedUpdate {
    let mut update = FeedUpdate::Updated;
    for event in events {
      match event {
        SubscriptionEvent::Changed(record) => self.upsert(record),
        SubscriptionEvent::Resync => update = FeedUpdate::NeedsResync,
      }
    }
    sort_newest_first(&mut self.records);
    update
  }

  pub fn apply(&mut self, event: SubscriptionEvent) -> FeedUpdate {
    self.apply_batch([event])
  }

  fn upsert(&mut self, record: ApplicationRecord) {
    let existing = self.records.iter().position(|r| r.id == record.id);
    let keep = self.filter.matches(&record);
    match (existing, keep) {
      (Some(i), true) => {
        // An older revision arriving late must not overwrite a newer one.
        if self.records[i].revision <= record.revision {
          self.records[i] = record;
        }
      }
      (Some(i), false) => {
        self.records.remove(i);
      }
      (None, true) => self.records.push(record),
      (None, false) => {}
    }
  }
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// Per-status tallies shown in dashboard headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
  pub total:               usize,
  pub pending:             usize,
  pub under_review:        usize,
  pub tutor_approved:      usize,
  pub tutor_rejected:      usize,
  pub changes_requested:   usize,
  pub returned_to_student: usize,
  pub approved:            usize,
  pub rejected:            usize,
}

impl StatusCounts {
  pub fn tally<'a>(records: impl IntoIterator<Item = &'a ApplicationRecord>) -> Self {
    let mut counts = Self::default();
    for r in records {
      counts.total += 1;
      let slot = match r.status {
        ApplicationStatus::Pending => &mut counts.pending,
        ApplicationStatus::UnderReview => &mut counts.under_review,
        ApplicationStatus::TutorApproved => &mut counts.tutor_approved,
        ApplicationStatus::TutorRejected => &mut counts.tutor_rejected,
        ApplicationStatus::ChangesRequested => &mut counts.changes_requested,
        ApplicationStatus::ReturnedToStudent => &mut counts.returned_to_student,
        ApplicationStatus::Approved => &mut counts.approved,
        ApplicationStatus::Rejected => &mut counts.rejected,
      };
      *slot += 1;
    }
    counts
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Case-insensitive substring match over the admin-searchable fields. A
/// blank term matches everything.
pub fn matches_search(record: &ApplicationRecord, term: &str) -> bool {
  let term = term.trim().to_lowercase();
  if term.is_empty() {
    return true;
  }
  [
    record.student_name.as_str(),
    record.document_number.as_str(),
    record.institution.as_str(),
    record.program.as_str(),
    record.plant_location.as_str(),
    record.status.as_ref(),
    record.verification_code.as_str(),
  ]
  .iter()
  .any(|field| field.to_lowercase().contains(&term))
}

/// Records matching `term`, preserving order. An empty result is a normal
/// empty state.
pub fn search<'a>(
  records: &'a [ApplicationRecord],
  term: &str,
) -> Vec<&'a ApplicationRecord> {
  records.iter().filter(|r| matches_search(r, term)).collect()
}

// ─── Available actions ───────────────────────────────────────────────────────

/// The controls a dashboard should offer for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableActions {
  pub actions:               Vec<Action>,
  pub certificate_available: bool,
}

pub fn available_actions(role: Role, record: &ApplicationRecord) -> AvailableActions {
  let actions = role
    .allowed_actions()
    .into_iter()
    .filter(|a| a.is_legal_from(record.status))
    .collect();
  AvailableActions {
    actions,
    certificate_available: record.status == ApplicationStatus::Approved,
  }
}

// ─── In-flight commands ──────────────────────────────────────────────────────

/// Refuses a second command for a record while the first is unresolved.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
  pending: Arc<Mutex<HashSet<Uuid>>>,
}

/// Releases its record when dropped, whether the command succeeded or not.
#[derive(Debug)]
pub struct InFlightGuard {
  id:      Uuid,
  pending: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
  pub fn begin(&self, id: Uuid) -> Result<InFlightGuard> {
    let mut set = self.pending.lock().unwrap_or_else(|p| p.into_inner());
    if !set.insert(id) {
      return Err(Error::AlreadyInFlight(id));
    }
    Ok(InFlightGuard { id, pending: Arc::clone(&self.pending) })
  }

  pub fn is_in_flight(&self, id: Uuid) -> bool {
    self
      .pending
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .contains(&id)
  }
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self
      .pending
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .remove(&self.id);
  }
}
