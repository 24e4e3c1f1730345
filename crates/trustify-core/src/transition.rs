//! The application status state machine.
//!
//! Every status change goes through [`plan`], which checks, in order:
//!
//! 1. the actor's role may perform the action at all;
//! 2. the action is legal from the record's current status;
//! 3. the action's required input (a non-blank reason) is present.
//!
//! The result is a [`Transition`]: the target status plus a patch of review
//! annotations. Stores persist the patch; in-memory projections use
//! [`Transition::apply_to`].
//!
//! | Action | Role | From | To |
//! |---|---|---|---|
//! | `tutor_approve` | tutor | pending, changes_requested, returned_to_student | tutor_approved |
//! | `tutor_reject` | tutor | same | tutor_rejected |
//! | `tutor_return` | tutor | same | returned_to_student |
//! | `admin_approve` | admin | any | approved |
//! | `admin_reject` | admin | any | rejected |
//! | `admin_mark_review` | admin | any | under_review |
//! | `admin_mark_pending` | admin | any | pending |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  application::{ApplicationRecord, ApplicationStatus, ReviewAnnotations},
  user::Role,
};

pub const TUTOR_APPROVE_DEFAULT: &str = "APROBADO POR EL TUTOR";
pub const ADMIN_APPROVE_DEFAULT: &str = "CERTIFICADO APROBADO SATISFACTORIAMENTE";
pub const ADMIN_REVIEW_DEFAULT: &str = "SOLICITUD EN PROCESO DE REVISIÓN";
pub const ADMIN_PENDING_DEFAULT: &str = "SOLICITUD PENDIENTE DE REVISIÓN";

// ─── Actions ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  TutorApprove,
  TutorReject,
  TutorReturn,
  AdminApprove,
  AdminReject,
  AdminMarkReview,
  AdminMarkPending,
}

impl Action {
  pub fn required_role(self) -> Role {
    match self {
      Self::TutorApprove | Self::TutorReject | Self::TutorReturn => Role::Tutor,
      _ => Role::Admin,
    }
  }

  pub fn target(self) -> ApplicationStatus {
    match self {
      Self::TutorApprove => ApplicationStatus::TutorApproved,
      Self::TutorReject => ApplicationStatus::TutorRejected,
      Self::TutorReturn => ApplicationStatus::ReturnedToStudent,
      Self::AdminApprove => ApplicationStatus::Approved,
      Self::AdminReject => ApplicationStatus::Rejected,
      Self::AdminMarkReview => ApplicationStatus::UnderReview,
      Self::AdminMarkPending => ApplicationStatus::Pending,
    }
  }

  /// Rejections and returns must carry a reason.
  pub fn requires_reason(self) -> bool {
    matches!(self, Self::TutorReject | Self::TutorReturn | Self::AdminReject)
  }

  /// Text stored when the optional comment is left blank.
  pub fn default_comment(self) -> Option<&'static str> {
    match self {
      Self::TutorApprove => Some(TUTOR_APPROVE_DEFAULT),
      Self::AdminApprove => Some(ADMIN_APPROVE_DEFAULT),
      Self::AdminMarkReview => Some(ADMIN_REVIEW_DEFAULT),
      Self::AdminMarkPending => Some(ADMIN_PENDING_DEFAULT),
      _ => None,
    }
  }

  /// Whether the action is legal from `from`, ignoring who performs it.
  pub fn is_legal_from(self, from: ApplicationStatus) -> bool {
    match self.required_role() {
      Role::Tutor => from.is_tutor_reviewable(),
      _ => true,
    }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Who is acting: a principal id with its resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
  pub principal_id: String,
  pub role:         Role,
}

impl Actor {
  pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
    Self { principal_id: principal_id.into(), role }
  }
}

/// A transition command as issued by a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
  pub action:            Action,
  #[serde(default)]
  pub comment:           Option<String>,
  /// Compare-and-swap guard. When absent the write is last-writer-wins.
  #[serde(default)]
  pub expected_revision: Option<u64>,
}

impl TransitionRequest {
  pub fn new(action: Action) -> Self {
    Self { action, comment: None, expected_revision: None }
  }

  pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
    self.comment = Some(comment.into());
    self
  }
}

// ─── Transition ──────────────────────────────────────────────────────────────

/// A validated status change, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
  pub action: Action,
  pub from:   ApplicationStatus,
  pub to:     ApplicationStatus,
  pub at:     DateTime<Utc>,
  pub patch:  ReviewAnnotations,
}

impl Transition {
  /// Apply to an in-memory copy the same way the store applies it.
  pub fn apply_to(&self, record: &mut ApplicationRecord) {
    record.status = self.to;
    record.updated_at = self.at;
    record.review.merge(&self.patch);
    record.revision += 1;
  }
}

/// Validate `action` by `actor` against `record` and build the transition.
pub fn plan(
  record: &ApplicationRecord,
  actor: &Actor,
  action: Action,
  comment: Option<&str>,
  now: DateTime<Utc>,
) -> Result<Transition> {
  if actor.role != action.required_role() {
    return Err(Error::Forbidden {
      role:      actor.role,
      operation: action.to_string(),
    });
  }
  if !action.is_legal_from(record.status) {
    return Err(Error::IllegalTransition { from: record.status, action });
  }

  let comment = comment.map(str::trim).filter(|c| !c.is_empty());
  if action.requires_reason() && comment.is_none() {
    return Err(Error::BlankReason(action));
  }
  let text = comment
    .or(action.default_comment())
    .map(str::to_owned);

  let mut patch = ReviewAnnotations::default();
  match action {
    Action::TutorApprove => {
      patch.tutor_approved_at = Some(now);
      patch.tutor_comments = text;
    }
    Action::TutorReject => {
      patch.tutor_rejected_at = Some(now);
      patch.tutor_comments = text;
    }
    Action::TutorReturn => {
      patch.returned_to_student_at = Some(now);
      patch.tutor_return_comments = text;
      patch.requires_student_action = Some(true);
    }
    Action::AdminApprove => {
      patch.approved_at = Some(now);
      patch.approved_by = Some(actor.principal_id.clone());
      patch.admin_comments = text;
    }
    Action::AdminReject => {
      patch.rejected_at = Some(now);
      patch.rejected_by = Some(actor.principal_id.clone());
      patch.rejection_reason = text;
    }
    Action::AdminMarkReview => {
      patch.under_review_at = Some(now);
      patch.admin_comments = text;
    }
    Action::AdminMarkPending => {
      patch.admin_comments = text;
    }
  }

  Ok(Transition {
    action,
    from: record.status,
    to: action.target(),
    at: now,
    patch,
  })
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, NaiveDate};
  use strum::IntoEnumIterator as _;
  use uuid::Uuid;

  use super::*;
  use crate::{application::tests::payload, user::Principal};

  fn record(status: ApplicationStatus) -> ApplicationRecord {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let draft = payload(start, end)
      .into_draft(&Principal::new("stu-1"), Utc::now(), "TRF-A-1".into())
      .unwrap();
    let mut r = ApplicationRecord::from_draft(Uuid::new_v4(), draft);
    r.status = status;
    r
  }

  fn tutor() -> Actor { Actor::new("tut-1", Role::Tutor) }
  fn admin() -> Actor { Actor::new("adm-1", Role::Admin) }

  #[test]
  fn tutor_actions_from_reviewable_states() {
    for from in [
      ApplicationStatus::Pending,
      ApplicationStatus::ChangesRequested,
      ApplicationStatus::ReturnedToStudent,
    ] {
      let t = plan(&record(from), &tutor(), Action::TutorApprove, None, Utc::now()).unwrap();
      assert_eq!(t.to, ApplicationStatus::TutorApproved);
      assert_eq!(t.from, from);
    }
  }

  #[test]
  fn tutor_cannot_act_on_non_reviewable_states() {
    for from in ApplicationStatus::iter().filter(|s| !s.is_tutor_reviewable()) {
      let err = plan(&record(from), &tutor(), Action::TutorApprove, None, Utc::now())
        .unwrap_err();
      assert!(matches!(err, Error::IllegalTransition { .. }), "{from}");
      assert!(err.is_authorization());
    }
  }

  #[test]
  fn admin_actions_from_any_state() {
    let admin_actions = Role::Admin.allowed_actions();
    for from in ApplicationStatus::iter() {
      for &action in &admin_actions {
        let t = plan(&record(from), &admin(), action, Some("x"), Utc::now()).unwrap();
        assert_eq!(t.to, action.target());
      }
    }
  }

  #[test]
  fn roles_are_enforced() {
    let r = record(ApplicationStatus::Pending);
    let student = Actor::new("stu-1", Role::Student);

    for action in Action::iter() {
      assert!(matches!(
        plan(&r, &student, action, Some("x"), Utc::now()),
        Err(Error::Forbidden { role: Role::Student, .. })
      ));
    }
    assert!(matches!(
      plan(&r, &tutor(), Action::AdminApprove, None, Utc::now()),
      Err(Error::Forbidden { role: Role::Tutor, .. })
    ));
    assert!(matches!(
      plan(&r, &admin(), Action::TutorApprove, None, Utc::now()),
      Err(Error::Forbidden { role: Role::Admin, .. })
    ));
  }

  #[test]
  fn blank_reasons_are_rejected() {
    let r = record(ApplicationStatus::Pending);
    for (actor, action) in [
      (tutor(), Action::TutorReject),
      (tutor(), Action::TutorReturn),
      (admin(), Action::AdminReject),
    ] {
      for reason in [None, Some(""), Some("   \t")] {
        let err = plan(&r, &actor, action, reason, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::BlankReason(a) if a == action));
        assert!(err.is_validation());
      }
    }
  }

  #[test]
  fn tutor_return_sets_student_action_flag() {
    let now = Utc::now();
    let t = plan(
      &record(ApplicationStatus::Pending),
      &tutor(),
      Action::TutorReturn,
      Some("  falta la firma  "),
      now,
    )
    .unwrap();
    assert_eq!(t.to, ApplicationStatus::ReturnedToStudent);
    assert_eq!(t.patch.returned_to_student_at, Some(now));
    assert_eq!(t.patch.tutor_return_comments.as_deref(), Some("falta la firma"));
    assert_eq!(t.patch.requires_student_action, Some(true));
  }

  #[test]
  fn tutor_reject_records_reason_as_comment() {
    let t = plan(
      &record(ApplicationStatus::Pending),
      &tutor(),
      Action::TutorReject,
      Some("documento ilegible"),
      Utc::now(),
    )
    .unwrap();
    assert_eq!(t.patch.tutor_comments.as_deref(), Some("documento ilegible"));
    assert!(t.patch.tutor_rejected_at.is_some());
  }

  #[test]
  fn admin_approve_without_comment_uses_default_text() {
    let now = Utc::now();
    let mut r = record(ApplicationStatus::TutorApproved);
    let t = plan(&r, &admin(), Action::AdminApprove, None, now).unwrap();
    t.apply_to(&mut r);

    assert_eq!(r.status, ApplicationStatus::Approved);
    assert_eq!(r.review.admin_comments.as_deref(), Some(ADMIN_APPROVE_DEFAULT));
    assert_eq!(r.review.approved_at, Some(now));
    assert_eq!(r.review.approved_by.as_deref(), Some("adm-1"));
    assert_eq!(r.updated_at, now);
    assert_eq!(r.revision, 2);
  }

  #[test]
  fn admin_reject_records_who_and_why() {
    let t = plan(
      &record(ApplicationStatus::UnderReview),
      &admin(),
      Action::AdminReject,
      Some("fechas inconsistentes"),
      Utc::now(),
    )
    .unwrap();
    assert_eq!(t.patch.rejection_reason.as_deref(), Some("fechas inconsistentes"));
    assert_eq!(t.patch.rejected_by.as_deref(), Some("adm-1"));
    assert!(t.patch.admin_comments.is_none());
  }

  #[test]
  fn mark_pending_and_review_default_texts() {
    let r = record(ApplicationStatus::Approved);
    let t = plan(&r, &admin(), Action::AdminMarkPending, None, Utc::now()).unwrap();
    assert_eq!(t.to, ApplicationStatus::Pending);
    assert_eq!(t.patch.admin_comments.as_deref(), Some(ADMIN_PENDING_DEFAULT));

    let t = plan(&r, &admin(), Action::AdminMarkReview, Some(""), Utc::now()).unwrap();
    assert_eq!(t.patch.admin_comments.as_deref(), Some(ADMIN_REVIEW_DEFAULT));
    assert!(t.patch.under_review_at.is_some());
  }

  #[test]
  fn repeating_a_transition_overwrites_side_effects() {
    let t0 = Utc::now();
    let t1 = t0 + Duration::seconds(5);
    let mut r = record(ApplicationStatus::Pending);

    plan(&r, &admin(), Action::AdminApprove, Some("ok"), t0)
      .unwrap()
      .apply_to(&mut r);
    let first = r.review.clone();
    plan(&r, &admin(), Action::AdminApprove, Some("ok"), t1)
      .unwrap()
      .apply_to(&mut r);

    assert_eq!(r.status, ApplicationStatus::Approved);
    assert_eq!(r.review.admin_comments, first.admin_comments);
    assert_eq!(r.review.approved_by, first.approved_by);
    assert_eq!(r.review.approved_at, Some(t1));
  }

  #[test]
  fn request_deserializes_with_optional_fields() {
    let req: TransitionRequest =
      serde_json::from_str(r#"{"action":"tutor_return","comment":"corregir"}"#).unwrap();
    assert_eq!(req.action, Action::TutorReturn);
    assert_eq!(req.comment.as_deref(), Some("corregir"));
    assert_eq!(req.expected_revision, None);
  }
}
