//! Transition dispatch.
//!
//! One verb maps to a tutor or an admin action depending on who is asking.
//! The dispatcher refuses a second command for a record while the first is
//! still unresolved, and reports every outcome on the notification bus.

use futures_util::future::join_all;
use tracing::debug;
use trustify_core::{
  dashboard::InFlight,
  transition::{Action, TransitionRequest},
  user::Role,
};
use uuid::Uuid;

use crate::{client::ApiClient, notify::Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
  Approve,
  Reject,
  Return,
  Review,
  Pending,
}

impl Verb {
  pub fn label(self) -> &'static str {
    match self {
      Verb::Approve => "approve",
      Verb::Reject => "reject",
      Verb::Return => "return",
      Verb::Review => "review",
      Verb::Pending => "pending",
    }
  }
}

/// The action `verb` means for `role`, if that role has one.
pub fn resolve_action(role: Role, verb: Verb) -> Option<Action> {
  match (role, verb) {
    (Role::Tutor, Verb::Approve) => Some(Action::TutorApprove),
    (Role::Tutor, Verb::Reject) => Some(Action::TutorReject),
    (Role::Tutor, Verb::Return) => Some(Action::TutorReturn),
    (Role::Admin, Verb::Approve) => Some(Action::AdminApprove),
    (Role::Admin, Verb::Reject) => Some(Action::AdminReject),
    (Role::Admin, Verb::Review) => Some(Action::AdminMarkReview),
    (Role::Admin, Verb::Pending) => Some(Action::AdminMarkPending),
    _ => None,
  }
}

#[derive(Clone)]
pub struct Dispatcher {
  client:    ApiClient,
  in_flight: InFlight,
  notifier:  Notifier,
}

impl Dispatcher {
  pub fn new(client: ApiClient, notifier: Notifier) -> Self {
    Self { client, in_flight: InFlight::default(), notifier }
  }

  pub fn in_flight(&self) -> &InFlight { &self.in_flight }

  /// Send one transition. Returns whether it was applied.
  pub async fn transition(&self, id: Uuid, request: TransitionRequest) -> bool {
    let _guard = match self.in_flight.begin(id) {
      Ok(guard) => guard,
      Err(e) => {
        self.notifier.error(e.to_string());
        return false;
      }
    };

    match self.client.transition(id, &request).await {
      Ok(record) => {
        debug!(%id, action = %request.action, status = %record.status, "transition applied");
        self.notifier.success(format!(
          "{} {} -> {}",
          record.verification_code, request.action, record.status
        ));
        true
      }
      Err(e) => {
        self.notifier.error(format!("{id}: {e:#}"));
        false
      }
    }
  }

  /// Send the same transition for several records concurrently. Returns the
  /// number that failed.
  pub async fn transition_all(&self, ids: &[Uuid], request: &TransitionRequest) -> usize {
    let outcomes = join_all(
      ids
        .iter()
        .map(|id| self.transition(*id, request.clone())),
    )
    .await;
    outcomes.into_iter().filter(|applied| !applied).count()
  }
}
