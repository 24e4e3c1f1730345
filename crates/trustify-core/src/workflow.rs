//! Store-backed workflow operations.
//!
//! Each function resolves to a single authoritative path: check the rules in
//! [`crate::transition`] and [`crate::identity`], then write through the
//! store. HTTP handlers and tests call these instead of the store directly.

use chrono::{DateTime, SubsecRound as _, Utc};
use rand_core::OsRng;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error,
  application::{ApplicationRecord, NewApplication, generate_verification_code},
  certificate::Certificate,
  identity::authorize_user_admin,
  store::{ApplicationFilter, CertificationStore, TransitionOutcome},
  transition::{Actor, TransitionRequest, plan},
  user::{Principal, Role, UserRecord},
};

/// Either a rule violation or a backend failure.
#[derive(Debug, Error)]
pub enum WorkflowError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error(transparent)]
  Rule(#[from] Error),

  #[error("store error: {0}")]
  Store(#[source] E),
}

pub type WorkflowResult<T, E> = std::result::Result<T, WorkflowError<E>>;

/// The current time at the precision stores persist, microseconds.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// Restrict `filter` to what `actor` may read. Students only ever see their
/// own applications; tutors and admins see everything.
pub fn scope_filter(actor: &Actor, mut filter: ApplicationFilter) -> ApplicationFilter {
  if actor.role == Role::Student {
    filter.student_id = Some(actor.principal_id.clone());
  }
  filter
}

/// Submit a new application on behalf of `principal`.
pub async fn submit<S>(
  store: &S,
  actor: &Actor,
  principal: &Principal,
  payload: NewApplication,
) -> WorkflowResult<ApplicationRecord, S::Error>
where
  S: CertificationStore,
{
  if actor.role != Role::Student {
    return Err(
      Error::Forbidden { role: actor.role, operation: "submit".into() }.into(),
    );
  }
  let submitted_at = now();
  let code = generate_verification_code(submitted_at, &mut OsRng);
  let draft = payload.into_draft(principal, submitted_at, code)?;

  let record = store
    .insert_application(draft)
    .await
    .map_err(WorkflowError::Store)?;
  info!(
    application = %record.id,
    student = %record.student_id,
    code = %record.verification_code,
    "application submitted"
  );
  Ok(record)
}

/// Fetch an application `actor` is allowed to see. Other students' records
/// are reported as not found.
pub async fn visible_application<S>(
  store: &S,
  actor: &Actor,
  id: Uuid,
) -> WorkflowResult<ApplicationRecord, S::Error>
where
  S: CertificationStore,
{
  let record = store
    .get_application(id)
    .await
    .map_err(WorkflowError::Store)?
    .ok_or(Error::ApplicationNotFound(id))?;
  if actor.role == Role::Student && record.student_id != actor.principal_id {
    return Err(Error::ApplicationNotFound(id).into());
  }
  Ok(record)
}

/// Validate and persist a status transition.
pub async fn transition<S>(
  store: &S,
  actor: &Actor,
  id: Uuid,
  request: &TransitionRequest,
) -> WorkflowResult<ApplicationRecord, S::Error>
where
  S: CertificationStore,
{
  let current = visible_application(store, actor, id).await?;
  let transition = plan(
    &current,
    actor,
    request.action,
    request.comment.as_deref(),
    now(),
  )?;

  match store
    .apply_transition(id, &transition, request.expected_revision)
    .await
    .map_err(WorkflowError::Store)?
  {
    TransitionOutcome::Applied(record) => {
      info!(
        application = %id,
        actor = %actor.principal_id,
        action = %transition.action,
        from = %transition.from,
        to = %transition.to,
        "status transition"
      );
      Ok(record)
    }
    TransitionOutcome::NotFound => Err(Error::ApplicationNotFound(id).into()),
    TransitionOutcome::Conflict { actual } => Err(
      Error::RevisionConflict {
        id,
        expected: request.expected_revision.unwrap_or_default(),
        actual,
      }
      .into(),
    ),
  }
}

/// The certificate for an approved application visible to `actor`.
pub async fn certificate<S>(
  store: &S,
  actor: &Actor,
  id: Uuid,
) -> WorkflowResult<Certificate, S::Error>
where
  S: CertificationStore,
{
  let record = visible_application(store, actor, id).await?;
  Ok(Certificate::from_record(&record)?)
}

pub async fn list_users<S>(
  store: &S,
  actor: &Actor,
) -> WorkflowResult<Vec<UserRecord>, S::Error>
where
  S: CertificationStore,
{
  authorize_user_admin(actor, "list users")?;
  store.list_users().await.map_err(WorkflowError::Store)
}

pub async fn change_role<S>(
  store: &S,
  actor: &Actor,
  user_id: &str,
  role: Role,
) -> WorkflowResult<UserRecord, S::Error>
where
  S: CertificationStore,
{
  authorize_user_admin(actor, "change role")?;
  let user = store
    .set_user_role(user_id, role)
    .await
    .map_err(WorkflowError::Store)?
    .ok_or_else(|| Error::UserNotFound(user_id.to_owned()))?;
  info!(user = %user_id, actor = %actor.principal_id, %role, "role changed");
  Ok(user)
}

/// Hard-delete a user record. The principal is re-created as a student on
/// its next role lookup.
pub async fn delete_user<S>(
  store: &S,
  actor: &Actor,
  user_id: &str,
) -> WorkflowResult<(), S::Error>
where
  S: CertificationStore,
{
  authorize_user_admin(actor, "delete user")?;
  if !store.delete_user(user_id).await.map_err(WorkflowError::Store)? {
    return Err(Error::UserNotFound(user_id.to_owned()).into());
  }
  info!(user = %user_id, actor = %actor.principal_id, "user deleted");
  Ok(())
}
