//! Binding authenticated principals to workflow roles.
//!
//! The role is looked up in the store on every call. Nothing is cached, so
//! a role change made by an admin applies to the affected principal's very
//! next request.

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  store::CertificationStore,
  transition::Actor,
  user::{Principal, Role, UserRecord},
};

/// Return the user record for `principal`, creating it with role `student`
/// on first sight.
pub async fn bind<S>(store: &S, principal: &Principal) -> Result<UserRecord, S::Error>
where
  S: CertificationStore,
{
  if let Some(user) = store.get_user(&principal.id).await? {
    return Ok(user);
  }
  debug!(principal = %principal.id, "first login, creating user record");
  store
    .get_or_insert_user(UserRecord::first_login(principal, Utc::now()))
    .await
}

/// Resolve the current role of `principal`.
///
/// Lookup failures fall back to `student`, the least-privileged role, rather
/// than blocking the caller.
pub async fn resolve_role<S>(store: &S, principal: &Principal) -> Role
where
  S: CertificationStore,
{
  match bind(store, principal).await {
    Ok(user) => user.role,
    Err(e) => {
      warn!(principal = %principal.id, error = %e, "role lookup failed, defaulting to student");
      Role::Student
    }
  }
}

pub async fn resolve_actor<S>(store: &S, principal: &Principal) -> Actor
where
  S: CertificationStore,
{
  Actor::new(principal.id.clone(), resolve_role(store, principal).await)
}

/// Role changes and user deletion are reserved to admins.
pub fn authorize_user_admin(actor: &Actor, operation: &str) -> Result<()> {
  if actor.role == Role::Admin {
    Ok(())
  } else {
    Err(Error::Forbidden { role: actor.role, operation: operation.to_owned() })
  }
}
