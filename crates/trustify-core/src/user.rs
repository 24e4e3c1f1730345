//! Users, roles, and the authenticated principal.
//!
//! Authentication itself is handled by an external provider. What reaches
//! this crate is a [`Principal`]: an opaque id plus whatever profile data the
//! provider vouched for. The role attached to a principal lives in the
//! `users` collection and is resolved by [`crate::identity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;

use crate::transition::Action;

/// The three workflow roles.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  #[default]
  Student,
  Tutor,
  Admin,
}

impl Role {
  /// The transition actions this role may invoke, in declaration order.
  pub fn allowed_actions(self) -> Vec<Action> {
    Action::iter().filter(|a| a.required_role() == self).collect()
  }
}

/// An identity vouched for by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub id:    String,
  pub email: Option<String>,
  pub name:  Option<String>,
}

impl Principal {
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), email: None, name: None }
  }

  /// Display name, falling back to the email address and then a fixed
  /// placeholder when the provider supplied neither.
  pub fn display_name(&self) -> String {
    self
      .name
      .as_deref()
      .map(str::trim)
      .filter(|n| !n.is_empty())
      .or_else(|| self.email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
      .unwrap_or("Usuario")
      .to_owned()
  }
}

/// A row of the `users` collection, keyed by principal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
  pub id:         String,
  pub email:      Option<String>,
  pub name:       String,
  #[serde(default)]
  pub role:       Role,
  pub created_at: DateTime<Utc>,
}

impl UserRecord {
  /// The record created the first time a principal is seen.
  pub fn first_login(principal: &Principal, now: DateTime<Utc>) -> Self {
    Self {
      id:         principal.id.clone(),
      email:      principal.email.clone(),
      name:       principal.display_name(),
      role:       Role::Student,
      created_at: now,
    }
  }
}
