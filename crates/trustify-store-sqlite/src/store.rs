//! [`SqliteStore`]: the SQLite implementation of [`CertificationStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, types::Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use trustify_core::{
  application::{ApplicationDraft, ApplicationRecord},
  store::{
    ApplicationFilter, ApplicationQuery, CertificationStore, Subscription,
    SubscriptionEvent, TransitionOutcome,
  },
  transition::Transition,
  user::{Role, UserRecord},
};

use crate::{
  Result,
  encode::{
    APPLICATION_COLUMNS, RawApplication, RawUser, USER_COLUMNS, encode_date, encode_dt,
    encode_review_patch, encode_uuid,
  },
  schema::SCHEMA,
};

/// How many unread changes a subscriber may fall behind before it is told
/// to resync.
const CHANGE_BUFFER: usize = 256;

/// Searchable text columns; matched with a case-insensitive `LIKE`.
const SEARCH_COLUMNS: [&str; 7] = [
  "student_name",
  "document_number",
  "institution",
  "program",
  "plant_location",
  "COALESCE(status, 'pending')",
  "verification_code",
];

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Trustify store backed by a single SQLite file.
///
/// Cloning is cheap. Clones share the connection and the change feed.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  changes: broadcast::Sender<ApplicationRecord>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    let (changes, _) = broadcast::channel(CHANGE_BUFFER);
    Ok(Self { conn, changes })
  }

  /// Push a committed record to live subscribers. Having none is fine.
  fn publish(&self, record: &ApplicationRecord) {
    let _ = self.changes.send(record.clone());
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }
}

fn select_application(
  conn: &rusqlite::Connection,
  id_str: &str,
) -> rusqlite::Result<Option<RawApplication>> {
  conn
    .query_row(
      &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE application_id = ?1"),
      rusqlite::params![id_str],
      RawApplication::from_row,
    )
    .optional()
}

fn select_user(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawUser>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
      rusqlite::params![id],
      RawUser::from_row,
    )
    .optional()
}

/// Escape `LIKE` wildcards so user input matches literally.
fn like_pattern(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len() + 2);
  escaped.push('%');
  for c in text.to_uppercase().chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

/// Build the `WHERE` clause and positional parameters for a query.
fn build_where(query: &ApplicationQuery) -> (String, Vec<Value>) {
  let mut conds: Vec<String> = vec![];
  let mut params: Vec<Value> = vec![];

  if let Some(student) = &query.filter.student_id {
    conds.push("student_id = ?".into());
    params.push(Value::Text(student.clone()));
  }
  if !query.filter.statuses.is_empty() {
    let marks = vec!["?"; query.filter.statuses.len()].join(", ");
    conds.push(format!("COALESCE(status, 'pending') IN ({marks})"));
    params.extend(
      query
        .filter
        .statuses
        .iter()
        .map(|s| Value::Text(s.as_ref().to_owned())),
    );
  }
  if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
    let pattern = like_pattern(text);
    let any = SEARCH_COLUMNS
      .iter()
      .map(|col| format!("{col} LIKE ? ESCAPE '\\'"))
      .collect::<Vec<_>>()
      .join(" OR ");
    conds.push(format!("({any})"));
    params.extend(SEARCH_COLUMNS.iter().map(|_| Value::Text(pattern.clone())));
  }
  if let Some(after) = query.created_after {
    conds.push("created_at >= ?".into());
    params.push(Value::Text(encode_dt(after)));
  }
  if let Some(before) = query.created_before {
    conds.push("created_at < ?".into());
    params.push(Value::Text(encode_dt(before)));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (where_clause, params)
}

// ─── CertificationStore impl ─────────────────────────────────────────────────

impl CertificationStore for SqliteStore {
  type Error = crate::Error;
  type Subscription = SqliteSubscription;

  // ── Applications ──────────────────────────────────────────────────────────

  /// Returns the row as stored, so timestamps carry the column precision
  /// every later read will see.
  async fn insert_application(&self, draft: ApplicationDraft) -> Result<ApplicationRecord> {
    let r = ApplicationRecord::from_draft(Uuid::new_v4(), draft);

    let id_str = encode_uuid(r.id);
    let start = encode_date(r.start_date);
    let end = encode_date(r.end_date);
    let created = encode_dt(r.created_at);
    let updated = encode_dt(r.updated_at);
    let status = r.status.as_ref().to_owned();
    let revision = r.revision as i64;

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO applications (
             application_id, student_id, student_email, student_name, first_name,
             last_name, document_number, institution, program, plant_type,
             plant_location, activities, start_date, end_date, status,
             verification_code, created_at, updated_at, revision, review_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, '{}')",
          rusqlite::params![
            id_str,
            r.student_id,
            r.student_email,
            r.student_name,
            r.first_name,
            r.last_name,
            r.document_number,
            r.institution,
            r.program,
            r.plant_type,
            r.plant_location,
            r.activities,
            start,
            end,
            status,
            r.verification_code,
            created,
            updated,
            revision,
          ],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE application_id = ?1"),
          rusqlite::params![id_str],
          RawApplication::from_row,
        )?)
      })
      .await?;

    let record = raw.into_record()?;
    self.publish(&record);
    Ok(record)
  }

  async fn get_application(&self, id: Uuid) -> Result<Option<ApplicationRecord>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_application(conn, &id_str)?))
      .await?;
    raw.map(RawApplication::into_record).transpose()
  }

  async fn find_by_verification_code<'a>(
    &'a self,
    code: &'a str,
  ) -> Result<Option<ApplicationRecord>> {
    let code = code.trim().to_uppercase();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {APPLICATION_COLUMNS} FROM applications WHERE verification_code = ?1"
              ),
              rusqlite::params![code],
              RawApplication::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawApplication::into_record).transpose()
  }

  async fn query_applications<'a>(
    &'a self,
    query: &'a ApplicationQuery,
  ) -> Result<Vec<ApplicationRecord>> {
    let (where_clause, mut params) = build_where(query);
    params.push(Value::Integer(query.limit.map_or(-1, |l| l as i64)));
    params.push(Value::Integer(query.offset.unwrap_or(0) as i64));

    let raws: Vec<RawApplication> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {APPLICATION_COLUMNS}
           FROM applications
           {where_clause}
           ORDER BY created_at DESC, application_id DESC
           LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawApplication::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawApplication::into_record).collect()
  }

  async fn apply_transition<'a>(
    &'a self,
    id: Uuid,
    transition: &'a Transition,
    expected_revision: Option<u64>,
  ) -> Result<TransitionOutcome> {
    enum Raw {
      Applied(RawApplication),
      NotFound,
      Conflict(i64),
    }

    let id_str = encode_uuid(id);
    let status = transition.to.as_ref().to_owned();
    let at = encode_dt(transition.at);
    let patch = encode_review_patch(&transition.patch)?;
    let expected = expected_revision.map(|r| r as i64);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE applications
           SET status      = ?2,
               updated_at  = ?3,
               review_json = json_patch(review_json, ?4),
               revision    = revision + 1
           WHERE application_id = ?1
             AND (?5 IS NULL OR revision = ?5)",
          rusqlite::params![id_str, status, at, patch, expected],
        )?;

        let outcome = if changed == 0 {
          let actual: Option<i64> = tx
            .query_row(
              "SELECT revision FROM applications WHERE application_id = ?1",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?;
          match actual {
            Some(actual) => Raw::Conflict(actual),
            None => Raw::NotFound,
          }
        } else {
          match select_application(&tx, &id_str)? {
            Some(row) => Raw::Applied(row),
            None => Raw::NotFound,
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match raw {
      Raw::Applied(row) => {
        let record = row.into_record()?;
        self.publish(&record);
        Ok(TransitionOutcome::Applied(record))
      }
      Raw::NotFound => Ok(TransitionOutcome::NotFound),
      Raw::Conflict(actual) => Ok(TransitionOutcome::Conflict {
        actual: u64::try_from(actual).unwrap_or_default(),
      }),
    }
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn get_user<'a>(&'a self, id: &'a str) -> Result<Option<UserRecord>> {
    let id = id.to_owned();
    let raw = self
      .conn
      .call(move |conn| Ok(select_user(conn, &id)?))
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn get_or_insert_user(&self, user: UserRecord) -> Result<UserRecord> {
    let created = encode_dt(user.created_at);
    let role = user.role.as_ref().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO users (user_id, email, name, role, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![user.id, user.email, user.name, role, created],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
          rusqlite::params![user.id],
          RawUser::from_row,
        )?)
      })
      .await?;

    raw.into_user()
  }

  async fn list_users(&self) -> Result<Vec<UserRecord>> {
    let raws: Vec<RawUser> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, user_id"
        ))?;
        let rows = stmt
          .query_map([], RawUser::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn set_user_role<'a>(&'a self, id: &'a str, role: Role) -> Result<Option<UserRecord>> {
    let id = id.to_owned();
    let role = role.as_ref().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE users SET role = ?2 WHERE user_id = ?1",
          rusqlite::params![id, role],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_user(conn, &id)?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn delete_user<'a>(&'a self, id: &'a str) -> Result<bool> {
    let id = id.to_owned();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM users WHERE user_id = ?1", rusqlite::params![id])?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Live reads ────────────────────────────────────────────────────────────

  fn subscribe(&self, filter: ApplicationFilter) -> SqliteSubscription {
    SqliteSubscription { filter, rx: self.changes.subscribe() }
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// A filtered view of the store's change feed.
pub struct SqliteSubscription {
  filter: ApplicationFilter,
  rx:     broadcast::Receiver<ApplicationRecord>,
}

impl Subscription for SqliteSubscription {
  async fn next(&mut self) -> Option<SubscriptionEvent> {
    loop {
      match self.rx.recv().await {
        Ok(record) if self.filter.matches(&record) => {
          return Some(SubscriptionEvent::Changed(record));
        }
        Ok(_) => continue,
        Err(RecvError::Lagged(missed)) => {
          debug!(missed, "subscriber lagged, requesting resync");
          return Some(SubscriptionEvent::Resync);
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }
}
