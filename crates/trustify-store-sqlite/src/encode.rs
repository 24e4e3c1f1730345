//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order matches chronological order. Review annotations are
//! stored as one compact JSON object per application.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use trustify_core::{
  application::{ApplicationRecord, ApplicationStatus, ReviewAnnotations},
  user::{Role, UserRecord},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<Role> {
  s.parse()
    .map_err(|_| trustify_core::Error::UnknownRole(s.to_owned()).into())
}

// ─── Review annotations ──────────────────────────────────────────────────────

/// Encode a transition patch as a JSON merge patch: only the fields the
/// transition sets are present, so applying it leaves the others untouched.
pub fn encode_review_patch(patch: &ReviewAnnotations) -> Result<String> {
  let mut value = serde_json::to_value(patch)?;
  if let Some(map) = value.as_object_mut() {
    map.retain(|_, v| !v.is_null());
  }
  Ok(value.to_string())
}

pub fn decode_review(s: &str) -> Result<ReviewAnnotations> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawApplication::from_row`].
pub const APPLICATION_COLUMNS: &str = "
  application_id, student_id, student_email, student_name, first_name,
  last_name, document_number, institution, program, plant_type,
  plant_location, activities, start_date, end_date, status,
  verification_code, created_at, updated_at, revision, review_json";

/// Raw strings read directly from an `applications` row.
pub struct RawApplication {
  pub application_id:    String,
  pub student_id:        String,
  pub student_email:     Option<String>,
  pub student_name:      String,
  pub first_name:        String,
  pub last_name:         String,
  pub document_number:   String,
  pub institution:       String,
  pub program:           String,
  pub plant_type:        String,
  pub plant_location:    String,
  pub activities:        String,
  pub start_date:        String,
  pub end_date:          String,
  pub status:            Option<String>,
  pub verification_code: String,
  pub created_at:        String,
  pub updated_at:        String,
  pub revision:          i64,
  pub review_json:       String,
}

impl RawApplication {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      application_id:    row.get(0)?,
      student_id:        row.get(1)?,
      student_email:     row.get(2)?,
      student_name:      row.get(3)?,
      first_name:        row.get(4)?,
      last_name:         row.get(5)?,
      document_number:   row.get(6)?,
      institution:       row.get(7)?,
      program:           row.get(8)?,
      plant_type:        row.get(9)?,
      plant_location:    row.get(10)?,
      activities:        row.get(11)?,
      start_date:        row.get(12)?,
      end_date:          row.get(13)?,
      status:            row.get(14)?,
      verification_code: row.get(15)?,
      created_at:        row.get(16)?,
      updated_at:        row.get(17)?,
      revision:          row.get(18)?,
      review_json:       row.get(19)?,
    })
  }

  pub fn into_record(self) -> Result<ApplicationRecord> {
    Ok(ApplicationRecord {
      id:                decode_uuid(&self.application_id)?,
      student_id:        self.student_id,
      student_email:     self.student_email,
      student_name:      self.student_name,
      first_name:        self.first_name,
      last_name:         self.last_name,
      document_number:   self.document_number,
      institution:       self.institution,
      program:           self.program,
      plant_type:        self.plant_type,
      plant_location:    self.plant_location,
      activities:        self.activities,
      start_date:        decode_date(&self.start_date)?,
      end_date:          decode_date(&self.end_date)?,
      status:            ApplicationStatus::from_stored(self.status.as_deref())?,
      verification_code: self.verification_code,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
      revision:          u64::try_from(self.revision).unwrap_or_default(),
      review:            decode_review(&self.review_json)?,
    })
  }
}

/// Column list matching [`RawUser::from_row`].
pub const USER_COLUMNS: &str = "user_id, email, name, role, created_at";

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:    String,
  pub email:      Option<String>,
  pub name:       String,
  pub role:       String,
  pub created_at: String,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(0)?,
      email:      row.get(1)?,
      name:       row.get(2)?,
      role:       row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_user(self) -> Result<UserRecord> {
    Ok(UserRecord {
      id:         self.user_id,
      email:      self.email,
      name:       self.name,
      role:       decode_role(&self.role)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
