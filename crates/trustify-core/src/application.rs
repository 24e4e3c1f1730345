//! Application records. Each one is a single internship-certification request.
//!
//! A record is created once by a student submission and afterwards changes
//! only through [`crate::transition`]. `id`, `student_id`,
//! `verification_code` and `created_at` never change after creation.

use chrono::{DateTime, Datelike as _, Months, NaiveDate, Utc};
use rand_core::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{Error, Result, user::Principal};

/// Shortest accepted internship, in calendar months (inclusive).
pub const MIN_DURATION_MONTHS: u32 = 6;
/// Longest accepted internship, in calendar months (inclusive).
pub const MAX_DURATION_MONTHS: u32 = 9;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where an application stands in the review workflow.
///
/// A record with no stored status is `Pending`.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApplicationStatus {
  #[default]
  Pending,
  UnderReview,
  TutorApproved,
  TutorRejected,
  ChangesRequested,
  ReturnedToStudent,
  Approved,
  Rejected,
}

impl ApplicationStatus {
  /// `approved` and `rejected` end the normal flow. Admin overrides remain
  /// available from them.
  pub fn is_terminal(self) -> bool { matches!(self, Self::Approved | Self::Rejected) }

  /// States from which a tutor may approve, reject or return.
  pub fn is_tutor_reviewable(self) -> bool {
    matches!(
      self,
      Self::Pending | Self::ChangesRequested | Self::ReturnedToStudent
    )
  }

  /// Decode a stored status column, treating `NULL` as `Pending`.
  pub fn from_stored(raw: Option<&str>) -> Result<Self> {
    match raw {
      None => Ok(Self::Pending),
      Some(s) => s.parse().map_err(|_| Error::UnknownStatus(s.to_owned())),
    }
  }
}

fn status_or_pending<'de, D>(d: D) -> Result<ApplicationStatus, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<ApplicationStatus>::deserialize(d)?.unwrap_or_default())
}

// ─── Review annotations ──────────────────────────────────────────────────────

/// Fields written only by review transitions. Each transition sets a subset;
/// fields it does not touch keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewAnnotations {
  pub admin_comments:          Option<String>,
  pub approved_at:             Option<DateTime<Utc>>,
  pub approved_by:             Option<String>,
  pub rejected_at:             Option<DateTime<Utc>>,
  pub rejected_by:             Option<String>,
  pub rejection_reason:        Option<String>,
  pub tutor_comments:          Option<String>,
  pub tutor_approved_at:       Option<DateTime<Utc>>,
  pub tutor_rejected_at:       Option<DateTime<Utc>>,
  pub returned_to_student_at:  Option<DateTime<Utc>>,
  pub tutor_return_comments:   Option<String>,
  pub requires_student_action: Option<bool>,
  pub under_review_at:         Option<DateTime<Utc>>,
}

impl ReviewAnnotations {
  /// Overwrite every field that `patch` sets.
  pub fn merge(&mut self, patch: &ReviewAnnotations) {
    fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
      if let Some(v) = src {
        *dst = Some(v.clone());
      }
    }
    take(&mut self.admin_comments, &patch.admin_comments);
    take(&mut self.approved_at, &patch.approved_at);
    take(&mut self.approved_by, &patch.approved_by);
    take(&mut self.rejected_at, &patch.rejected_at);
    take(&mut self.rejected_by, &patch.rejected_by);
    take(&mut self.rejection_reason, &patch.rejection_reason);
    take(&mut self.tutor_comments, &patch.tutor_comments);
    take(&mut self.tutor_approved_at, &patch.tutor_approved_at);
    take(&mut self.tutor_rejected_at, &patch.tutor_rejected_at);
    take(&mut self.returned_to_student_at, &patch.returned_to_student_at);
    take(&mut self.tutor_return_comments, &patch.tutor_return_comments);
    take(&mut self.requires_student_action, &patch.requires_student_action);
    take(&mut self.under_review_at, &patch.under_review_at);
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted application together with its full review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
  pub id:                Uuid,
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
  pub start_date:        NaiveDate,
  pub end_date:          NaiveDate,
  #[serde(default, deserialize_with = "status_or_pending")]
  pub status:            ApplicationStatus,
  pub verification_code: String,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
  /// Bumped by every write; `1` right after submission.
  #[serde(default)]
  pub revision:          u64,
  #[serde(flatten)]
  pub review:            ReviewAnnotations,
}

impl ApplicationRecord {
  /// Assemble a record from a draft and a store-assigned id.
  pub fn from_draft(id: Uuid, draft: ApplicationDraft) -> Self {
    Self {
      id,
      student_id: draft.student_id,
      student_email: draft.student_email,
      student_name: draft.student_name,
      first_name: draft.first_name,
      last_name: draft.last_name,
      document_number: draft.document_number,
      institution: draft.institution,
      program: draft.program,
      plant_type: draft.plant_type,
      plant_location: draft.plant_location,
      activities: draft.activities,
      start_date: draft.start_date,
      end_date: draft.end_date,
      status: ApplicationStatus::Pending,
      verification_code: draft.verification_code,
      created_at: draft.created_at,
      updated_at: draft.created_at,
      revision: 1,
      review: ReviewAnnotations::default(),
    }
  }

  /// Whole calendar months between start and end, ignoring the day of month.
  pub fn duration_months(&self) -> u32 { month_span(self.start_date, self.end_date) }
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// The payload a student fills in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewApplication {
  pub document_number: String,
  pub institution:     String,
  pub program:         String,
  pub start_date:      Option<NaiveDate>,
  pub end_date:        Option<NaiveDate>,
  pub plant_type:      String,
  pub plant_location:  String,
  pub activities:      String,
}

/// A validated, normalised application waiting for the store to assign it an
/// id.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDraft {
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
  pub start_date:        NaiveDate,
  pub end_date:          NaiveDate,
  pub verification_code: String,
  pub created_at:        DateTime<Utc>,
}

impl NewApplication {
  /// Check required fields and the internship duration. Returns the dates.
  pub fn validate(&self) -> Result<(NaiveDate, NaiveDate)> {
    let required = [
      ("documentNumber", &self.document_number),
      ("institution", &self.institution),
      ("program", &self.program),
      ("plantType", &self.plant_type),
      ("plantLocation", &self.plant_location),
      ("activities", &self.activities),
    ];
    for (name, value) in required {
      if value.trim().is_empty() {
        return Err(Error::MissingField(name));
      }
    }
    let start = self.start_date.ok_or(Error::MissingField("startDate"))?;
    let end = self.end_date.ok_or(Error::MissingField("endDate"))?;
    validate_duration(start, end)?;
    Ok((start, end))
  }

  /// Validate and normalise into a draft owned by `principal`.
  ///
  /// Free-text attributes are trimmed and uppercased.
  pub fn into_draft(
    self,
    principal: &Principal,
    now: DateTime<Utc>,
    verification_code: String,
  ) -> Result<ApplicationDraft> {
    let (start_date, end_date) = self.validate()?;

    let student_name = principal.display_name();
    let (first, last) = student_name
      .split_once(char::is_whitespace)
      .map(|(f, l)| (f, l.trim()))
      .unwrap_or((student_name.as_str(), ""));

    Ok(ApplicationDraft {
      student_id: principal.id.clone(),
      student_email: principal.email.clone(),
      first_name: normalize(first),
      last_name: normalize(last),
      student_name: normalize(&student_name),
      document_number: normalize(&self.document_number),
      institution: normalize(&self.institution),
      program: normalize(&self.program),
      plant_type: normalize(&self.plant_type),
      plant_location: normalize(&self.plant_location),
      activities: normalize(&self.activities),
      start_date,
      end_date,
      verification_code,
      created_at: now,
    })
  }
}

fn normalize(s: &str) -> String { s.trim().to_uppercase() }

/// Enforce the inclusive 6–9 calendar-month window.
pub fn validate_duration(start: NaiveDate, end: NaiveDate) -> Result<()> {
  if end <= start {
    return Err(Error::InvalidDateRange { start, end });
  }
  let bound = |months| {
    start
      .checked_add_months(Months::new(months))
      .ok_or(Error::InvalidDateRange { start, end })
  };
  if end < bound(MIN_DURATION_MONTHS)? {
    return Err(Error::DurationTooShort { min_months: MIN_DURATION_MONTHS });
  }
  if end > bound(MAX_DURATION_MONTHS)? {
    return Err(Error::DurationTooLong { max_months: MAX_DURATION_MONTHS });
  }
  Ok(())
}

/// Whole calendar months from `start` to `end`, never negative.
pub fn month_span(start: NaiveDate, end: NaiveDate) -> u32 {
  let months = (end.year() - start.year()) * 12 + end.month() as i32
    - start.month() as i32;
  months.max(0) as u32
}

// ─── Verification code ───────────────────────────────────────────────────────

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_SUFFIX_LEN: usize = 5;

/// Generate a verification code of the form `TRF-<base36 millis>-<suffix>`.
///
/// Called exactly once per application, at submission; the result is stored
/// and never regenerated.
pub fn generate_verification_code(
  now: DateTime<Utc>,
  rng: &mut impl RngCore,
) -> String {
  let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
  let suffix: String = (0..CODE_SUFFIX_LEN)
    .map(|_| BASE36[(rng.next_u32() % 36) as usize] as char)
    .collect();
  format!("TRF-{}-{suffix}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
  if n == 0 {
    return "0".into();
  }
  let mut digits = Vec::new();
  while n > 0 {
    digits.push(BASE36[(n % 36) as usize]);
    n /= 36;
  }
  digits.reverse();
  String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
  use chrono::TimeZone as _;

  use super::*;

  /// Deterministic counter RNG for code generation tests.
  pub(crate) struct CountingRng(pub u32);

  impl RngCore for CountingRng {
    fn next_u32(&mut self) -> u32 {
      self.0 = self.0.wrapping_add(1);
      self.0
    }
    fn next_u64(&mut self) -> u64 { self.next_u32() as u64 }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
      for b in dest {
        *b = self.next_u32() as u8;
      }
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
      self.fill_bytes(dest);
      Ok(())
    }
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  pub(crate) fn payload(start: NaiveDate, end: NaiveDate) -> NewApplication {
    NewApplication {
      document_number: "cc 1020".into(),
      institution:     "Universidad Nacional".into(),
      program:         "Derecho".into(),
      start_date:      Some(start),
      end_date:        Some(end),
      plant_type:      "interna".into(),
      plant_location:  "git de refugio".into(),
      activities:      "archivo y correspondencia".into(),
    }
  }

  #[test]
  fn six_months_exactly_is_accepted() {
    assert!(validate_duration(date(2024, 1, 1), date(2024, 7, 1)).is_ok());
  }

  #[test]
  fn nine_months_exactly_is_accepted() {
    assert!(validate_duration(date(2024, 1, 1), date(2024, 10, 1)).is_ok());
  }

  #[test]
  fn four_months_is_too_short() {
    let err = validate_duration(date(2024, 1, 1), date(2024, 5, 1)).unwrap_err();
    assert!(matches!(err, Error::DurationTooShort { min_months: 6 }));
    assert!(err.is_validation());
  }

  #[test]
  fn one_day_over_nine_months_is_too_long() {
    let err = validate_duration(date(2024, 1, 1), date(2024, 10, 2)).unwrap_err();
    assert!(matches!(err, Error::DurationTooLong { max_months: 9 }));
  }

  #[test]
  fn end_before_start_is_rejected() {
    let err = validate_duration(date(2024, 7, 1), date(2024, 1, 1)).unwrap_err();
    assert!(matches!(err, Error::InvalidDateRange { .. }));
  }

  #[test]
  fn blank_field_names_the_field() {
    let mut p = payload(date(2024, 1, 1), date(2024, 7, 1));
    p.program = "   ".into();
    assert!(matches!(p.validate(), Err(Error::MissingField("program"))));

    let mut p = payload(date(2024, 1, 1), date(2024, 7, 1));
    p.end_date = None;
    assert!(matches!(p.validate(), Err(Error::MissingField("endDate"))));
  }

  #[test]
  fn draft_is_uppercased_and_split() {
    let principal = Principal {
      id:    "stu-1".into(),
      email: Some("ana@example.com".into()),
      name:  Some("Ana María Gómez".into()),
    };
    let now = Utc::now();
    let draft = payload(date(2024, 1, 1), date(2024, 7, 1))
      .into_draft(&principal, now, "TRF-X-1".into())
      .unwrap();

    assert_eq!(draft.student_name, "ANA MARÍA GÓMEZ");
    assert_eq!(draft.first_name, "ANA");
    assert_eq!(draft.last_name, "MARÍA GÓMEZ");
    assert_eq!(draft.institution, "UNIVERSIDAD NACIONAL");
    assert_eq!(draft.plant_location, "GIT DE REFUGIO");
    assert_eq!(draft.student_id, "stu-1");
    assert_eq!(draft.created_at, now);
  }

  #[test]
  fn new_record_starts_pending_at_revision_one() {
    let principal = Principal::new("stu-1");
    let draft = payload(date(2024, 1, 1), date(2024, 7, 1))
      .into_draft(&principal, Utc::now(), "TRF-X-1".into())
      .unwrap();
    let record = ApplicationRecord::from_draft(Uuid::new_v4(), draft);
    assert_eq!(record.status, ApplicationStatus::Pending);
    assert_eq!(record.revision, 1);
    assert_eq!(record.created_at, record.updated_at);
    assert_eq!(record.duration_months(), 6);
  }

  #[test]
  fn missing_or_null_status_reads_as_pending() {
    let principal = Principal::new("stu-1");
    let draft = payload(date(2024, 1, 1), date(2024, 7, 1))
      .into_draft(&principal, Utc::now(), "TRF-X-1".into())
      .unwrap();
    let record = ApplicationRecord::from_draft(Uuid::new_v4(), draft);

    let mut json = serde_json::to_value(&record).unwrap();
    json["status"] = serde_json::Value::Null;
    let decoded: ApplicationRecord = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(decoded.status, ApplicationStatus::Pending);

    json.as_object_mut().unwrap().remove("status");
    let decoded: ApplicationRecord = serde_json::from_value(json).unwrap();
    assert_eq!(decoded.status, ApplicationStatus::Pending);

    assert_eq!(
      ApplicationStatus::from_stored(None).unwrap(),
      ApplicationStatus::Pending
    );
    assert!(ApplicationStatus::from_stored(Some("archived")).is_err());
  }

  #[test]
  fn verification_code_format() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let code = generate_verification_code(now, &mut CountingRng(0));
    assert_eq!(code, format!("TRF-{}-12345", to_base36(1_700_000_000_000)));
    assert!(code.chars().all(|c| c == '-' || c.is_ascii_uppercase() || c.is_ascii_digit()));
  }

  #[test]
  fn base36_matches_known_values() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "Z");
    assert_eq!(to_base36(36), "10");
  }

  #[test]
  fn month_span_ignores_day_of_month() {
    assert_eq!(month_span(date(2024, 1, 31), date(2024, 7, 1)), 6);
    assert_eq!(month_span(date(2024, 11, 1), date(2025, 6, 1)), 7);
    assert_eq!(month_span(date(2024, 7, 1), date(2024, 1, 1)), 0);
  }

  #[test]
  fn merge_keeps_untouched_fields() {
    let mut base = ReviewAnnotations {
      tutor_comments: Some("ok".into()),
      ..Default::default()
    };
    base.merge(&ReviewAnnotations {
      admin_comments: Some("done".into()),
      ..Default::default()
    });
    assert_eq!(base.tutor_comments.as_deref(), Some("ok"));
    assert_eq!(base.admin_comments.as_deref(), Some("done"));
  }
}
