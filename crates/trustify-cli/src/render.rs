//! Plain-text output for one-shot commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use trustify_core::{
  application::ApplicationRecord,
  certificate::{Certificate, VerifiedCertificate},
  dashboard::StatusCounts,
  user::UserRecord,
};

fn clip(s: &str, width: usize) -> String {
  if s.chars().count() <= width {
    return s.to_owned();
  }
  let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
  out.push('~');
  out
}

pub fn applications(records: &[&ApplicationRecord]) -> String {
  if records.is_empty() {
    return "No applications.\n".to_owned();
  }
  let header = format!(
    "{:<36}  {:<19}  {:<24}  {:<24}  {:<10}",
    "ID", "STATUS", "STUDENT", "INSTITUTION", "CREATED"
  );
  let rows = records.iter().map(|r| {
    format!(
      "{:<36}  {:<19}  {:<24}  {:<24}  {:<10}",
      r.id,
      r.status,
      clip(&r.student_name, 24),
      clip(&r.institution, 24),
      r.created_at.format("%Y-%m-%d"),
    )
  });
  std::iter::once(header).chain(rows).map(|line| line + "\n").collect()
}

pub fn counts(c: &StatusCounts) -> String {
  format!(
    "total {}  pending {}  under review {}  tutor approved {}  tutor rejected {}  \
     changes requested {}  returned {}  approved {}  rejected {}",
    c.total,
    c.pending,
    c.under_review,
    c.tutor_approved,
    c.tutor_rejected,
    c.changes_requested,
    c.returned_to_student,
    c.approved,
    c.rejected,
  )
}

/// Every field of one record, review history included.
pub fn application_detail(r: &ApplicationRecord) -> String {
  let mut out = String::new();
  let mut field = |label: &str, value: &dyn std::fmt::Display| {
    out.push_str(&format!("{label:<22}{value}\n"));
  };
  field("id", &r.id);
  field("status", &r.status);
  field("verification code", &r.verification_code);
  field("student", &r.student_name);
  field("document", &r.document_number);
  field("institution", &r.institution);
  field("program", &r.program);
  field("plant", &format!("{} - {}", r.plant_type, r.plant_location));
  field("activities", &r.activities);
  field("period", &format!("{} .. {} ({} months)", r.start_date, r.end_date, r.duration_months()));
  field("created", &r.created_at.to_rfc3339());
  field("updated", &r.updated_at.to_rfc3339());
  field("revision", &r.revision);

  let review = &r.review;
  let optional = [
    ("tutor comments", review.tutor_comments.as_deref()),
    ("tutor return", review.tutor_return_comments.as_deref()),
    ("admin comments", review.admin_comments.as_deref()),
    ("rejection reason", review.rejection_reason.as_deref()),
    ("approved by", review.approved_by.as_deref()),
    ("rejected by", review.rejected_by.as_deref()),
  ];
  for (label, value) in optional {
    if let Some(value) = value {
      field(label, &value);
    }
  }
  out
}

pub fn user(u: &UserRecord) -> String {
  format!(
    "{:<28}  {:<7}  {:<24}  {}",
    u.id,
    u.role,
    clip(&u.name, 24),
    u.email.as_deref().unwrap_or("-")
  )
}

pub fn users(list: &[UserRecord]) -> String {
  list.iter().map(|u| user(u) + "\n").collect()
}

pub fn verified(v: &VerifiedCertificate) -> String {
  format!(
    "VALID CERTIFICATE {}\n{} - {} ({})\n",
    v.verification_code, v.student_name, v.institution, v.program
  )
}

/// Write the plain-text certificate into `dir` and return its path.
pub fn write_certificate(cert: &Certificate, dir: &Path) -> Result<PathBuf> {
  let path = dir.join(format!("{}.txt", cert.file_stem()));
  std::fs::write(&path, cert.render_text())
    .with_context(|| format!("writing certificate to {}", path.display()))?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone, Utc};
  use trustify_core::{
    application::{ApplicationStatus, NewApplication},
    user::{Principal, Role},
  };
  use uuid::Uuid;

  use super::*;

  fn record() -> ApplicationRecord {
    let payload = NewApplication {
      document_number: "1020".into(),
      institution:     "Universidad Nacional de Colombia Sede Bogota".into(),
      program:         "Ingenieria".into(),
      start_date:      NaiveDate::from_ymd_opt(2024, 1, 10),
      end_date:        NaiveDate::from_ymd_opt(2024, 8, 10),
      plant_type:      "Planta".into(),
      plant_location:  "Cali".into(),
      activities:      "Mantenimiento".into(),
    };
    let mut principal = Principal::new("s1");
    principal.name = Some("Ana Gomez".into());
    let now = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();
    let draft = payload
      .into_draft(&principal, now, "TRF-ABC-12345".into())
      .unwrap();
    ApplicationRecord::from_draft(Uuid::new_v4(), draft)
  }

  #[test]
  fn table_clips_long_fields() {
    let r = record();
    let table = applications(&[&r]);
    let row = table.lines().nth(1).unwrap();
    assert!(row.contains("pending"));
    assert!(row.contains("UNIVERSIDAD NACIONAL DE~"));
    assert!(row.contains("2024-09-01"));
  }

  #[test]
  fn empty_table_is_a_message() {
    assert_eq!(applications(&[]), "No applications.\n");
  }

  #[test]
  fn detail_lists_review_history() {
    let mut r = record();
    r.status = ApplicationStatus::Rejected;
    r.review.rejection_reason = Some("INCOMPLETO".into());
    let text = application_detail(&r);
    assert!(text.contains("rejection reason      INCOMPLETO"));
    assert!(!text.contains("approved by"));
    assert!(text.contains("(7 months)"));
  }

  #[test]
  fn certificate_written_as_text() {
    let mut r = record();
    r.status = ApplicationStatus::Approved;
    let cert = Certificate::from_record(&r).unwrap();

    let dir = std::env::temp_dir().join(format!("trustify-cli-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = write_certificate(&cert, &dir).unwrap();

    assert_eq!(
      path.file_name().unwrap().to_str().unwrap(),
      "CERTIFICADO-ANA GOMEZ-TRF-ABC-12345.txt"
    );
    let body = std::fs::read_to_string(&path).unwrap();
    assert!(body.contains("TRF-ABC-12345"));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn user_list_is_one_line_each() {
    let created_at = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let list = vec![
      UserRecord {
        id: "t-1".into(),
        email: Some("tutor@uni.edu".into()),
        name: "Tutor Uno".into(),
        role: Role::Tutor,
        created_at,
      },
      UserRecord {
        id: "s-1".into(),
        email: None,
        name: "Ana".into(),
        role: Role::Student,
        created_at,
      },
    ];
    let text = users(&list);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("tutor@uni.edu"));
    assert!(lines[1].ends_with('-'));
    assert!(text.ends_with('\n'));
  }
}
