//! Certificate input contract.
//!
//! A [`Certificate`] can only be built from an approved application. Visual
//! rendering is the presentation layer's business; this module provides the
//! printable fields, a deterministic file name, and a plain-text layout.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  application::{ApplicationRecord, ApplicationStatus},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
  pub application_id:    Uuid,
  pub student_name:      String,
  pub document_number:   String,
  pub institution:       String,
  pub program:           String,
  pub plant_type:        String,
  pub plant_location:    String,
  pub activities:        String,
  pub start_date:        NaiveDate,
  pub end_date:          NaiveDate,
  pub duration_months:   u32,
  pub verification_code: String,
  pub approved_at:       Option<DateTime<Utc>>,
}

impl Certificate {
  pub fn from_record(record: &ApplicationRecord) -> Result<Self> {
    if record.status != ApplicationStatus::Approved {
      return Err(Error::NotApproved(record.id));
    }
    Ok(Self {
      application_id:    record.id,
      student_name:      record.student_name.clone(),
      document_number:   record.document_number.clone(),
      institution:       record.institution.clone(),
      program:           record.program.clone(),
      plant_type:        record.plant_type.clone(),
      plant_location:    record.plant_location.clone(),
      activities:        record.activities.clone(),
      start_date:        record.start_date,
      end_date:          record.end_date,
      duration_months:   record.duration_months(),
      verification_code: record.verification_code.clone(),
      approved_at:       record.review.approved_at,
    })
  }

  /// `CERTIFICADO-<student name>-<verification code>`, safe to use as a
  /// single path component.
  pub fn file_stem(&self) -> String {
    format!("CERTIFICADO-{}-{}", self.student_name, self.verification_code)
      .chars()
      .map(|c| match c {
        '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
        c if c.is_control() => '_',
        c => c,
      })
      .collect()
  }

  pub fn file_name(&self) -> String { format!("{}.pdf", self.file_stem()) }

  /// A printable plain-text layout.
  pub fn render_text(&self) -> String {
    let date = |d: NaiveDate| d.format("%d/%m/%Y").to_string();

    let mut lines = vec![
      "CERTIFICADO DE PRÁCTICAS".to_owned(),
      "========================".to_owned(),
      String::new(),
      format!("SE CERTIFICA QUE {}", self.student_name),
      format!("IDENTIFICADO(A) CON DOCUMENTO {}", self.document_number),
      format!("DE {} ({})", self.institution, self.program),
      format!("REALIZÓ SUS PRÁCTICAS EN {} - {}", self.plant_type, self.plant_location),
      String::new(),
      format!("ACTIVIDADES: {}", self.activities),
      format!("INICIO:      {}", date(self.start_date)),
      format!("FIN:         {}", date(self.end_date)),
      format!("DURACIÓN:    {} MESES", self.duration_months),
    ];
    if let Some(at) = self.approved_at {
      lines.push(format!("APROBADO:    {}", at.format("%d/%m/%Y")));
    }
    lines.push(String::new());
    lines.push(format!("CÓDIGO DE VERIFICACIÓN: {}", self.verification_code));

    lines.join("\n") + "\n"
  }
}

/// What a member of the public may learn from a verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedCertificate {
  pub verification_code: String,
  pub student_name:      String,
  pub institution:       String,
  pub program:           String,
  pub start_date:        NaiveDate,
  pub end_date:          NaiveDate,
  pub approved_at:       Option<DateTime<Utc>>,
}

impl From<&Certificate> for VerifiedCertificate {
  fn from(c: &Certificate) -> Self {
    Self {
      verification_code: c.verification_code.clone(),
      student_name:      c.student_name.clone(),
      institution:       c.institution.clone(),
      program:           c.program.clone(),
      start_date:        c.start_date,
      end_date:          c.end_date,
      approved_at:       c.approved_at,
    }
  }
}
