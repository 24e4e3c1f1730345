//! Application detail pane, shown to the right of the list.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph, Wrap},
};
use trustify_core::{application::ApplicationRecord, dashboard, transition::Action};

use crate::{
  app::{App, Screen},
  ui::status_color,
};

fn key_for(action: Action) -> char {
  match action {
    Action::TutorApprove | Action::AdminApprove => 'a',
    Action::TutorReject | Action::AdminReject => 'x',
    Action::TutorReturn => 't',
    Action::AdminMarkReview => 'v',
    Action::AdminMarkPending => 'p',
  }
}

fn row<'a>(label: &'a str, value: impl Into<String>) -> Line<'a> {
  Line::from(vec![
    Span::styled(
      format!("{label:<18}"),
      Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ),
    Span::raw(value.into()),
  ])
}

/// Render `record` into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App, record: &ApplicationRecord) {
  let border = if app.screen == Screen::Detail {
    Color::Gray
  } else {
    Color::DarkGray
  };
  let block = Block::default()
    .title(format!(" {} ", record.verification_code))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border));

  let mut lines = vec![
    Line::from(Span::styled(
      record.status.as_ref().to_uppercase(),
      Style::default()
        .fg(status_color(record.status))
        .add_modifier(Modifier::BOLD),
    )),
    Line::from(""),
    row("Student", record.student_name.clone()),
    row("Document", record.document_number.clone()),
    row("Institution", record.institution.clone()),
    row("Program", record.program.clone()),
    row("Plant", format!("{} - {}", record.plant_type, record.plant_location)),
    row("Activities", record.activities.clone()),
    row(
      "Period",
      format!(
        "{} .. {} ({} months)",
        record.start_date.format("%d/%m/%Y"),
        record.end_date.format("%d/%m/%Y"),
        record.duration_months()
      ),
    ),
    row("Submitted", record.created_at.format("%Y-%m-%d %H:%M").to_string()),
  ];

  let review = &record.review;
  let history = [
    ("Tutor", review.tutor_comments.as_deref()),
    ("Returned", review.tutor_return_comments.as_deref()),
    ("Admin", review.admin_comments.as_deref()),
    ("Rejection", review.rejection_reason.as_deref()),
  ];
  if history.iter().any(|(_, v)| v.is_some()) {
    lines.push(Line::from(""));
    for (label, value) in history {
      if let Some(value) = value {
        lines.push(row(label, value));
      }
    }
  }

  let available = dashboard::available_actions(app.role(), record);
  let mut actions: Vec<Span> = available
    .actions
    .iter()
    .map(|a| Span::styled(format!("[{}] {a}  ", key_for(*a)), Style::default().fg(Color::Yellow)))
    .collect();
  if available.certificate_available {
    actions.push(Span::styled("[c] certificate", Style::default().fg(Color::Green)));
  }
  if !actions.is_empty() {
    lines.push(Line::from(""));
    lines.push(Line::from(actions));
  }

  f.render_widget(
    Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
    area,
  );
}
