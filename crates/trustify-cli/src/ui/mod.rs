//! Terminal rendering for the watch dashboard.

pub mod application_detail;
pub mod application_list;

use chrono::Local;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph},
};
use trustify_core::application::ApplicationStatus;

use crate::{
  app::{App, Prompt, Screen},
  notify::NotificationKind,
};

/// Main draw function called each frame.
pub fn draw(f: &mut Frame, app: &App) {
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Length(1), // counts
      Constraint::Min(0),    // body
      Constraint::Length(1), // status bar
    ])
    .split(f.area());

  draw_header(f, rows[0], app);
  draw_counts(f, rows[1], app);
  draw_body(f, rows[2], app);
  draw_status(f, rows[3], app);
}

/// Colour used for a status everywhere it is shown.
pub fn status_color(status: ApplicationStatus) -> Color {
  match status {
    ApplicationStatus::Pending => Color::Yellow,
    ApplicationStatus::UnderReview => Color::Cyan,
    ApplicationStatus::TutorApproved => Color::LightGreen,
    ApplicationStatus::TutorRejected => Color::LightRed,
    ApplicationStatus::ChangesRequested | ApplicationStatus::ReturnedToStudent => {
      Color::Magenta
    }
    ApplicationStatus::Approved => Color::Green,
    ApplicationStatus::Rejected => Color::Red,
  }
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let date = Local::now().format("%Y-%m-%d").to_string();

  let left = Span::styled(
    format!(" trustify  {}  {}", app.user.name, app.role()),
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  );
  let right = Span::styled(format!("{date} "), Style::default().fg(Color::Gray));

  let pad = area
    .width
    .saturating_sub(left.width() as u16)
    .saturating_sub(right.width() as u16);

  let line = Line::from(vec![left, Span::raw(" ".repeat(pad as usize)), right]);
  f.render_widget(
    Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
    area,
  );
}

fn draw_counts(f: &mut Frame, area: Rect, app: &App) {
  let c = app.counts();
  let mut cells = vec![
    ("total", c.total, Color::White),
    ("pending", c.pending, status_color(ApplicationStatus::Pending)),
    ("review", c.under_review, status_color(ApplicationStatus::UnderReview)),
    ("tutor ok", c.tutor_approved, status_color(ApplicationStatus::TutorApproved)),
    ("tutor no", c.tutor_rejected, status_color(ApplicationStatus::TutorRejected)),
    (
      "returned",
      c.changes_requested + c.returned_to_student,
      status_color(ApplicationStatus::ReturnedToStudent),
    ),
    ("approved", c.approved, status_color(ApplicationStatus::Approved)),
  ];
  if app.role() == trustify_core::user::Role::Admin {
    cells.push(("rejected", c.rejected, status_color(ApplicationStatus::Rejected)));
  }

  let spans: Vec<Span> = cells
    .into_iter()
    .flat_map(|(label, n, color)| {
      [
        Span::styled(format!(" {label} "), Style::default().fg(Color::Gray)),
        Span::styled(format!("{n} "), Style::default().fg(color).add_modifier(Modifier::BOLD)),
      ]
    })
    .collect();
  f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ─── Body ─────────────────────────────────────────────────────────────────────

fn draw_body(f: &mut Frame, area: Rect, app: &App) {
  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
    .split(area);

  application_list::draw(f, cols[0], app);

  match app.cursor_record() {
    Some(record) => application_detail::draw(f, cols[1], app, record),
    None => draw_empty_detail(f, cols[1], app),
  }
}

fn draw_empty_detail(f: &mut Frame, area: Rect, app: &App) {
  let block = Block::default()
    .title(" Detail ")
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);

  let text = if app.feed.records().is_empty() {
    "No applications yet."
  } else {
    "No application matches the search."
  };
  f.render_widget(
    Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
    inner,
  );
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let (mode_label, hints) = match (&app.prompt, &app.screen) {
    (Some(Prompt::Search), _) => ("SEARCH", "Type to filter  Esc clear  Enter done"),
    (Some(Prompt::Comment { action, .. }), _) if action.requires_reason() => {
      ("REASON", "Type the reason  Esc cancel  Enter send")
    }
    (Some(Prompt::Comment { .. }), _) => ("COMMENT", "Optional comment  Esc cancel  Enter send"),
    (None, Screen::List) => (
      "NORMAL",
      "↑↓/jk move  Enter detail  / search  a x t v p act  c certificate  r reload  q quit",
    ),
    (None, Screen::Detail) => (
      "DETAIL",
      "Esc back  a approve  x reject  t return  v review  p pending  c certificate",
    ),
  };

  let body = match (&app.prompt, &app.status) {
    (Some(Prompt::Comment { action, .. }), _) => {
      Span::styled(format!("  {action}: {}_", app.input), Style::default().fg(Color::Yellow))
    }
    (None, Some(n)) => {
      let color = match n.kind {
        NotificationKind::Success => Color::Green,
        NotificationKind::Error => Color::Red,
        NotificationKind::Info => Color::Gray,
      };
      Span::styled(format!("  {}", n.text), Style::default().fg(color))
    }
    _ => Span::styled(format!("  {hints}"), Style::default().fg(Color::DarkGray)),
  };

  let mode_span = Span::styled(
    format!(" {mode_label} "),
    Style::default()
      .fg(Color::Black)
      .bg(Color::Cyan)
      .add_modifier(Modifier::BOLD),
  );

  f.render_widget(
    Paragraph::new(Line::from(vec![mode_span, body])).style(Style::default().bg(Color::Black)),
    area,
  );
}
