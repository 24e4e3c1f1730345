//! Application list pane.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::{
  app::{App, Prompt, Screen},
  ui::status_color,
};

/// Render the application list into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let visible = app.visible();
  let total = app.feed.records().len();
  let searching = app.prompt == Some(Prompt::Search) || !app.search.is_empty();

  let title = if searching {
    format!(" Applications ({}/{}) ", visible.len(), total)
  } else {
    format!(" Applications ({total}) ")
  };

  let border = if app.screen == Screen::List {
    Color::Gray
  } else {
    Color::DarkGray
  };
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border));

  let items: Vec<ListItem> = visible
    .iter()
    .map(|record| {
      let busy = if app.dispatcher.in_flight().is_in_flight(record.id) {
        "… "
      } else {
        "  "
      };
      ListItem::new(Line::from(vec![
        Span::raw(busy),
        Span::styled(
          format!("{:<20}", record.status.as_ref()),
          Style::default().fg(status_color(record.status)),
        ),
        Span::raw(record.student_name.clone()),
        Span::styled(
          format!("  {}", record.created_at.format("%Y-%m-%d")),
          Style::default().fg(Color::DarkGray),
        ),
      ]))
    })
    .collect();

  let mut inner_area = block.inner(area);
  f.render_widget(block, area);

  if searching && inner_area.height > 2 {
    let search_area = Rect {
      y: inner_area.y + inner_area.height - 1,
      height: 1,
      ..inner_area
    };
    inner_area.height -= 1;

    let text = if app.prompt == Some(Prompt::Search) {
      format!("/{}_", app.search)
    } else {
      format!("/{}", app.search)
    };
    f.render_widget(
      Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
      search_area,
    );
  }

  if visible.is_empty() {
    let text = if total == 0 { "Nothing here yet." } else { "No matches." };
    f.render_widget(
      Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
      inner_area,
    );
    return;
  }

  let mut state = ListState::default();
  state.select(Some(app.list_cursor));

  f.render_stateful_widget(
    List::new(items).highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    ),
    inner_area,
    &mut state,
  );
}
