//! Dashboard state and key dispatcher for `trustify watch`.

use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use trustify_core::{
  application::ApplicationRecord,
  dashboard::{self, ApplicationFeed, FeedUpdate, StatusCounts},
  store::{ApplicationFilter, SubscriptionEvent},
  transition::{Action, TransitionRequest},
  user::{Role, UserRecord},
};
use uuid::Uuid;

use crate::{
  client::{ApiClient, ListQuery},
  dispatch::{Dispatcher, Verb, resolve_action},
  notify::{Notification, Notifier},
  render,
};

// ─── Screen ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
  List,
  Detail,
}

/// A line of text input that currently owns the keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
  Search,
  /// Collecting the comment for an action on one record. Blank is accepted
  /// unless the action requires a reason.
  Comment { action: Action, id: Uuid },
}

// ─── App ──────────────────────────────────────────────────────────────────────

pub struct App {
  pub screen: Screen,

  /// Who is watching, as bound by `GET /me` at startup.
  pub user: UserRecord,

  /// Records in view, kept newest-first.
  pub feed: ApplicationFeed,

  /// Current search term; blank shows everything.
  pub search: String,

  pub prompt: Option<Prompt>,

  /// Text typed into a comment prompt.
  pub input: String,

  /// Cursor position within the *searched* list.
  pub list_cursor: usize,

  /// Latest notification, shown in the status bar.
  pub status: Option<Notification>,

  pub dispatcher: Dispatcher,

  client:     ApiClient,
  notifier:   Notifier,
  export_dir: PathBuf,
}

impl App {
  pub fn new(
    client: ApiClient,
    user: UserRecord,
    notifier: Notifier,
    export_dir: PathBuf,
  ) -> Self {
    Self {
      screen: Screen::List,
      feed: ApplicationFeed::new(feed_filter(&user)),
      user,
      search: String::new(),
      prompt: None,
      input: String::new(),
      list_cursor: 0,
      status: None,
      dispatcher: Dispatcher::new(client.clone(), notifier.clone()),
      client,
      notifier,
      export_dir,
    }
  }

  pub fn role(&self) -> Role { self.user.role }

  // ── Data ──────────────────────────────────────────────────────────────────

  /// Re-read the caller's role and replace the feed with a fresh snapshot.
  pub async fn reload(&mut self) -> anyhow::Result<()> {
    match self.refresh().await {
      Ok(()) => Ok(()),
      Err(e) => {
        self.notifier.error(format!("loading applications: {e:#}"));
        Err(e)
      }
    }
  }

  async fn refresh(&mut self) -> anyhow::Result<()> {
    let user = self.client.me().await?;
    if user.role != self.user.role {
      self.notifier.info(format!("your role is now {}", user.role));
      self.feed = ApplicationFeed::new(feed_filter(&user));
      self.screen = Screen::List;
      self.prompt = None;
    }
    self.user = user;

    let records = self.client.list_applications(&ListQuery::default()).await?;
    self.feed.replace_all(records);
    self.clamp_cursor();
    Ok(())
  }

  /// Apply pushed events. The caller reloads on [`FeedUpdate::NeedsResync`].
  pub fn apply_events(&mut self, batch: Vec<SubscriptionEvent>) -> FeedUpdate {
    let update = self.feed.apply_batch(batch);
    self.clamp_cursor();
    update
  }

  pub fn counts(&self) -> StatusCounts { StatusCounts::tally(self.feed.records()) }

  /// Records matching the search term, in feed order.
  pub fn visible(&self) -> Vec<&ApplicationRecord> {
    dashboard::search(self.feed.records(), &self.search)
  }

  pub fn cursor_record(&self) -> Option<&ApplicationRecord> {
    self.visible().get(self.list_cursor).copied()
  }

  fn clamp_cursor(&mut self) {
    let len = self.visible().len();
    self.list_cursor = self.list_cursor.min(len.saturating_sub(1));
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Ok(false);
    }

    if let Some(prompt) = self.prompt.clone() {
      self.handle_prompt_key(prompt, key);
      return Ok(true);
    }

    match key.code {
      KeyCode::Char('q') => return Ok(false),

      KeyCode::Down | KeyCode::Char('j') => {
        if self.list_cursor + 1 < self.visible().len() {
          self.list_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        self.list_cursor = self.list_cursor.saturating_sub(1);
      }

      KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
        if self.cursor_record().is_some() {
          self.screen = Screen::Detail;
        }
      }
      KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => {
        self.screen = Screen::List;
      }

      KeyCode::Char('/') => {
        self.prompt = Some(Prompt::Search);
        self.search.clear();
        self.list_cursor = 0;
      }
      KeyCode::Char('r') => {
        self.reload().await.ok();
      }

      KeyCode::Char('a') => self.run_verb(Verb::Approve),
      KeyCode::Char('x') => self.run_verb(Verb::Reject),
      KeyCode::Char('t') => self.run_verb(Verb::Return),
      KeyCode::Char('v') => self.run_verb(Verb::Review),
      KeyCode::Char('p') => self.run_verb(Verb::Pending),
      KeyCode::Char('c') => self.export_certificate(),

      _ => {}
    }
    Ok(true)
  }

  fn handle_prompt_key(&mut self, prompt: Prompt, key: KeyEvent) {
    let buffer = match prompt {
      Prompt::Search => &mut self.search,
      Prompt::Comment { .. } => &mut self.input,
    };
    match key.code {
      KeyCode::Esc => {
        buffer.clear();
        self.prompt = None;
      }
      KeyCode::Backspace => {
        buffer.pop();
      }
      KeyCode::Char(c) => buffer.push(c),
      KeyCode::Enter => {
        self.prompt = None;
        if let Prompt::Comment { action, id } = prompt {
          let comment = std::mem::take(&mut self.input);
          self.submit_comment(action, id, &comment);
        }
      }
      _ => {}
    }
    if prompt == Prompt::Search {
      self.list_cursor = 0;
    }
  }

  // ── Commands ──────────────────────────────────────────────────────────────

  fn run_verb(&mut self, verb: Verb) {
    let Some(record) = self.cursor_record() else {
      return;
    };
    let (id, status) = (record.id, record.status);
    let Some(action) = resolve_action(self.role(), verb) else {
      self
        .notifier
        .error(format!("{} cannot {}", self.role(), verb.label()));
      return;
    };
    if !dashboard::available_actions(self.role(), record)
      .actions
      .contains(&action)
    {
      self.notifier.error(format!("cannot {action} from {status}"));
      return;
    }

    self.input.clear();
    self.prompt = Some(Prompt::Comment { action, id });
  }

  fn submit_comment(&self, action: Action, id: Uuid, comment: &str) {
    match request_with_comment(action, comment) {
      Some(request) => self.dispatch(id, request),
      None => self.notifier.error(format!("{action} requires a reason")),
    }
  }

  /// Send a transition in the background. The feed picks up the result from
  /// the event stream.
  fn dispatch(&self, id: Uuid, request: TransitionRequest) {
    let dispatcher = self.dispatcher.clone();
    tokio::spawn(async move {
      dispatcher.transition(id, request).await;
    });
  }

  fn export_certificate(&self) {
    let Some(record) = self.cursor_record() else {
      return;
    };
    if !dashboard::available_actions(self.role(), record).certificate_available {
      self
        .notifier
        .error(format!("{} is not approved", record.verification_code));
      return;
    }

    let id = record.id;
    let client = self.client.clone();
    let notifier = self.notifier.clone();
    let dir = self.export_dir.clone();
    tokio::spawn(async move {
      let written = match client.certificate(id).await {
        Ok(cert) => render::write_certificate(&cert, &dir),
        Err(e) => Err(e),
      };
      match written {
        Ok(path) => notifier.success(format!("certificate written to {}", path.display())),
        Err(e) => notifier.error(format!("{e:#}")),
      }
    });
  }

  /// Show the latest notification.
  pub fn notify(&mut self, notification: Notification) { self.status = Some(notification); }
}

/// The records `user` may see, matching the server's scoping.
fn feed_filter(user: &UserRecord) -> ApplicationFilter {
  match user.role {
    Role::Student => ApplicationFilter::owned_by(user.id.clone()),
    Role::Tutor | Role::Admin => ApplicationFilter::default(),
  }
}

/// The request for `action` carrying the typed comment. `None` when the
/// action requires a reason and none was given.
pub fn request_with_comment(action: Action, comment: &str) -> Option<TransitionRequest> {
  let comment = comment.trim();
  match (comment.is_empty(), action.requires_reason()) {
    (true, true) => None,
    (true, false) => Some(TransitionRequest::new(action)),
    (false, _) => Some(TransitionRequest::new(action).with_comment(comment)),
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::{NaiveDate, Utc};
  use crossterm::event::KeyEvent;
  use trustify_core::{application::NewApplication, user::Principal};

  use super::*;
  use crate::{client::ApiConfig, notify};

  fn pending_record() -> ApplicationRecord {
    let draft = NewApplication {
      document_number: "1".into(),
      institution:     "U".into(),
      program:         "P".into(),
      start_date:      NaiveDate::from_ymd_opt(2024, 1, 1),
      end_date:        NaiveDate::from_ymd_opt(2024, 8, 1),
      plant_type:      "T".into(),
      plant_location:  "L".into(),
      activities:      "A".into(),
    }
    .into_draft(&Principal::new("s1"), Utc::now(), "TRF-T-AAAAA".into())
    .unwrap();
    ApplicationRecord::from_draft(Uuid::new_v4(), draft)
  }

  fn tutor_app() -> (App, ApplicationRecord) {
    let client = ApiClient::new(ApiConfig {
      base_url:     "http://127.0.0.1:9".into(),
      principal_id: "t".into(),
      email:        None,
      name:         None,
      timeout:      Duration::from_millis(200),
    })
    .unwrap();
    let user = UserRecord {
      id:         "t".into(),
      email:      None,
      name:       "Tutor".into(),
      role:       Role::Tutor,
      created_at: Utc::now(),
    };
    let (notifier, _) = notify::channel();
    let mut app = App::new(client, user, notifier, PathBuf::from("."));
    let record = pending_record();
    app.feed.replace_all(vec![record.clone()]);
    (app, record)
  }

  fn key(c: char) -> KeyEvent { KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE) }

  #[test]
  fn optional_comments_may_be_blank() {
    assert_eq!(
      request_with_comment(Action::TutorApprove, "  "),
      Some(TransitionRequest::new(Action::TutorApprove))
    );
    assert_eq!(
      request_with_comment(Action::AdminMarkReview, " revisar fechas "),
      Some(TransitionRequest::new(Action::AdminMarkReview).with_comment("revisar fechas"))
    );
    assert_eq!(request_with_comment(Action::TutorReject, ""), None);
    assert!(request_with_comment(Action::TutorReject, "faltan firmas").is_some());
  }

  #[tokio::test]
  async fn approve_opens_a_comment_prompt() {
    let (mut app, record) = tutor_app();

    assert!(app.handle_key(key('a')).await.unwrap());
    assert_eq!(
      app.prompt,
      Some(Prompt::Comment { action: Action::TutorApprove, id: record.id })
    );

    for c in "ok".chars() {
      app.handle_key(key(c)).await.unwrap();
    }
    assert_eq!(app.input, "ok");

    app
      .handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
      .await
      .unwrap();
    assert_eq!(app.prompt, None);
    assert!(app.input.is_empty());
  }

  #[tokio::test]
  async fn escape_cancels_the_comment() {
    let (mut app, _) = tutor_app();
    app.handle_key(key('x')).await.unwrap();
    app.handle_key(key('n')).await.unwrap();
    app
      .handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE))
      .await
      .unwrap();
    assert_eq!(app.prompt, None);
    assert!(app.input.is_empty());
  }
}
