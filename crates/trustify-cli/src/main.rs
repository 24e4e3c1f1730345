//! `trustify`: command-line client for the Trustify certification service.
//!
//! # Usage
//!
//! ```text
//! trustify --principal-id uid-1 submit --document 1020 --institution ... \
//!   --start 2024-01-15 --end 2024-08-15 ...
//! trustify --principal-id uid-9 approve 7b1c...   # tutor or admin approval
//! trustify --config ~/.config/trustify/cli.toml watch
//! ```
//!
//! The principal flags stand in for the identity provider's session: the
//! gateway in front of the server is expected to vouch for them.

mod app;
mod client;
mod dispatch;
mod notify;
mod render;
mod sse;
mod ui;

use std::{
  io,
  path::{Path, PathBuf},
  pin::pin,
  process::ExitCode,
  time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use app::App;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use client::{ApiClient, ApiConfig, ListQuery, ServerError};
use crossterm::{
  event::{self, Event, KeyEventKind},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use dispatch::{Dispatcher, Verb, resolve_action};
use futures_util::StreamExt;
use notify::Notifier;
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use trustify_core::{
  application::{ApplicationStatus, NewApplication},
  dashboard::{self, FeedUpdate, StatusCounts},
  store::SubscriptionEvent,
  transition::TransitionRequest,
  user::Role,
};
use uuid::Uuid;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "trustify", about = "Command-line client for Trustify")]
struct Args {
  /// Path to a TOML config file (url, principal_id, email, name, timeout_secs).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// Base URL of the trustify server (default: http://localhost:8080).
  #[arg(long, env = "TRUSTIFY_URL", global = true)]
  url: Option<String>,

  /// Principal id issued by the identity provider.
  #[arg(long, env = "TRUSTIFY_PRINCIPAL_ID", global = true)]
  principal_id: Option<String>,

  #[arg(long, env = "TRUSTIFY_EMAIL", global = true)]
  email: Option<String>,

  #[arg(long, env = "TRUSTIFY_NAME", global = true)]
  name: Option<String>,

  /// Per-request timeout in seconds.
  #[arg(long, env = "TRUSTIFY_TIMEOUT", global = true)]
  timeout: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show your user record, creating it on first use.
  Me,
  /// List the applications you may see, newest first.
  List {
    /// Only these statuses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    status: Vec<ApplicationStatus>,
    /// Case-insensitive match on name, document, institution, program,
    /// location, status or code.
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    limit:  Option<usize>,
  },
  /// Show one application with its review history.
  Show { id: Uuid },
  /// Submit an internship application.
  Submit(SubmitArgs),
  /// Approve as tutor (forward) or admin (final).
  Approve(TransitionArgs),
  /// Reject as tutor or admin. Requires --comment.
  Reject(TransitionArgs),
  /// Return to the student for changes (tutor). Requires --comment.
  Return(TransitionArgs),
  /// Mark as under review (admin).
  Review(TransitionArgs),
  /// Put back to pending (admin).
  Pending(TransitionArgs),
  /// Follow applications live in a terminal dashboard.
  Watch {
    /// Where exported certificates are written.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
  },
  /// List every user (admin).
  Users,
  /// Change a user's role (admin).
  SetRole { user_id: String, role: Role },
  /// Delete a user record (admin).
  DeleteUser { user_id: String },
  /// Export the certificate of an approved application as text.
  Certificate {
    id:      Uuid,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
  },
  /// Check a verification code.
  Verify { code: String },
}

#[derive(ClapArgs, Debug)]
struct SubmitArgs {
  #[arg(long)]
  document:       Option<String>,
  #[arg(long)]
  institution:    Option<String>,
  #[arg(long)]
  program:        Option<String>,
  /// YYYY-MM-DD
  #[arg(long)]
  start:          Option<NaiveDate>,
  /// YYYY-MM-DD
  #[arg(long)]
  end:            Option<NaiveDate>,
  #[arg(long)]
  plant_type:     Option<String>,
  #[arg(long)]
  plant_location: Option<String>,
  #[arg(long)]
  activities:     Option<String>,
}

impl SubmitArgs {
  fn into_payload(self) -> NewApplication {
    NewApplication {
      document_number: self.document.unwrap_or_default(),
      institution:     self.institution.unwrap_or_default(),
      program:         self.program.unwrap_or_default(),
      start_date:      self.start,
      end_date:        self.end,
      plant_type:      self.plant_type.unwrap_or_default(),
      plant_location:  self.plant_location.unwrap_or_default(),
      activities:      self.activities.unwrap_or_default(),
    }
  }
}

#[derive(ClapArgs, Debug)]
struct TransitionArgs {
  /// Application ids.
  #[arg(required = true)]
  ids:               Vec<Uuid>,
  /// Comment, or the reason for a rejection or return.
  #[arg(short = 'm', long)]
  comment:           Option<String>,
  /// Refuse the write unless the record is still at this revision.
  #[arg(long)]
  expected_revision: Option<u64>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
#[serde(default)]
struct ConfigFile {
  url:          Option<String>,
  principal_id: Option<String>,
  email:        Option<String>,
  name:         Option<String>,
  timeout_secs: Option<u64>,
}

fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
  let Some(path) = path else {
    return Ok(ConfigFile::default());
  };
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading config file {}", path.display()))?;
  toml::from_str(&raw).context("parsing config file")
}

/// CLI flags override the config file, which overrides defaults.
fn resolve_config(args: &Args, file: ConfigFile) -> Result<ApiConfig> {
  let principal_id = args
    .principal_id
    .clone()
    .or(file.principal_id)
    .filter(|id| !id.trim().is_empty())
    .ok_or_else(|| anyhow!("no principal id: pass --principal-id or set TRUSTIFY_PRINCIPAL_ID"))?;

  Ok(ApiConfig {
    base_url: args
      .url
      .clone()
      .or(file.url)
      .unwrap_or_else(|| DEFAULT_URL.to_owned()),
    principal_id,
    email: args.email.clone().or(file.email),
    name: args.name.clone().or(file.name),
    timeout: Duration::from_secs(
      args
        .timeout
        .or(file.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS),
    ),
  })
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
  let args = Args::parse();

  // The dashboard owns the terminal; log lines would tear it.
  if !matches!(args.command, Command::Watch { .. }) {
    tracing_subscriber::fmt()
      .with_writer(io::stderr)
      .with_env_filter(
        EnvFilter::builder()
          .with_default_directive(LevelFilter::INFO.into())
          .from_env_lossy(),
      )
      .init();
  }

  let file_cfg = load_config_file(args.config.as_deref())?;
  let client = ApiClient::new(resolve_config(&args, file_cfg)?)?;

  let (notifier, rx) = notify::channel();
  let printer = notify::spawn_printer(rx);
  let outcome = run(args.command, client, notifier).await;
  let errors = printer.await.context("notification printer failed")?;
  outcome?;

  Ok(if errors == 0 {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn is_validation(e: &anyhow::Error) -> bool {
  e.downcast_ref::<ServerError>()
    .is_some_and(ServerError::is_validation)
}

/// Run one command. Reads fail the command outright; business operations
/// report through `notifier`, except validation failures, which abort.
async fn run(command: Command, client: ApiClient, notifier: Notifier) -> Result<()> {
  match command {
    Command::Me => {
      let me = client.me().await?;
      println!("{}", render::user(&me));
    }

    Command::List { status, search, limit } => {
      let records = client
        .list_applications(&ListQuery { statuses: status, limit })
        .await?;
      let shown = dashboard::search(&records, search.as_deref().unwrap_or_default());
      print!("{}", render::applications(&shown));
      println!("{}", render::counts(&StatusCounts::tally(shown.iter().copied())));
    }

    Command::Show { id } => {
      let record = client.get_application(id).await?;
      print!("{}", render::application_detail(&record));
    }

    Command::Submit(args) => {
      let payload = args.into_payload();
      payload.validate().context("application is incomplete")?;
      match client.submit(&payload).await {
        Ok(record) => notifier.success(format!(
          "submitted {} ({})",
          record.verification_code, record.id
        )),
        Err(e) if is_validation(&e) => return Err(e),
        Err(e) => notifier.error(format!("{e:#}")),
      }
    }

    Command::Approve(t) => transition(&client, notifier, Verb::Approve, t).await?,
    Command::Reject(t) => transition(&client, notifier, Verb::Reject, t).await?,
    Command::Return(t) => transition(&client, notifier, Verb::Return, t).await?,
    Command::Review(t) => transition(&client, notifier, Verb::Review, t).await?,
    Command::Pending(t) => transition(&client, notifier, Verb::Pending, t).await?,

    Command::Watch { out_dir } => {
      drop(notifier);
      watch(client, out_dir).await?;
    }

    Command::Users => {
      let users = client.list_users().await?;
      print!("{}", render::users(&users));
    }

    Command::SetRole { user_id, role } => match client.set_role(&user_id, role).await {
      Ok(user) => notifier.success(format!("{} is now {}", user.id, user.role)),
      Err(e) => notifier.error(format!("{e:#}")),
    },

    Command::DeleteUser { user_id } => match client.delete_user(&user_id).await {
      Ok(()) => notifier.success(format!("deleted user {user_id}")),
      Err(e) => notifier.error(format!("{e:#}")),
    },

    Command::Certificate { id, out_dir } => {
      let written = match client.certificate(id).await {
        Ok(cert) => render::write_certificate(&cert, &out_dir),
        Err(e) => Err(e),
      };
      match written {
        Ok(path) => notifier.success(format!("certificate written to {}", path.display())),
        Err(e) => notifier.error(format!("{e:#}")),
      }
    }

    Command::Verify { code } => match client.verify(&code).await {
      Ok(v) => print!("{}", render::verified(&v)),
      Err(e) if e.downcast_ref::<ServerError>().is_some() => {
        notifier.error(format!("no approved certificate for {}", code.trim()))
      }
      Err(e) => return Err(e),
    },
  }
  Ok(())
}

async fn transition(
  client: &ApiClient,
  notifier: Notifier,
  verb: Verb,
  args: TransitionArgs,
) -> Result<()> {
  let me = client.me().await.context("resolving your role")?;
  let action = resolve_action(me.role, verb)
    .ok_or_else(|| anyhow!("a {} has no `{}` action", me.role, verb.label()))?;

  let comment = args.comment.filter(|c| !c.trim().is_empty());
  if action.requires_reason() && comment.is_none() {
    bail!("{action} requires a reason: pass --comment");
  }
  let request = TransitionRequest {
    action,
    comment,
    expected_revision: args.expected_revision,
  };

  let failed = Dispatcher::new(client.clone(), notifier)
    .transition_all(&args.ids, &request)
    .await;
  debug!(failed, total = args.ids.len(), "transitions dispatched");
  Ok(())
}

// ─── Live dashboard ───────────────────────────────────────────────────────────

async fn watch(client: ApiClient, out_dir: PathBuf) -> Result<()> {
  let me = client.me().await.context("resolving your role")?;
  let (notifier, mut notes) = notify::channel();
  let (events_tx, mut events) = mpsc::unbounded_channel();

  let follower = tokio::spawn(follow_events(client.clone(), events_tx, notifier.clone()));
  let mut app = App::new(client, me, notifier, out_dir);
  app.reload().await?;

  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  let run_result = run_event_loop(&mut terminal, &mut app, &mut events, &mut notes).await;

  // Restore terminal regardless of result.
  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();
  follower.abort();

  run_result
}

/// Forward pushed events until the dashboard goes away, reconnecting after
/// a drop.
///
/// Every successful connect, the first included, is followed by a resync:
/// the server subscribes before answering, so a snapshot taken after that
/// point misses nothing.
async fn follow_events(
  client: ApiClient,
  tx: mpsc::UnboundedSender<SubscriptionEvent>,
  notifier: Notifier,
) {
  loop {
    match client.events().await {
      Ok(stream) => {
        if tx.send(SubscriptionEvent::Resync).is_err() {
          return;
        }
        let mut stream = pin!(stream);
        while let Some(item) = stream.next().await {
          match item {
            Ok(event) => {
              if tx.send(event).is_err() {
                return;
              }
            }
            Err(e) => {
              notifier.error(format!("{e:#}"));
              break;
            }
          }
        }
        notifier.info("event stream closed, reconnecting");
      }
      Err(e) => notifier.error(format!("{e:#}")),
    }
    if tx.is_closed() {
      return;
    }
    tokio::time::sleep(RECONNECT_DELAY).await;
  }
}

async fn run_event_loop(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App,
  events: &mut mpsc::UnboundedReceiver<SubscriptionEvent>,
  notes: &mut mpsc::UnboundedReceiver<notify::Notification>,
) -> Result<()> {
  loop {
    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;

    // Poll for a key, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    if let Some(Event::Key(key)) = maybe_event
      && key.kind == KeyEventKind::Press
      && !app.handle_key(key).await?
    {
      break;
    }

    // Everything that arrived since the last frame is one batch.
    let mut batch = Vec::new();
    while let Ok(event) = events.try_recv() {
      batch.push(event);
    }
    if !batch.is_empty() && app.apply_events(batch) == FeedUpdate::NeedsResync {
      app.reload().await.ok();
    }

    while let Ok(note) = notes.try_recv() {
      app.notify(note);
    }
  }
  Ok(())
}
