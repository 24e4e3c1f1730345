//! Notification bus.
//!
//! Business operations report their outcome as a [`Notification`] on an
//! unbounded channel. A single presentation task owns the receiving end:
//! [`spawn_printer`] for one-shot commands, the dashboard status bar for
//! `watch`.

use std::fmt;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
  Success,
  Error,
  Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub kind: NotificationKind,
  pub text: String,
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = match self.kind {
      NotificationKind::Success => "ok",
      NotificationKind::Error => "error",
      NotificationKind::Info => "info",
    };
    write!(f, "{tag}: {}", self.text)
  }
}

/// Sending half of the bus. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: mpsc::UnboundedSender<Notification>,
}

pub fn channel() -> (Notifier, mpsc::UnboundedReceiver<Notification>) {
  let (tx, rx) = mpsc::unbounded_channel();
  (Notifier { tx }, rx)
}

impl Notifier {
  pub fn send(&self, kind: NotificationKind, text: impl Into<String>) {
    let notification = Notification { kind, text: text.into() };
    if self.tx.send(notification).is_err() {
      debug!("notification dropped, presenter has gone");
    }
  }

  pub fn success(&self, text: impl Into<String>) { self.send(NotificationKind::Success, text) }

  pub fn error(&self, text: impl Into<String>) { self.send(NotificationKind::Error, text) }

  pub fn info(&self, text: impl Into<String>) { self.send(NotificationKind::Info, text) }
}

/// Print notifications until every [`Notifier`] is dropped. Resolves to the
/// number of errors seen.
pub fn spawn_printer(mut rx: mpsc::UnboundedReceiver<Notification>) -> JoinHandle<usize> {
  tokio::spawn(async move {
    let mut errors = 0;
    while let Some(n) = rx.recv().await {
      if n.kind == NotificationKind::Error {
        errors += 1;
        eprintln!("{n}");
      } else {
        println!("{n}");
      }
    }
    errors
  })
}
