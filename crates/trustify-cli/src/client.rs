//! Async HTTP client wrapping the Trustify JSON API.
//!
//! Every request carries a timeout. Idempotent reads are retried a bounded
//! number of times with exponential backoff; writes are sent exactly once.

use std::{collections::VecDeque, time::Duration};

use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use trustify_core::{
  application::{ApplicationRecord, ApplicationStatus, NewApplication},
  certificate::{Certificate, VerifiedCertificate},
  store::SubscriptionEvent,
  transition::TransitionRequest,
  user::{Role, UserRecord},
};
use uuid::Uuid;

use crate::sse::{SseFrame, SseParser};

const READ_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Connection settings and the identity to present.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url:     String,
  pub principal_id: String,
  pub email:        Option<String>,
  pub name:         Option<String>,
  pub timeout:      Duration,
}

/// A non-2xx reply, carrying the server's `{"error": ...}` message.
#[derive(Debug, thiserror::Error)]
#[error("{message} ({status})")]
pub struct ServerError {
  pub status:  StatusCode,
  pub message: String,
}

impl ServerError {
  pub fn is_validation(&self) -> bool { self.status == StatusCode::UNPROCESSABLE_ENTITY }
}

#[derive(Deserialize)]
struct ErrorBody {
  error: String,
}

#[derive(Serialize)]
struct RoleBody {
  role: Role,
}

/// Server-side narrowing for `GET /applications`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
  pub statuses: Vec<ApplicationStatus>,
  pub limit:    Option<usize>,
}

/// Async HTTP client for the Trustify REST API.
///
/// Cheap to clone, the inner [`reqwest::Client`]s are `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  /// No overall timeout: event streams stay open indefinitely.
  stream: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .context("failed to build HTTP client")?;
    let stream = Client::builder()
      .connect_timeout(config.timeout)
      .build()
      .context("failed to build streaming HTTP client")?;
    Ok(Self { client, stream, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn identify(&self, req: RequestBuilder) -> RequestBuilder {
    let mut req = req.header("x-principal-id", &self.config.principal_id);
    if let Some(email) = &self.config.email {
      req = req.header("x-principal-email", email);
    }
    if let Some(name) = &self.config.name {
      req = req.header("x-principal-name", name);
    }
    req
  }

  // ── Plumbing ──────────────────────────────────────────────────────────────

  /// `GET` with bounded retries on connection failures, timeouts and 5xx.
  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T> {
    let mut attempt = 1;
    loop {
      let sent = self
        .identify(self.client.get(self.url(path)))
        .query(query)
        .send()
        .await;
      match sent {
        Ok(resp) if resp.status().is_server_error() && attempt < READ_ATTEMPTS => {
          warn!(path, attempt, status = %resp.status(), "retrying read");
        }
        Ok(resp) => return decode(resp, path).await,
        Err(e) if attempt < READ_ATTEMPTS && (e.is_timeout() || e.is_connect()) => {
          warn!(path, attempt, error = %e, "retrying read");
        }
        Err(e) => return Err(e).with_context(|| format!("GET {path} failed")),
      }
      tokio::time::sleep(backoff(attempt)).await;
      attempt += 1;
    }
  }

  async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
    what: &str,
    body: &B,
  ) -> Result<T> {
    let resp = self
      .identify(req)
      .json(body)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    decode(resp, what).await
  }

  // ── Identity ──────────────────────────────────────────────────────────────

  /// `GET /api/me`
  pub async fn me(&self) -> Result<UserRecord> { self.get_json("/me", &[]).await }

  // ── Applications ──────────────────────────────────────────────────────────

  /// `GET /api/applications`, scoped by the server to what the caller may
  /// see and ordered newest first.
  pub async fn list_applications(&self, query: &ListQuery) -> Result<Vec<ApplicationRecord>> {
    let mut params = Vec::new();
    if !query.statuses.is_empty() {
      let joined = query
        .statuses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
      params.push(("status", joined));
    }
    if let Some(limit) = query.limit {
      params.push(("limit", limit.to_string()));
    }
    self.get_json("/applications", &params).await
  }

  /// `GET /api/applications/{id}`
  pub async fn get_application(&self, id: Uuid) -> Result<ApplicationRecord> {
    self.get_json(&format!("/applications/{id}"), &[]).await
  }

  /// `POST /api/applications`
  pub async fn submit(&self, payload: &NewApplication) -> Result<ApplicationRecord> {
    let req = self.client.post(self.url("/applications"));
    self.send_json(req, "POST /applications", payload).await
  }

  /// `POST /api/applications/{id}/transitions`. Never retried.
  pub async fn transition(
    &self,
    id: Uuid,
    request: &TransitionRequest,
  ) -> Result<ApplicationRecord> {
    let req = self
      .client
      .post(self.url(&format!("/applications/{id}/transitions")));
    self
      .send_json(req, "POST /applications/{id}/transitions", request)
      .await
  }

  /// `GET /api/applications/{id}/certificate`
  pub async fn certificate(&self, id: Uuid) -> Result<Certificate> {
    self
      .get_json(&format!("/applications/{id}/certificate"), &[])
      .await
  }

  /// `GET /api/verify/{code}`
  pub async fn verify(&self, code: &str) -> Result<VerifiedCertificate> {
    self.get_json(&format!("/verify/{}", code.trim()), &[]).await
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  /// `GET /api/users`
  pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
    self.get_json("/users", &[]).await
  }

  /// `PUT /api/users/{id}/role`
  pub async fn set_role(&self, user_id: &str, role: Role) -> Result<UserRecord> {
    let req = self.client.put(self.url(&format!("/users/{user_id}/role")));
    self
      .send_json(req, "PUT /users/{id}/role", &RoleBody { role })
      .await
  }

  /// `DELETE /api/users/{id}`
  pub async fn delete_user(&self, user_id: &str) -> Result<()> {
    let resp = self
      .identify(self.client.delete(self.url(&format!("/users/{user_id}"))))
      .send()
      .await
      .context("DELETE /users/{id} failed")?;
    check(resp).await.map(drop)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  /// `GET /api/applications/events` as a stream of subscription events.
  ///
  /// The stream ends when the server closes the connection.
  pub async fn events(
    &self,
  ) -> Result<impl Stream<Item = Result<SubscriptionEvent>> + Send + 'static> {
    let resp = self
      .identify(self.stream.get(self.url("/applications/events")))
      .header(header::ACCEPT, "text/event-stream")
      .send()
      .await
      .context("GET /applications/events failed")?;
    let body = Box::pin(check(resp).await?.bytes_stream());

    let state = (body, SseParser::default(), VecDeque::new());
    Ok(stream::unfold(state, |(mut body, mut parser, mut ready)| async move {
      loop {
        if let Some(frame) = ready.pop_front() {
          match to_event(frame) {
            Some(event) => return Some((event, (body, parser, ready))),
            None => continue,
          }
        }
        match body.next().await {
          Some(Ok(chunk)) => ready.extend(parser.push(&chunk)),
          Some(Err(e)) => {
            let err = anyhow::Error::new(e).context("reading event stream");
            return Some((Err(err), (body, parser, ready)));
          }
          None => return None,
        }
      }
    }))
  }
}

fn backoff(attempt: u32) -> Duration { BACKOFF_BASE * 2u32.pow(attempt - 1) }

/// Map a frame to an event. Unknown event names are ignored.
fn to_event(frame: SseFrame) -> Option<Result<SubscriptionEvent>> {
  match frame.event.as_deref() {
    Some("changed") => Some(
      serde_json::from_str::<ApplicationRecord>(&frame.data)
        .map(SubscriptionEvent::Changed)
        .context("deserialising changed record"),
    ),
    Some("resync") => Some(Ok(SubscriptionEvent::Resync)),
    other => {
      debug!(event = ?other, id = ?frame.id, "ignoring event");
      None
    }
  }
}

/// Turn a non-2xx reply into a [`ServerError`].
async fn check(resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let message = match resp.json::<ErrorBody>().await {
    Ok(body) => body.error,
    Err(_) => status
      .canonical_reason()
      .unwrap_or("request failed")
      .to_owned(),
  };
  Err(ServerError { status, message }.into())
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
  check(resp)
    .await?
    .json()
    .await
    .with_context(|| format!("deserialising {what}"))
}
