//! Handlers for `/applications` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/applications` | Students see only their own. `?status=a,b&text=&student_id=&created_after=&created_before=&limit=&offset=` |
//! | `POST` | `/applications` | Students only. Body: [`NewApplication`]. 201 |
//! | `GET`  | `/applications/{id}` | Sets `ETag`. 404 if not visible |
//! | `POST` | `/applications/{id}/transitions` | Body: `{"action":"tutor_approve","comment":null}`. Honours `If-Match` |
//! | `GET`  | `/applications/{id}/certificate` | 409 unless approved |
//! | `GET`  | `/applications/events` | Server-sent events, one per write visible under the caller's current role |

use std::{convert::Infallible, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
  },
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tracing::debug;
use trustify_core::{
  application::{ApplicationRecord, ApplicationStatus, NewApplication},
  certificate::Certificate,
  identity,
  store::{ApplicationFilter, ApplicationQuery, CertificationStore, Subscription, SubscriptionEvent},
  transition::TransitionRequest,
  user::{Principal, Role},
  workflow,
};
use uuid::Uuid;

use crate::{auth::Caller, error::ApiError, etag};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
  /// Comma-separated status names.
  pub status:         Option<String>,
  pub text:           Option<String>,
  pub student_id:     Option<String>,
  pub created_after:  Option<DateTime<Utc>>,
  pub created_before: Option<DateTime<Utc>>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

impl ListParams {
  fn statuses(&self) -> Result<Vec<ApplicationStatus>, ApiError> {
    let Some(raw) = self.status.as_deref() else {
      return Ok(Vec::new());
    };
    raw
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| ApplicationStatus::from_stored(Some(s)).map_err(ApiError::from))
      .collect()
  }
}

/// `GET /applications`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ApplicationRecord>>, ApiError>
where
  S: CertificationStore + 'static,
{
  let filter = ApplicationFilter {
    student_id: params.student_id.clone(),
    statuses:   params.statuses()?,
  };
  let query = ApplicationQuery {
    filter:         workflow::scope_filter(&caller.actor, filter),
    text:           params.text,
    created_after:  params.created_after,
    created_before: params.created_before,
    limit:          params.limit,
    offset:         params.offset,
  };
  debug!(actor = %caller.actor.principal_id, role = %caller.actor.role, ?query, "listing applications");

  let records = store
    .query_applications(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(records))
}

// ─── Submit ───────────────────────────────────────────────────────────────────

/// `POST /applications`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(payload): Json<NewApplication>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CertificationStore + 'static,
{
  let record = workflow::submit(store.as_ref(), &caller.actor, &caller.principal, payload).await?;
  let tag = etag::compute_etag(&record);
  Ok((StatusCode::CREATED, [(header::ETAG, tag)], Json(record)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /applications/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CertificationStore + 'static,
{
  let record = workflow::visible_application(store.as_ref(), &caller.actor, id).await?;
  let tag = etag::compute_etag(&record);
  Ok(([(header::ETAG, tag)], Json(record)))
}

// ─── Transition ───────────────────────────────────────────────────────────────

/// `POST /applications/{id}/transitions`
///
/// An `If-Match` header pins the write to the revision it names; a stale tag
/// is refused with 412 before anything is written.
pub async fn transition<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(mut request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CertificationStore + 'static,
{
  if let Some(tag) = etag::if_match(&headers) {
    let current = workflow::visible_application(store.as_ref(), &caller.actor, id).await?;
    if !etag::matches(tag, &current) {
      return Err(ApiError::PreconditionFailed(format!(
        "application {id} has changed since {tag}"
      )));
    }
    request.expected_revision.get_or_insert(current.revision);
  }

  let record = workflow::transition(store.as_ref(), &caller.actor, id, &request).await?;
  let tag = etag::compute_etag(&record);
  Ok(([(header::ETAG, tag)], Json(record)))
}

// ─── Certificate ──────────────────────────────────────────────────────────────

/// `GET /applications/{id}/certificate`
pub async fn certificate<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Certificate>, ApiError>
where
  S: CertificationStore + 'static,
{
  let cert = workflow::certificate(store.as_ref(), &caller.actor, id).await?;
  Ok(Json(cert))
}

// ─── Events ───────────────────────────────────────────────────────────────────

fn to_event(event: SubscriptionEvent) -> Event {
  match event {
    SubscriptionEvent::Changed(record) => {
      let id = record.id.to_string();
      match Event::default().event("changed").id(id).json_data(&record) {
        Ok(event) => event,
        // Unserialisable record: degrade to a resync.
        Err(_) => Event::default().event("resync").data("{}"),
      }
    }
    SubscriptionEvent::Resync => Event::default().event("resync").data("{}"),
  }
}

/// A subscription re-scoped to the principal's role on every write.
///
/// The role is looked up again for each pushed record, so a promotion or
/// demotion applies to an open stream at the next write. A role change is
/// announced with a resync, since records already sent may no longer be
/// visible.
struct ScopedFeed<S>
where
  S: CertificationStore,
{
  store:        Arc<S>,
  principal:    Principal,
  role:         Role,
  subscription: S::Subscription,
  queued:       Option<SubscriptionEvent>,
}

impl<S> ScopedFeed<S>
where
  S: CertificationStore + 'static,
{
  async fn next(&mut self) -> Option<SubscriptionEvent> {
    if let Some(event) = self.queued.take() {
      return Some(event);
    }
    loop {
      let event = self.subscription.next().await?;
      let actor = identity::resolve_actor(self.store.as_ref(), &self.principal).await;
      let scope = workflow::scope_filter(&actor, ApplicationFilter::default());

      let visible = match event {
        SubscriptionEvent::Changed(record) if scope.matches(&record) => {
          Some(SubscriptionEvent::Changed(record))
        }
        SubscriptionEvent::Changed(_) => None,
        SubscriptionEvent::Resync => Some(SubscriptionEvent::Resync),
      };

      if actor.role != self.role {
        debug!(principal = %self.principal.id, from = %self.role, to = %actor.role, "role changed on open stream");
        self.role = actor.role;
        if let Some(SubscriptionEvent::Changed(record)) = visible {
          self.queued = Some(SubscriptionEvent::Changed(record));
        }
        return Some(SubscriptionEvent::Resync);
      }
      if visible.is_some() {
        return visible;
      }
    }
  }
}

/// `GET /applications/events`
pub async fn events<S>(
  State(store): State<Arc<S>>,
  caller: Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  S: CertificationStore + 'static,
{
  debug!(actor = %caller.actor.principal_id, role = %caller.actor.role, "subscription opened");
  let feed = ScopedFeed {
    subscription: store.subscribe(ApplicationFilter::default()),
    store,
    principal: caller.principal,
    role: caller.actor.role,
    queued: None,
  };

  let stream = stream::unfold(feed, |mut feed| async move {
    let event = feed.next().await?;
    Some((Ok::<_, Infallible>(to_event(event)), feed))
  });
  Sse::new(stream).keep_alive(KeepAlive::default())
}
