//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use trustify_core::{
  Error as CoreError,
  application::{ApplicationDraft, ApplicationStatus, NewApplication},
  identity,
  store::{
    ApplicationFilter, ApplicationQuery, CertificationStore, Subscription,
    SubscriptionEvent, TransitionOutcome,
  },
  transition::{Action, Actor, TransitionRequest, TUTOR_APPROVE_DEFAULT, plan},
  user::{Principal, Role},
  workflow::{self, WorkflowError},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn payload() -> NewApplication {
  NewApplication {
    document_number: "1020304050".into(),
    institution:     "Universidad de Antioquia".into(),
    program:         "Ingeniería de Sistemas".into(),
    start_date:      Some(date(2024, 2, 1)),
    end_date:        Some(date(2024, 9, 1)),
    plant_type:      "externa".into(),
    plant_location:  "Medellín".into(),
    activities:      "soporte de infraestructura".into(),
  }
}

fn principal(id: &str) -> Principal {
  Principal {
    id:    id.into(),
    email: Some(format!("{id}@example.com")),
    name:  Some(format!("Estudiante {id}")),
  }
}

fn draft(student: &str, created_at: DateTime<Utc>, code: &str) -> ApplicationDraft {
  payload()
    .into_draft(&principal(student), created_at, code.into())
    .unwrap()
}

fn student(id: &str) -> Actor { Actor::new(id, Role::Student) }
fn tutor() -> Actor { Actor::new("tutor-1", Role::Tutor) }
fn admin() -> Actor { Actor::new("admin-1", Role::Admin) }

// ─── Applications ────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_and_get() {
  let s = store().await;
  let submitted = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();

  assert_eq!(submitted.status, ApplicationStatus::Pending);
  assert_eq!(submitted.revision, 1);
  assert!(submitted.verification_code.starts_with("TRF-"));
  assert_eq!(submitted.student_name, "ESTUDIANTE STU-1");
  assert_eq!(submitted.institution, "UNIVERSIDAD DE ANTIOQUIA");

  let fetched = s.get_application(submitted.id).await.unwrap().unwrap();
  assert_eq!(fetched, submitted);
}

#[tokio::test]
async fn get_application_missing_returns_none() {
  let s = store().await;
  assert!(s.get_application(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn verification_code_lookup_ignores_case_and_whitespace() {
  let s = store().await;
  let record = s
    .insert_application(draft("stu-1", Utc::now(), "TRF-LQ2ABC-X1Y2Z"))
    .await
    .unwrap();

  let found = s
    .find_by_verification_code("  trf-lq2abc-x1y2z ")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.id, record.id);
  assert!(s.find_by_verification_code("TRF-NOPE-00000").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_verification_code_is_rejected() {
  let s = store().await;
  s.insert_application(draft("stu-1", Utc::now(), "TRF-DUP-AAAAA"))
    .await
    .unwrap();
  assert!(
    s.insert_application(draft("stu-2", Utc::now(), "TRF-DUP-AAAAA"))
      .await
      .is_err()
  );
}

#[tokio::test]
async fn invalid_submission_writes_nothing() {
  let s = store().await;
  let mut short = payload();
  short.end_date = Some(date(2024, 6, 1));

  let err = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), short)
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::DurationTooShort { .. })));

  let all = s.query_applications(&ApplicationQuery::default()).await.unwrap();
  assert!(all.is_empty());
}

#[tokio::test]
async fn only_students_submit() {
  let s = store().await;
  let err = workflow::submit(&s, &tutor(), &principal("tutor-1"), payload())
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::Forbidden { .. })));
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_orders_newest_first_and_scopes_by_student() {
  let s = store().await;
  let t0 = Utc::now();
  let t1 = s.insert_application(draft("stu-1", t0, "TRF-1-AAAAA")).await.unwrap();
  let t3 = s
    .insert_application(draft("stu-1", t0 + Duration::seconds(2), "TRF-3-AAAAA"))
    .await
    .unwrap();
  let t2 = s
    .insert_application(draft("stu-1", t0 + Duration::seconds(1), "TRF-2-AAAAA"))
    .await
    .unwrap();
  s.insert_application(draft("stu-2", t0, "TRF-4-AAAAA")).await.unwrap();

  let query = ApplicationQuery {
    filter: workflow::scope_filter(&student("stu-1"), ApplicationFilter::default()),
    ..Default::default()
  };
  let ids: Vec<_> = s
    .query_applications(&query)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.id)
    .collect();
  assert_eq!(ids, vec![t3.id, t2.id, t1.id]);

  let everyone = s.query_applications(&ApplicationQuery::default()).await.unwrap();
  assert_eq!(everyone.len(), 4);
}

#[tokio::test]
async fn query_limit_and_offset() {
  let s = store().await;
  let t0 = Utc::now();
  for i in 0..5 {
    s.insert_application(draft("stu-1", t0 + Duration::seconds(i), &format!("TRF-{i}-LIMIT")))
      .await
      .unwrap();
  }
  let page = s
    .query_applications(&ApplicationQuery {
      limit: Some(2),
      offset: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  let codes: Vec<_> = page.iter().map(|r| r.verification_code.as_str()).collect();
  assert_eq!(codes, vec!["TRF-3-LIMIT", "TRF-2-LIMIT"]);
}

#[tokio::test]
async fn null_status_reads_and_filters_as_pending() {
  let s = store().await;
  let record = s.insert_application(draft("stu-1", Utc::now(), "TRF-N-AAAAA")).await.unwrap();
  s.connection()
    .call(|conn| {
      conn.execute("UPDATE applications SET status = NULL", [])?;
      Ok(())
    })
    .await
    .unwrap();

  let fetched = s.get_application(record.id).await.unwrap().unwrap();
  assert_eq!(fetched.status, ApplicationStatus::Pending);

  let pending = s
    .query_applications(&ApplicationQuery {
      filter: ApplicationFilter {
        student_id: None,
        statuses:   vec![ApplicationStatus::Pending],
      },
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn text_search_matches_any_searchable_field() {
  let s = store().await;
  s.insert_application(draft("stu-1", Utc::now(), "TRF-S-AAAAA")).await.unwrap();

  for term in ["antioquia", "1020", "medellín", "trf-s", "pending"] {
    let hits = s
      .query_applications(&ApplicationQuery {
        text: Some(term.into()),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(hits.len(), 1, "{term}");
  }

  let misses = s
    .query_applications(&ApplicationQuery {
      text: Some("100%".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(misses.is_empty());
}

#[tokio::test]
async fn immutable_columns_cannot_be_updated() {
  let s = store().await;
  s.insert_application(draft("stu-1", Utc::now(), "TRF-I-AAAAA")).await.unwrap();
  let result = s
    .connection()
    .call(|conn| {
      conn.execute("UPDATE applications SET verification_code = 'TRF-X'", [])?;
      Ok(())
    })
    .await;
  assert!(result.is_err());
}

// ─── Transitions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn review_flow_keeps_earlier_annotations() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();

  let after_tutor = workflow::transition(
    &s,
    &tutor(),
    record.id,
    &TransitionRequest::new(Action::TutorApprove),
  )
  .await
  .unwrap();
  assert_eq!(after_tutor.status, ApplicationStatus::TutorApproved);
  assert_eq!(after_tutor.review.tutor_comments.as_deref(), Some(TUTOR_APPROVE_DEFAULT));

  let after_admin = workflow::transition(
    &s,
    &admin(),
    record.id,
    &TransitionRequest::new(Action::AdminApprove).with_comment("listo"),
  )
  .await
  .unwrap();

  assert_eq!(after_admin.status, ApplicationStatus::Approved);
  assert_eq!(after_admin.revision, 3);
  assert_eq!(after_admin.review.admin_comments.as_deref(), Some("listo"));
  assert_eq!(after_admin.review.approved_by.as_deref(), Some("admin-1"));
  assert_eq!(after_admin.review.tutor_comments.as_deref(), Some(TUTOR_APPROVE_DEFAULT));
  assert!(after_admin.review.tutor_approved_at.is_some());
  assert_eq!(after_admin.created_at, record.created_at);
  assert_eq!(after_admin.verification_code, record.verification_code);

  let stored = s.get_application(record.id).await.unwrap().unwrap();
  assert_eq!(stored, after_admin);
}

#[tokio::test]
async fn tutor_return_then_tutor_approve() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();

  let returned = workflow::transition(
    &s,
    &tutor(),
    record.id,
    &TransitionRequest::new(Action::TutorReturn).with_comment("adjuntar carta"),
  )
  .await
  .unwrap();
  assert_eq!(returned.status, ApplicationStatus::ReturnedToStudent);
  assert_eq!(returned.review.requires_student_action, Some(true));

  let approved = workflow::transition(
    &s,
    &tutor(),
    record.id,
    &TransitionRequest::new(Action::TutorApprove),
  )
  .await
  .unwrap();
  assert_eq!(approved.status, ApplicationStatus::TutorApproved);
  assert_eq!(approved.review.tutor_return_comments.as_deref(), Some("adjuntar carta"));
}

#[tokio::test]
async fn rejected_transitions_leave_the_record_untouched() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();

  let err = workflow::transition(
    &s,
    &student("stu-1"),
    record.id,
    &TransitionRequest::new(Action::AdminApprove),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::Forbidden { .. })));

  let err = workflow::transition(
    &s,
    &tutor(),
    record.id,
    &TransitionRequest::new(Action::TutorReject).with_comment("  "),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::BlankReason(_))));

  let stored = s.get_application(record.id).await.unwrap().unwrap();
  assert_eq!(stored, record);
}

#[tokio::test]
async fn tutor_cannot_act_after_final_decision() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();
  workflow::transition(&s, &admin(), record.id, &TransitionRequest::new(Action::AdminApprove))
    .await
    .unwrap();

  let err = workflow::transition(
    &s,
    &tutor(),
    record.id,
    &TransitionRequest::new(Action::TutorReturn).with_comment("tarde"),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::IllegalTransition { .. })));
}

#[tokio::test]
async fn stale_revision_conflicts() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();
  workflow::transition(&s, &admin(), record.id, &TransitionRequest::new(Action::AdminMarkReview))
    .await
    .unwrap();

  let mut stale = TransitionRequest::new(Action::AdminApprove);
  stale.expected_revision = Some(1);
  let err = workflow::transition(&s, &admin(), record.id, &stale).await.unwrap_err();
  assert!(matches!(
    err,
    WorkflowError::Rule(CoreError::RevisionConflict { expected: 1, actual: 2, .. })
  ));

  stale.expected_revision = Some(2);
  let applied = workflow::transition(&s, &admin(), record.id, &stale).await.unwrap();
  assert_eq!(applied.revision, 3);
}

#[tokio::test]
async fn transition_on_missing_record() {
  let s = store().await;
  let record = s.insert_application(draft("stu-1", Utc::now(), "TRF-M-AAAAA")).await.unwrap();
  let t = plan(&record, &admin(), Action::AdminApprove, None, Utc::now()).unwrap();

  let outcome = s.apply_transition(Uuid::new_v4(), &t, None).await.unwrap();
  assert_eq!(outcome, TransitionOutcome::NotFound);

  let err = workflow::transition(
    &s,
    &admin(),
    Uuid::new_v4(),
    &TransitionRequest::new(Action::AdminApprove),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::ApplicationNotFound(_))));
}

#[tokio::test]
async fn students_cannot_see_each_other() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();
  let err = workflow::visible_application(&s, &student("stu-2"), record.id)
    .await
    .unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::ApplicationNotFound(_))));
  assert!(workflow::visible_application(&s, &tutor(), record.id).await.is_ok());
}

#[tokio::test]
async fn certificate_requires_approval() {
  let s = store().await;
  let record = workflow::submit(&s, &student("stu-1"), &principal("stu-1"), payload())
    .await
    .unwrap();

  let err = workflow::certificate(&s, &student("stu-1"), record.id).await.unwrap_err();
  assert!(matches!(err, WorkflowError::Rule(CoreError::NotApproved(_))));

  workflow::transition(&s, &admin(), record.id, &TransitionRequest::new(Action::AdminApprove))
    .await
    .unwrap();
  let cert = workflow::certificate(&s, &student("stu-1"), record.id).await.unwrap();
  assert_eq!(cert.verification_code, record.verification_code);
  assert_eq!(cert.duration_months, 7);
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

async fn next_event(sub: &mut impl Subscription) -> SubscriptionEvent {
  tokio::time::timeout(StdDuration::from_secs(2), sub.next())
    .await
    .expect("event within timeout")
    .expect("store still open")
}

#[tokio::test]
async fn subscription_only_sees_matching_changes() {
  let s = store().await;
  let mut sub = s.subscribe(ApplicationFilter::owned_by("stu-1"));

  s.insert_application(draft("stu-2", Utc::now(), "TRF-A-OTHER")).await.unwrap();
  let mine = s.insert_application(draft("stu-1", Utc::now(), "TRF-A-MINE1")).await.unwrap();

  match next_event(&mut sub).await {
    SubscriptionEvent::Changed(r) => assert_eq!(r.id, mine.id),
    other => panic!("unexpected event: {other:?}"),
  }

  workflow::transition(&s, &tutor(), mine.id, &TransitionRequest::new(Action::TutorApprove))
    .await
    .unwrap();
  match next_event(&mut sub).await {
    SubscriptionEvent::Changed(r) => {
      assert_eq!(r.status, ApplicationStatus::TutorApproved);
      assert_eq!(r.revision, 2);
    }
    other => panic!("unexpected event: {other:?}"),
  }
}

#[tokio::test]
async fn inserted_record_matches_later_reads() {
  let s = store().await;
  let mut sub = s.subscribe(ApplicationFilter::default());
  let created_at = DateTime::from_timestamp(1_718_000_000, 123_456_789).unwrap();

  let inserted = s
    .insert_application(draft("stu-1", created_at, "TRF-P-NANOS"))
    .await
    .unwrap();
  assert_eq!(inserted.created_at.timestamp_subsec_nanos(), 123_456_000);
  assert_eq!(inserted.updated_at, inserted.created_at);

  let fetched = s.get_application(inserted.id).await.unwrap().unwrap();
  assert_eq!(fetched, inserted);
  assert_eq!(next_event(&mut sub).await, SubscriptionEvent::Changed(inserted));
}

#[test]
fn workflow_clock_matches_stored_precision() {
  let now = workflow::now();
  assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
}

#[tokio::test]
async fn lagging_subscriber_is_told_to_resync() {
  let s = store().await;
  let mut sub = s.subscribe(ApplicationFilter::default());
  let t0 = Utc::now();
  for i in 0..300 {
    s.insert_application(draft("stu-1", t0, &format!("TRF-{i}-LAG")))
      .await
      .unwrap();
  }
  assert_eq!(next_event(&mut sub).await, SubscriptionEvent::Resync);
}

// ─── Users and identity ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_login_creates_student() {
  let s = store().await;
  let user = identity::bind(&s, &principal("new-1")).await.unwrap();
  assert_eq!(user.role, Role::Student);
  assert_eq!(user.email.as_deref(), Some("new-1@example.com"));

  // A second bind returns the existing record.
  let again = identity::bind(&s, &principal("new-1")).await.unwrap();
  assert_eq!(again.created_at, user.created_at);
  assert_eq!(s.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn role_changes_apply_on_next_lookup() {
  let s = store().await;
  identity::bind(&s, &principal("u-1")).await.unwrap();

  let updated = workflow::change_role(&s, &admin(), "u-1", Role::Tutor).await.unwrap();
  assert_eq!(updated.role, Role::Tutor);
  assert_eq!(identity::resolve_role(&s, &principal("u-1")).await, Role::Tutor);
}

#[tokio::test]
async fn only_admins_manage_users() {
  let s = store().await;
  identity::bind(&s, &principal("u-1")).await.unwrap();

  for actor in [student("u-1"), tutor()] {
    assert!(matches!(
      workflow::change_role(&s, &actor, "u-1", Role::Admin).await,
      Err(WorkflowError::Rule(CoreError::Forbidden { .. }))
    ));
    assert!(matches!(
      workflow::list_users(&s, &actor).await,
      Err(WorkflowError::Rule(CoreError::Forbidden { .. }))
    ));
  }
  assert!(matches!(
    workflow::change_role(&s, &admin(), "ghost", Role::Tutor).await,
    Err(WorkflowError::Rule(CoreError::UserNotFound(_)))
  ));
}

#[tokio::test]
async fn deleted_user_returns_as_student() {
  let s = store().await;
  identity::bind(&s, &principal("u-1")).await.unwrap();
  workflow::change_role(&s, &admin(), "u-1", Role::Admin).await.unwrap();

  workflow::delete_user(&s, &admin(), "u-1").await.unwrap();
  assert!(s.get_user("u-1").await.unwrap().is_none());
  assert!(matches!(
    workflow::delete_user(&s, &admin(), "u-1").await,
    Err(WorkflowError::Rule(CoreError::UserNotFound(_)))
  ));

  assert_eq!(identity::resolve_role(&s, &principal("u-1")).await, Role::Student);
  assert!(s.get_user("u-1").await.unwrap().is_some());
}
