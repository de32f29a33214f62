//! Execution context builder integration tests: the admit → resolve →
//! run → terminate pipeline, including dedup short-circuits and the
//! cancellation race.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use duramation::context::{ExecutionContextBuilder, RunOutcome, TriggerData, TriggerEvent};
use duramation::credential_store::CredentialStore;
use duramation::providers::{Provider, Registry};
use duramation::realtime::{
    AiStreamMessage, BroadcastBus, BusMessage, Channel, Topic, WorkflowUpdate,
};
use duramation::repositories::WorkflowRunRepository;
use duramation::runs::RunTracker;

use common::{credential_repo, google_secret, setup_db};

struct Harness {
    builder: ExecutionContextBuilder,
    store: Arc<CredentialStore>,
    tracker: Arc<RunTracker>,
    bus: Arc<BroadcastBus>,
}

async fn harness(db: &sea_orm::DatabaseConnection) -> Harness {
    let bus = Arc::new(BroadcastBus::default());
    let store = Arc::new(CredentialStore::new(
        credential_repo(db),
        Registry::new(),
        300,
    ));
    let tracker = Arc::new(RunTracker::new(
        WorkflowRunRepository::new(Arc::new(db.clone())),
        bus.clone(),
    ));
    let builder = ExecutionContextBuilder::new(store.clone(), tracker.clone(), bus.clone());
    Harness {
        builder,
        store,
        tracker,
        bus,
    }
}

fn trigger(workflow_id: Uuid, user_id: Uuid, key: &str) -> TriggerEvent {
    TriggerEvent {
        event_name: "workflow/run.requested".to_string(),
        data: TriggerData {
            workflow_id,
            user_id,
            idempotency_key: key.to_string(),
            input: Some(json!({ "q": "hello" })),
        },
    }
}

#[tokio::test]
async fn happy_path_runs_body_and_completes() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    h.store
        .store_from_callback(
            &user_id,
            google_secret("token", Utc::now() + ChronoDuration::hours(2)),
            Some(&workflow_id),
        )
        .await
        .unwrap();

    let channel = Channel::new(user_id, workflow_id);
    let mut receiver = h.bus.subscribe(&channel, Topic::Updates);
    let mut ai_receiver = h.bus.subscribe(&channel, Topic::AiStream);

    let outcome = h
        .builder
        .execute(
            trigger(workflow_id, user_id, "key-1"),
            "run-1",
            &[Provider::Google],
            CancellationToken::new(),
            |ctx| async move {
                assert_eq!(ctx.credentials.len(), 1);
                assert!(ctx.credential(Provider::Google).is_some());
                assert_eq!(ctx.input, Some(json!({ "q": "hello" })));
                assert!(!ctx.cancellation().is_cancelled());
                ctx.publish(WorkflowUpdate::progress("working", 1, 2)).await;
                ctx.publish_ai_chunk(AiStreamMessage::chunk("hel")).await;
                ctx.publish_ai_chunk(AiStreamMessage::chunk("lo")).await;
                ctx.publish_ai_chunk(AiStreamMessage::complete()).await;
                Ok(json!({ "processed": true }))
            },
        )
        .await
        .unwrap();

    let RunOutcome::Completed(output) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(output, json!({ "processed": true }));

    let run = h
        .tracker
        .find_by_external_run_id("run-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, "COMPLETED");

    // Status, progress, then the terminal result in publish order
    let mut kinds = Vec::new();
    while let Ok(BusMessage::Update(update)) = receiver.try_recv() {
        kinds.push(match update {
            WorkflowUpdate::Status { .. } => "status",
            WorkflowUpdate::Progress { .. } => "progress",
            WorkflowUpdate::Result { .. } => "result",
            WorkflowUpdate::Log { .. } => "log",
        });
    }
    assert_eq!(kinds, vec!["status", "progress", "result"]);

    // The AI stream arrives in order and is closed by the complete marker
    let mut chunks = String::new();
    loop {
        let BusMessage::AiStream(message) = ai_receiver.try_recv().unwrap() else {
            panic!("expected ai-stream message");
        };
        if message.is_complete {
            break;
        }
        chunks.push_str(&message.chunk);
    }
    assert_eq!(chunks, "hello");
}

#[tokio::test]
async fn duplicate_trigger_never_invokes_body() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let invocations = Arc::new(AtomicUsize::new(0));

    for run_id in ["run-1", "run-2"] {
        let invocations = invocations.clone();
        let outcome = h
            .builder
            .execute(
                trigger(workflow_id, user_id, "same-key"),
                run_id,
                &[],
                CancellationToken::new(),
                move |_ctx| async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(null))
                },
            )
            .await
            .unwrap();

        if run_id == "run-2" {
            assert!(matches!(outcome, RunOutcome::Deduplicated));
        }
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_error_fails_the_run() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let outcome = h
        .builder
        .execute(
            trigger(workflow_id, user_id, "key-1"),
            "run-1",
            &[],
            CancellationToken::new(),
            |_ctx| async move { anyhow::bail!("provider exploded") },
        )
        .await
        .unwrap();

    let RunOutcome::Failed(message) = outcome else {
        panic!("expected failure");
    };
    assert!(message.contains("provider exploded"));

    let run = h
        .tracker
        .find_by_external_run_id("run-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, "FAILED");
    assert_eq!(run.error.as_deref(), Some("provider exploded"));
}

#[tokio::test]
async fn missing_required_credential_fails_before_body() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let invocations = Arc::new(AtomicUsize::new(0));

    let channel = Channel::new(user_id, workflow_id);
    let mut receiver = h.bus.subscribe(&channel, Topic::Updates);

    let body_invocations = invocations.clone();
    let outcome = h
        .builder
        .execute(
            trigger(workflow_id, user_id, "key-1"),
            "run-1",
            &[Provider::Slack],
            CancellationToken::new(),
            move |_ctx| async move {
                body_invocations.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let run = h
        .tracker
        .find_by_external_run_id("run-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, "FAILED");

    // A terminal result event was still published for subscribers
    let BusMessage::Update(WorkflowUpdate::Result { data: Some(data), .. }) =
        receiver.recv().await.unwrap()
    else {
        panic!("expected result update");
    };
    assert!(!data.success);
}

#[tokio::test]
async fn cancellation_signal_cancels_the_run() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let cancellation = CancellationToken::new();
    let trigger_cancel = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger_cancel.cancel();
    });

    let outcome = h
        .builder
        .execute(
            trigger(workflow_id, user_id, "key-1"),
            "run-1",
            &[],
            cancellation,
            |_ctx| async move {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                Ok(json!(null))
            },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled));

    let run = h
        .tracker
        .find_by_external_run_id("run-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, "CANCELLED");
}

#[tokio::test]
async fn external_cancel_beats_late_completion() {
    let db = setup_db().await;
    let h = harness(&db).await;
    let workflow_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let tracker = h.tracker.clone();
    let outcome = h
        .builder
        .execute(
            trigger(workflow_id, user_id, "key-1"),
            "run-1",
            &[],
            CancellationToken::new(),
            move |_ctx| async move {
                // External cancellation lands while the body is still running
                tracker.cancel(&workflow_id, &user_id).await?;
                Ok(json!({ "finished": "normally" }))
            },
        )
        .await
        .unwrap();

    // The body returned Ok, but the first terminal write was CANCELLED
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    let run = h
        .tracker
        .find_by_external_run_id("run-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, "CANCELLED");
}
