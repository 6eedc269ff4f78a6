use std::sync::Arc;
use std::time::Duration;

use folio_common::import::{parse_file, ImportOptions, RawImportFile};
use folio_common::types::{DraftFields, PostStatus};
use folio_editor::draft::DraftField;
use folio_editor::persistence::StoreOp;
use folio_editor::workflow::{SaveKind, SavePhase, SaveTrigger};
use folio_editor::{
    spawn_session, EditorConfig, FieldUpdate, MemoryPostStore, PersistenceError, SaveStatus,
    SessionError, SessionEvent, SessionHandle,
};
use tokio::sync::broadcast;
use tokio::time;

fn start(store: &MemoryPostStore) -> SessionHandle {
    spawn_session(Arc::new(store.clone()), EditorConfig::default())
}

async fn fill(handle: &SessionHandle, title: &str, content: &str) {
    handle.update_field(FieldUpdate::Title(title.into())).await.unwrap();
    handle.update_field(FieldUpdate::Content(content.into())).await.unwrap();
}

/// Wait for the first event matching `pred`. Paused time auto-advances
/// while the session task waits on its timers.
async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = events.recv().await.expect("event channel open");
        if pred(&event) {
            return event;
        }
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// ── Auto-derivation ─────────────────────────────────────────────────

#[tokio::test]
async fn title_drives_slug_after_debounce() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);

    handle.update_field(FieldUpdate::Title("Hello World".into())).await.unwrap();
    time::advance(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().await.unwrap().fields.slug, "");

    time::advance(Duration::from_millis(250)).await;
    assert_eq!(handle.snapshot().await.unwrap().fields.slug, "hello-world");

    handle.shutdown().await;
}

#[tokio::test]
async fn manual_slug_is_never_overwritten() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);

    handle.update_field(FieldUpdate::Title("First".into())).await.unwrap();
    handle.update_field(FieldUpdate::Slug("my-own-slug".into())).await.unwrap();
    time::advance(Duration::from_millis(400)).await;
    handle.update_field(FieldUpdate::Title("Second".into())).await.unwrap();
    time::advance(Duration::from_millis(400)).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.fields.slug, "my-own-slug");
    assert!(state.overrides.slug_user_edited);

    handle.shutdown().await;
}

#[tokio::test]
async fn content_drives_excerpt_and_override_blocks_it() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);

    handle.update_field(FieldUpdate::Content("# Title\n\nFirst words.".into())).await.unwrap();
    time::advance(Duration::from_millis(600)).await;
    assert_eq!(handle.snapshot().await.unwrap().fields.excerpt, "First words.");

    handle.update_field(FieldUpdate::Excerpt("Hand written.".into())).await.unwrap();
    handle.update_field(FieldUpdate::Content("Other words.".into())).await.unwrap();
    time::advance(Duration::from_millis(600)).await;
    assert_eq!(handle.snapshot().await.unwrap().fields.excerpt, "Hand written.");

    handle.shutdown().await;
}

// ── Autosave ────────────────────────────────────────────────────────

#[tokio::test]
async fn rapid_edits_produce_one_autosave() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    let mut events = handle.subscribe();

    for n in 1..=10 {
        handle.update_field(FieldUpdate::Title(format!("Title {n}"))).await.unwrap();
        handle.update_field(FieldUpdate::Content(format!("Body {n}"))).await.unwrap();
        time::advance(Duration::from_millis(100)).await;
    }

    let saved = wait_for(&mut events, |e| matches!(e, SessionEvent::Saved { .. })).await;
    let SessionEvent::Saved { trigger, kind, .. } = saved else { unreachable!() };
    assert_eq!(trigger, SaveTrigger::Autosave);
    assert_eq!(kind, SaveKind::Draft);
    assert_eq!(store.calls(StoreOp::Create), 1);

    // Clean draft: nothing more to save.
    time::advance(Duration::from_secs(120)).await;
    let state = handle.snapshot().await.unwrap();
    assert!(!state.is_dirty);
    assert_eq!(state.fields.title, "Title 10");
    assert_eq!(store.calls(StoreOp::Create), 1);
    assert_eq!(store.calls(StoreOp::Update), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn autosave_waits_for_the_interval() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);

    fill(&handle, "Post", "Body").await;
    time::advance(Duration::from_secs(20)).await;
    handle.snapshot().await.unwrap();
    assert_eq!(store.calls(StoreOp::Create), 0);

    time::advance(Duration::from_secs(15)).await;
    let mut state = handle.watch();
    state.wait_for(|state| state.last_saved_at.is_some()).await.unwrap();
    assert_eq!(store.calls(StoreOp::Create), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn disabled_autosave_never_saves() {
    time::pause();
    let store = MemoryPostStore::new();
    let mut config = EditorConfig::default();
    config.autosave.enabled = false;
    let handle = spawn_session(Arc::new(store.clone()), config);

    fill(&handle, "Post", "Body").await;
    time::advance(Duration::from_secs(300)).await;

    assert!(handle.snapshot().await.unwrap().is_dirty);
    assert_eq!(store.calls(StoreOp::Create), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn failed_autosave_retries_one_interval_later() {
    time::pause();
    let store = MemoryPostStore::new();
    store.fail_next(StoreOp::Create, PersistenceError::Unavailable("offline".into())).await;
    let handle = start(&store);
    let mut events = handle.subscribe();
    fill(&handle, "Post", "Body").await;

    wait_for(&mut events, |e| matches!(e, SessionEvent::SaveFailed { .. })).await;
    assert_eq!(store.calls(StoreOp::Create), 1);
    let state = handle.snapshot().await.unwrap();
    assert!(state.is_dirty);
    assert_eq!(state.last_saved_at, None);

    // No retry until the next full interval.
    time::advance(Duration::from_secs(29)).await;
    assert_eq!(store.calls(StoreOp::Create), 1);

    let saved = wait_for(&mut events, |e| matches!(e, SessionEvent::Saved { .. })).await;
    assert!(matches!(saved, SessionEvent::Saved { trigger: SaveTrigger::Autosave, .. }));
    assert_eq!(store.calls(StoreOp::Create), 2);
    assert!(!handle.snapshot().await.unwrap().is_dirty);

    handle.shutdown().await;
}

#[tokio::test]
async fn oversized_interval_leaves_the_session_running() {
    time::pause();
    let store = MemoryPostStore::new();
    let mut config = EditorConfig::default();
    config.autosave.interval_sec = u64::MAX;
    let handle = spawn_session(Arc::new(store.clone()), config);

    fill(&handle, "Post", "Body").await;
    time::advance(Duration::from_secs(300)).await;

    let state = handle.snapshot().await.unwrap();
    assert!(state.is_dirty);
    assert_eq!(state.fields.slug, "post");
    assert_eq!(store.calls(StoreOp::Create), 0);
    assert!(matches!(handle.save_draft().await, Ok(SaveStatus::Completed { .. })));

    handle.shutdown().await;
}

// ── Save workflow ───────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_saves_issue_one_request() {
    time::pause();
    let store = MemoryPostStore::new().with_latency(Duration::from_millis(500));
    let handle = start(&store);
    fill(&handle, "Post", "Body").await;

    let (first, second) = tokio::join!(handle.save_draft(), handle.save_draft());

    assert!(matches!(first, Ok(SaveStatus::Completed { .. })));
    assert_eq!(second, Ok(SaveStatus::Suppressed));
    assert_eq!(store.calls(StoreOp::Create), 1);
    assert_eq!(store.calls(StoreOp::Get), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn saved_slug_becomes_baseline_and_title_tracking_resumes() {
    time::pause();
    let store = MemoryPostStore::new();
    store
        .seed(&DraftFields {
            title: "Other".into(),
            slug: "custom".into(),
            content: "x".into(),
            ..DraftFields::default()
        })
        .await;
    let handle = start(&store);

    fill(&handle, "Post", "Body").await;
    handle.update_field(FieldUpdate::Slug("custom".into())).await.unwrap();
    let status = handle.save_draft().await.unwrap();
    let SaveStatus::Completed { post_id, .. } = status else { panic!("expected a save") };

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.post_id, Some(post_id));
    assert_eq!(state.fields.slug, "custom-2");
    assert!(!state.overrides.slug_user_edited);
    assert!(!state.is_dirty);
    assert_eq!(state.phase, SavePhase::Done);

    handle.update_field(FieldUpdate::Title("A New Title".into())).await.unwrap();
    time::advance(Duration::from_millis(400)).await;
    assert_eq!(handle.snapshot().await.unwrap().fields.slug, "a-new-title");

    handle.shutdown().await;
}

#[tokio::test]
async fn explicit_save_of_invalid_draft_reports_fields() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    let mut events = handle.subscribe();

    handle.update_field(FieldUpdate::Title("Only title".into())).await.unwrap();
    let error = handle.save_draft().await.unwrap_err();

    let SessionError::Validation(errors) = error else { panic!("expected validation error") };
    assert!(errors.contains(DraftField::Content));
    assert!(!errors.contains(DraftField::Title));
    assert_eq!(store.calls(StoreOp::Create), 0);
    assert!(drain(&mut events).iter().any(|e| matches!(e, SessionEvent::ValidationFailed { .. })));

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.phase, SavePhase::Failed);
    assert!(state.field_errors.contains(DraftField::Content));

    handle.shutdown().await;
}

#[tokio::test]
async fn repeated_failure_is_surfaced_once() {
    time::pause();
    let store = MemoryPostStore::new();
    let offline = PersistenceError::Unavailable("offline".into());
    store.fail_next(StoreOp::Create, offline.clone()).await;
    store.fail_next(StoreOp::Create, offline.clone()).await;
    let handle = start(&store);
    let mut events = handle.subscribe();
    fill(&handle, "Post", "Body").await;

    for _ in 0..2 {
        let error = handle.save_draft().await.unwrap_err();
        assert_eq!(error, SessionError::Persistence(offline.clone()));
    }

    let notices = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::SaveFailed { .. }))
        .count();
    assert_eq!(notices, 1);

    let state = handle.snapshot().await.unwrap();
    assert!(state.is_dirty);
    assert_eq!(state.post_id, None);
    assert_eq!(state.last_error.as_deref(), Some("backend unavailable: offline"));

    // Third attempt goes through and clears the error.
    assert!(matches!(handle.save_draft().await, Ok(SaveStatus::Completed { .. })));
    assert_eq!(handle.snapshot().await.unwrap().last_error, None);

    handle.shutdown().await;
}

#[tokio::test]
async fn publish_and_unpublish_round_trip() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    let mut events = handle.subscribe();
    fill(&handle, "Launch", "We are live.").await;

    let SaveStatus::Completed { post_id, .. } = handle.publish().await.unwrap() else {
        panic!("expected publish")
    };
    assert_eq!(store.calls(StoreOp::Publish), 1);
    assert_eq!(handle.snapshot().await.unwrap().fields.status, PostStatus::Published);
    let record = store.post(post_id).await.unwrap();
    assert!(record.published_at.is_some());

    handle.unpublish().await.unwrap();
    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.fields.status, PostStatus::Draft);
    assert!(!state.is_dirty);
    assert_eq!(store.post(post_id).await.unwrap().fields.status, PostStatus::Draft);
    assert!(drain(&mut events).contains(&SessionEvent::Unpublished { post_id }));

    handle.shutdown().await;
}

#[tokio::test]
async fn failed_update_leaves_fields_and_save_time_alone() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    fill(&handle, "Post", "Body").await;
    let SaveStatus::Completed { post_id, saved_at } = handle.save_draft().await.unwrap() else {
        panic!("expected first save")
    };

    handle.update_field(FieldUpdate::Content("Edited body".into())).await.unwrap();
    let before = handle.snapshot().await.unwrap();
    let offline = PersistenceError::Unavailable("offline".into());
    store.fail_next(StoreOp::Update, offline.clone()).await;

    let error = handle.save_draft().await.unwrap_err();

    assert_eq!(error, SessionError::Persistence(offline));
    let after = handle.snapshot().await.unwrap();
    assert_eq!(after.fields, before.fields);
    assert_eq!(after.last_saved_at, Some(saved_at));
    assert_eq!(after.post_id, Some(post_id));
    assert!(after.is_dirty);
    assert_eq!(after.phase, SavePhase::Failed);
    assert_eq!(store.post(post_id).await.unwrap().fields.content, "Body");

    handle.shutdown().await;
}

#[tokio::test]
async fn failed_reload_keeps_created_id_and_dirty_draft() {
    time::pause();
    let store = MemoryPostStore::new();
    store.fail_next(StoreOp::Get, PersistenceError::Unavailable("timeout".into())).await;
    let handle = start(&store);
    fill(&handle, "Post", "Body").await;

    let error = handle.save_draft().await.unwrap_err();

    assert_eq!(error, SessionError::Persistence(PersistenceError::Unavailable("timeout".into())));
    assert_eq!(store.len().await, 1);
    let state = handle.snapshot().await.unwrap();
    assert!(state.post_id.is_some());
    assert!(state.is_dirty);
    assert_eq!(state.last_saved_at, None);

    // The retry updates the created post instead of creating a second one.
    assert!(matches!(handle.save_draft().await, Ok(SaveStatus::Completed { .. })));
    assert_eq!(store.calls(StoreOp::Create), 1);
    assert_eq!(store.calls(StoreOp::Update), 1);
    assert_eq!(store.len().await, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn unpublish_keeps_unsaved_edits_for_autosave() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    let mut events = handle.subscribe();
    fill(&handle, "Launch", "Body").await;
    let SaveStatus::Completed { post_id, .. } = handle.publish().await.unwrap() else {
        panic!("expected publish")
    };

    handle.update_field(FieldUpdate::Content("Unsaved new body".into())).await.unwrap();
    handle.unpublish().await.unwrap();

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.fields.status, PostStatus::Draft);
    assert_eq!(state.fields.content, "Unsaved new body");
    assert!(state.is_dirty);
    assert_eq!(store.post(post_id).await.unwrap().fields.content, "Body");

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Saved { trigger: SaveTrigger::Autosave, .. })
    })
    .await;
    let record = store.post(post_id).await.unwrap();
    assert_eq!(record.fields.content, "Unsaved new body");
    assert_eq!(record.fields.status, PostStatus::Draft);
    assert_eq!(store.calls(StoreOp::Update), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn scheduled_publish_skips_publish_call() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    fill(&handle, "Later", "Soon.").await;
    handle.update_field(FieldUpdate::Status(PostStatus::Scheduled)).await.unwrap();

    let error = handle.publish().await.unwrap_err();
    assert!(matches!(
        error,
        SessionError::Validation(ref e) if e.contains(DraftField::ScheduledFor)
    ));

    handle.update_field(FieldUpdate::ScheduledFor(Some(chrono::Utc::now()))).await.unwrap();
    handle.publish().await.unwrap();

    assert_eq!(store.calls(StoreOp::Publish), 0);
    assert_eq!(handle.snapshot().await.unwrap().fields.status, PostStatus::Scheduled);

    handle.shutdown().await;
}

#[tokio::test]
async fn unpublish_before_first_save_is_an_error() {
    time::pause();
    let handle = start(&MemoryPostStore::new());
    assert_eq!(handle.unpublish().await, Err(SessionError::NoPostId));
    handle.shutdown().await;
}

// ── Load, reset, import ─────────────────────────────────────────────

#[tokio::test]
async fn loading_a_post_keeps_its_canonical_slug() {
    time::pause();
    let store = MemoryPostStore::new();
    let record = store
        .seed(&DraftFields {
            title: "Loaded Title".into(),
            slug: "legacy-url".into(),
            content: "Body".into(),
            ..DraftFields::default()
        })
        .await;
    let handle = start(&store);
    let mut events = handle.subscribe();

    handle.load_post(record.id).await.unwrap();
    time::advance(Duration::from_secs(60)).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.post_id, Some(record.id));
    assert_eq!(state.fields.slug, "legacy-url");
    assert!(!state.is_dirty);
    assert_eq!(store.calls(StoreOp::Update), 0);
    assert!(drain(&mut events).contains(&SessionEvent::Loaded { post_id: record.id }));

    handle.shutdown().await;
}

#[tokio::test]
async fn loading_a_missing_post_fails() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    let id = uuid::Uuid::new_v4();

    let error = handle.load_post(id).await.unwrap_err();

    assert_eq!(error, SessionError::Persistence(PersistenceError::NotFound(id)));
    assert!(!handle.snapshot().await.unwrap().is_loading);
    handle.shutdown().await;
}

#[tokio::test]
async fn reset_returns_to_loaded_version() {
    time::pause();
    let store = MemoryPostStore::new();
    let kept =
        DraftFields { title: "Kept".into(), content: "Body".into(), ..DraftFields::default() };
    let record = store.seed(&kept).await;
    let handle = start(&store);
    handle.load_post(record.id).await.unwrap();

    handle.update_field(FieldUpdate::Title("Scratch".into())).await.unwrap();
    handle.reset().await.unwrap();
    time::advance(Duration::from_secs(60)).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.fields.title, "Kept");
    assert_eq!(state.fields.slug, "kept");
    assert!(!state.is_dirty);
    assert_eq!(store.calls(StoreOp::Update), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn imported_html_fills_an_empty_draft() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);

    let file = RawImportFile::from_text(
        "post.html",
        "<h1>Hello</h1><p>World <strong>wide</strong> web.</p>",
    );
    let result = parse_file(&file, &ImportOptions::default()).unwrap();
    let filled = handle.merge_import(result).await.unwrap();

    assert_eq!(filled, vec![DraftField::Title, DraftField::Content, DraftField::Excerpt]);
    time::advance(Duration::from_millis(600)).await;

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.fields.title, "Hello");
    assert_eq!(state.fields.content, "# Hello\n\nWorld **wide** web.");
    assert_eq!(state.fields.slug, "hello");
    assert_eq!(state.fields.excerpt, "World wide web.");
    assert!(!state.overrides.excerpt_user_edited);

    handle.shutdown().await;
}

#[tokio::test]
async fn generate_slug_and_validate_through_handle() {
    time::pause();
    let handle = start(&MemoryPostStore::new());

    assert!(matches!(handle.validate().await, Err(SessionError::Validation(_))));

    handle.update_field(FieldUpdate::Title("Über Café".into())).await.unwrap();
    handle.update_field(FieldUpdate::Slug("manual".into())).await.unwrap();
    assert_eq!(handle.generate_slug().await.unwrap(), "uber-cafe");
    assert!(!handle.snapshot().await.unwrap().overrides.slug_user_edited);

    handle.shutdown().await;
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_abandons_in_flight_save() {
    time::pause();
    let store = MemoryPostStore::new().with_latency(Duration::from_secs(1));
    let handle = start(&store);
    fill(&handle, "Post", "Body").await;

    let saver = handle.clone();
    let save = tokio::spawn(async move { saver.save_draft().await });
    while !handle.snapshot().await.unwrap().is_saving {
        tokio::task::yield_now().await;
    }

    handle.shutdown().await;
    assert_eq!(save.await.unwrap(), Err(SessionError::Closed));

    time::advance(Duration::from_secs(120)).await;
    assert!(store.is_empty().await);
    assert_eq!(store.calls(StoreOp::Get), 0);
    assert_eq!(handle.update_field(FieldUpdate::Featured(true)).await, Err(SessionError::Closed));
}

#[tokio::test]
async fn dropping_every_handle_stops_autosave() {
    time::pause();
    let store = MemoryPostStore::new();
    let handle = start(&store);
    fill(&handle, "Post", "Body").await;

    drop(handle);
    tokio::task::yield_now().await;
    time::advance(Duration::from_secs(120)).await;
    tokio::task::yield_now().await;

    assert_eq!(store.calls(StoreOp::Create), 0);
}
