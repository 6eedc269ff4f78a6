// Session runtime: one tokio task per open draft.
//
// The task owns the `DraftSession` and is the only thing that mutates it.
// Callers talk to it through `SessionHandle` (mpsc commands with oneshot
// replies), watch its state on a `watch` channel and receive notices on a
// `broadcast` channel. The loop selects over commands, the next timer
// deadline and the single in-flight save step.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use folio_common::import::ImportResult;
use folio_common::types::PostRecord;

use crate::config::EditorConfig;
use crate::draft::{DraftField, DraftSessionState, FieldUpdate, ValidationErrors};
use crate::error::SessionError;
use crate::persistence::{PersistenceError, PostStore};
use crate::session::{DraftSession, SaveStep};
use crate::workflow::{reload, PersistOutcome, SaveJob, SaveKind, SaveTrigger};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

// ── Events ─────────────────────────────────────────────────────────

/// Notices for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Loaded { post_id: Uuid },
    /// Auto-derivation rewrote these fields.
    Derived { fields: Vec<DraftField> },
    AutosaveStarted,
    Saved { post_id: Uuid, kind: SaveKind, trigger: SaveTrigger, saved_at: DateTime<Utc> },
    Unpublished { post_id: Uuid },
    /// Sent once per distinct failure message.
    SaveFailed { message: String },
    ValidationFailed { errors: ValidationErrors },
}

/// Reply to an explicit save, publish or unpublish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    Completed { post_id: Uuid, saved_at: DateTime<Utc> },
    /// Another save was already in flight; nothing was sent.
    Suppressed,
}

// ── Commands ───────────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<T>;

enum Command {
    UpdateField { update: FieldUpdate, reply: Reply<bool> },
    MergeImport { result: Box<ImportResult>, reply: Reply<Vec<DraftField>> },
    Load { id: Uuid, reply: Reply<Result<(), SessionError>> },
    Save { kind: SaveKind, reply: Reply<Result<SaveStatus, SessionError>> },
    Reset { reply: Reply<()> },
    GenerateSlug { reply: Reply<String> },
    Validate { reply: Reply<Result<(), ValidationErrors>> },
    Snapshot { reply: Reply<DraftSessionState> },
    Shutdown { reply: Reply<()> },
}

// ── Handle ─────────────────────────────────────────────────────────

/// Start a session task for a new, empty draft.
pub fn spawn_session<S: PostStore>(store: Arc<S>, config: EditorConfig) -> SessionHandle {
    let session = DraftSession::new(&config);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (state_tx, state_rx) = watch::channel(session.snapshot());
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor =
        SessionActor { session, store, in_flight: None, state_tx, events_tx: events_tx.clone() };
    tokio::spawn(actor.run(command_rx));

    SessionHandle { commands: command_tx, state: state_rx, events: events_tx }
}

/// Cheap, cloneable handle to a session task. The task stops when
/// `shutdown` is called or the last handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<DraftSessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands.send(command(reply_tx)).await.map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Apply a user edit. Returns whether the value changed.
    pub async fn update_field(&self, update: FieldUpdate) -> Result<bool, SessionError> {
        self.request(|reply| Command::UpdateField { update, reply }).await
    }

    /// Fill empty title, content and excerpt from an import.
    pub async fn merge_import(
        &self,
        result: ImportResult,
    ) -> Result<Vec<DraftField>, SessionError> {
        self.request(|reply| Command::MergeImport { result: Box::new(result), reply }).await
    }

    /// Replace the draft with a post from the backend.
    pub async fn load_post(&self, id: Uuid) -> Result<(), SessionError> {
        self.request(|reply| Command::Load { id, reply }).await?
    }

    pub async fn save_draft(&self) -> Result<SaveStatus, SessionError> {
        self.save(SaveKind::Draft).await
    }

    pub async fn publish(&self) -> Result<SaveStatus, SessionError> {
        self.save(SaveKind::Publish).await
    }

    pub async fn unpublish(&self) -> Result<SaveStatus, SessionError> {
        self.save(SaveKind::Unpublish).await
    }

    async fn save(&self, kind: SaveKind) -> Result<SaveStatus, SessionError> {
        self.request(|reply| Command::Save { kind, reply }).await?
    }

    /// Discard local edits.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Slug from the current title; the slug follows the title again.
    pub async fn generate_slug(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::GenerateSlug { reply }).await
    }

    pub async fn validate(&self) -> Result<(), SessionError> {
        Ok(self.request(|reply| Command::Validate { reply }).await??)
    }

    /// Current state, after every timer due by now has run.
    pub async fn snapshot(&self) -> Result<DraftSessionState, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Last published state, without a round trip.
    pub fn current(&self) -> DraftSessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DraftSessionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stop the task. Timers are cancelled and an in-flight save is
    /// abandoned without being applied.
    pub async fn shutdown(&self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
    }
}

// ── Actor ──────────────────────────────────────────────────────────

type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send>>;

enum StepResult {
    Persisted { generation: u64, outcome: PersistOutcome },
    Reloaded { generation: u64, result: Result<PostRecord, PersistenceError> },
}

struct InFlight {
    step: StepFuture,
    /// None for autosaves.
    reply: Option<Reply<Result<SaveStatus, SessionError>>>,
}

struct SessionActor<S: PostStore> {
    session: DraftSession,
    store: Arc<S>,
    in_flight: Option<InFlight>,
    state_tx: watch::Sender<DraftSessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
}

/// The session clock. Follows tokio time so paused-clock tests work.
fn clock() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn next_step(in_flight: &mut Option<InFlight>) -> StepResult {
    match in_flight {
        Some(in_flight) => in_flight.step.as_mut().await,
        None => std::future::pending().await,
    }
}

impl<S: PostStore> SessionActor<S> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!("editing session started");
        let shutdown_reply = loop {
            self.tick();
            self.publish();

            let deadline = self.session.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => {
                        self.tick();
                        self.handle(command).await;
                    }
                    None => break None,
                },
                result = next_step(&mut self.in_flight) => self.step_finished(result),
                _ = sleep_until(deadline) => {}
            }
        };

        self.session.teardown();
        if let Some(InFlight { reply: Some(reply), .. }) = self.in_flight.take() {
            let _ = reply.send(Err(SessionError::Closed));
        }
        self.publish();
        debug!("editing session stopped");

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot();
        self.state_tx.send_if_modified(|state| {
            if *state == snapshot {
                return false;
            }
            *state = snapshot;
            true
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn tick(&mut self) {
        let tick = self.session.tick(clock());
        if !tick.derived.is_empty() {
            self.emit(SessionEvent::Derived { fields: tick.derived });
        }
        if let Some(job) = tick.autosave {
            info!(post_id = ?job.post_id, "autosave started");
            self.emit(SessionEvent::AutosaveStarted);
            self.start(job, None);
        }
    }

    fn start(&mut self, job: SaveJob, reply: Option<Reply<Result<SaveStatus, SessionError>>>) {
        let store = Arc::clone(&self.store);
        let generation = job.generation;
        let step: StepFuture = Box::pin(async move {
            let outcome = job.persist(store.as_ref()).await;
            StepResult::Persisted { generation, outcome }
        });
        self.in_flight = Some(InFlight { step, reply });
    }

    fn finish(&mut self, result: Result<SaveStatus, SessionError>) {
        if let Some(InFlight { reply: Some(reply), .. }) = self.in_flight.take() {
            let _ = reply.send(result);
        }
    }

    fn step_finished(&mut self, result: StepResult) {
        let now = clock();
        let (generation, step) = match result {
            StepResult::Persisted { generation, outcome } => {
                (generation, self.session.persist_finished(generation, outcome, now))
            }
            StepResult::Reloaded { generation, result } => {
                (generation, self.session.reload_finished(generation, result, now))
            }
        };

        match step {
            SaveStep::Reload(id) => {
                let store = Arc::clone(&self.store);
                let step: StepFuture = Box::pin(async move {
                    let result = reload(store.as_ref(), id).await;
                    StepResult::Reloaded { generation, result }
                });
                match self.in_flight.as_mut() {
                    Some(in_flight) => in_flight.step = step,
                    None => self.in_flight = Some(InFlight { step, reply: None }),
                }
            }
            SaveStep::Saved { post_id, kind, trigger, saved_at } => {
                self.finish(Ok(SaveStatus::Completed { post_id, saved_at }));
                self.emit(SessionEvent::Saved { post_id, kind, trigger, saved_at });
            }
            SaveStep::Unpublished { post_id, saved_at } => {
                self.finish(Ok(SaveStatus::Completed { post_id, saved_at }));
                self.emit(SessionEvent::Unpublished { post_id });
            }
            SaveStep::Failed { error, notify } => {
                if notify {
                    self.emit(SessionEvent::SaveFailed { message: error.to_string() });
                }
                self.finish(Err(SessionError::Persistence(error)));
            }
            SaveStep::Stale => self.finish(Err(SessionError::Superseded)),
        }
    }

    async fn handle(&mut self, command: Command) {
        let now = clock();
        match command {
            Command::UpdateField { update, reply } => {
                let _ = reply.send(self.session.update_field(update, now));
            }
            Command::MergeImport { result, reply } => {
                let _ = reply.send(self.session.merge_import(&result, now));
            }
            Command::Load { id, reply } => {
                if let Some(InFlight { reply: Some(pending), .. }) = self.in_flight.take() {
                    let _ = pending.send(Err(SessionError::Superseded));
                }
                self.session.load_started();
                self.publish();

                let result = self.store.get_post_by_id(id).await;
                let loaded = self.session.load_finished(result, clock());
                if let Ok(post_id) = loaded {
                    self.emit(SessionEvent::Loaded { post_id });
                }
                let _ = reply.send(loaded.map(|_| ()).map_err(SessionError::from));
            }
            Command::Save { kind, reply } => {
                match self.session.begin_save(kind, SaveTrigger::Explicit, now) {
                    Ok(Some(job)) => self.start(job, Some(reply)),
                    Ok(None) => {
                        let _ = reply.send(Ok(SaveStatus::Suppressed));
                    }
                    Err(error) => {
                        if let SessionError::Validation(errors) = &error {
                            self.emit(SessionEvent::ValidationFailed { errors: errors.clone() });
                        }
                        let _ = reply.send(Err(error));
                    }
                }
            }
            Command::Reset { reply } => {
                self.session.reset(now);
                let _ = reply.send(());
            }
            Command::GenerateSlug { reply } => {
                let _ = reply.send(self.session.generate_slug(now));
            }
            Command::Validate { reply } => {
                let _ = reply.send(self.session.validate());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Shutdown { reply } => {
                // Intercepted by `run` before dispatch.
                let _ = reply.send(());
            }
        }
    }
}
