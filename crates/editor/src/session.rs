// Editing session state machine.
//
// `DraftSession` ties the draft store, auto-derivation, the autosave timer and
// the save workflow together. It never awaits: every method takes the current
// instant and returns what the caller must do next (run a save job, reload a
// post, emit a notice). The async runtime in `runtime.rs` drives it.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use folio_common::import::ImportResult;
use folio_common::slug::slugify;
use folio_common::types::{DraftFields, PostRecord, PostStatus};

use crate::autosave::AutosaveScheduler;
use crate::config::EditorConfig;
use crate::derive::AutoDerivation;
use crate::draft::{DraftField, DraftSessionState, DraftStore, FieldUpdate, ValidationErrors};
use crate::error::SessionError;
use crate::persistence::PersistenceError;
use crate::workflow::{validate, PersistOutcome, SaveJob, SaveKind, SavePhase, SaveTrigger};

/// A save between `begin_save` and its completion.
#[derive(Debug, Clone)]
struct InFlightSave {
    generation: u64,
    kind: SaveKind,
    trigger: SaveTrigger,
    submitted: DraftFields,
}

/// What the caller must do after a save step finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStep {
    /// The post was written; fetch it with this id.
    Reload(Uuid),
    Saved { post_id: Uuid, kind: SaveKind, trigger: SaveTrigger, saved_at: DateTime<Utc> },
    Unpublished { post_id: Uuid, saved_at: DateTime<Utc> },
    /// `notify` is false when the same message was already surfaced.
    Failed { error: PersistenceError, notify: bool },
    /// The session moved on since the job started; the result was dropped.
    Stale,
}

/// Work produced by the timers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tick {
    /// Fields rewritten by auto-derivation.
    pub derived: Vec<DraftField>,
    /// Autosave job to run.
    pub autosave: Option<SaveJob>,
}

#[derive(Debug)]
pub struct DraftSession {
    store: DraftStore,
    derivation: AutoDerivation,
    autosave: AutosaveScheduler,
    phase: SavePhase,
    in_flight: Option<InFlightSave>,
    /// Bumped by every save, load and teardown; completions carrying an
    /// older value are stale.
    generation: u64,
    last_error: Option<String>,
    /// Last failure message shown to the user.
    surfaced_error: Option<String>,
}

impl DraftSession {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            store: DraftStore::new(),
            derivation: AutoDerivation::new(&config.derive),
            autosave: AutosaveScheduler::new(&config.autosave),
            phase: SavePhase::Idle,
            in_flight: None,
            generation: 0,
            last_error: None,
            surfaced_error: None,
        }
    }

    pub fn store(&self) -> &DraftStore {
        &self.store
    }

    pub fn phase(&self) -> SavePhase {
        self.phase
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn snapshot(&self) -> DraftSessionState {
        self.store.snapshot(self.phase, self.is_saving(), self.last_error.clone())
    }

    // ── Editing ────────────────────────────────────────────────────

    /// Apply a user edit and feed title/content changes to derivation.
    pub fn update_field(&mut self, update: FieldUpdate, now: Instant) -> bool {
        let field = update.field();
        let changed = self.store.update_field(update);
        if changed {
            match field {
                DraftField::Title => self.derivation.title_changed(&self.store.fields().title, now),
                DraftField::Content => {
                    self.derivation.content_changed(&self.store.fields().content, now)
                }
                _ => {}
            }
            self.autosave.note_revision(self.store.revision(), now);
        }
        self.observe(now);
        changed
    }

    /// Slug from the current title. Clears the slug override so the slug
    /// follows the title again.
    pub fn generate_slug(&mut self, now: Instant) -> String {
        let slug = slugify(&self.store.fields().title);
        if self.store.apply_derived(FieldUpdate::Slug(slug.clone())) {
            self.autosave.note_revision(self.store.revision(), now);
        }
        self.store.clear_override(DraftField::Slug);
        self.observe(now);
        slug
    }

    /// Fill empty fields from an imported file.
    pub fn merge_import(&mut self, result: &ImportResult, now: Instant) -> Vec<DraftField> {
        let filled = self.store.merge_import(result);
        for field in &filled {
            match field {
                DraftField::Title => self.derivation.title_changed(&self.store.fields().title, now),
                DraftField::Content => {
                    self.derivation.content_changed(&self.store.fields().content, now)
                }
                _ => {}
            }
        }
        if !filled.is_empty() {
            info!(file = %result.metadata.file_name, ?filled, "import merged into draft");
            self.autosave.note_revision(self.store.revision(), now);
        }
        self.observe(now);
        filled
    }

    /// Validate the current fields and record per-field errors.
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        match validate(self.store.fields()) {
            Ok(()) => {
                self.store.clear_errors();
                Ok(())
            }
            Err(errors) => {
                self.store.set_errors(errors.clone());
                Err(errors)
            }
        }
    }

    /// Discard local edits.
    pub fn reset(&mut self, now: Instant) {
        self.store.reset();
        let fields = self.store.fields();
        self.derivation.seed(&fields.title, &fields.content);
        self.autosave.rebase(self.store.revision());
        self.phase = SavePhase::Idle;
        self.last_error = None;
        self.observe(now);
    }

    // ── Loading ────────────────────────────────────────────────────

    /// A load replaces the draft; anything in flight becomes stale.
    pub fn load_started(&mut self) {
        self.generation += 1;
        if self.in_flight.take().is_some() {
            debug!("dropping in-flight save for load");
        }
        self.derivation.cancel();
        self.autosave.cancel();
        self.store.set_loading(true);
        self.phase = SavePhase::Idle;
    }

    pub fn load_finished(
        &mut self,
        result: Result<PostRecord, PersistenceError>,
        now: Instant,
    ) -> Result<Uuid, PersistenceError> {
        match result {
            Ok(record) => {
                let id = record.id;
                self.store.apply_loaded(record);
                let fields = self.store.fields();
                self.derivation.seed(&fields.title, &fields.content);
                self.autosave.rebase(self.store.revision());
                self.last_error = None;
                self.surfaced_error = None;
                self.observe(now);
                info!(post_id = %id, "post loaded");
                Ok(id)
            }
            Err(error) => {
                self.store.set_loading(false);
                warn!(error = %error, "post load failed");
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    // ── Saving ─────────────────────────────────────────────────────

    /// Start a save. Returns `Ok(None)` when a save is already in flight.
    ///
    /// Explicit saves record validation errors on the draft; autosaves of
    /// an invalid draft are skipped quietly.
    pub fn begin_save(
        &mut self,
        kind: SaveKind,
        trigger: SaveTrigger,
        now: Instant,
    ) -> Result<Option<SaveJob>, SessionError> {
        if self.in_flight.is_some() {
            debug!(?kind, ?trigger, "save already in flight, skipping");
            return Ok(None);
        }

        if kind == SaveKind::Unpublish {
            if self.store.post_id().is_none() {
                return Err(SessionError::NoPostId);
            }
        } else {
            let mut fields = self.store.fields().clone();
            if kind == SaveKind::Publish && fields.status != PostStatus::Scheduled {
                fields.status = PostStatus::Published;
            }

            if trigger == SaveTrigger::Explicit {
                self.phase = SavePhase::Validating;
            }
            if let Err(errors) = validate(&fields) {
                if trigger == SaveTrigger::Explicit {
                    self.store.set_errors(errors.clone());
                    self.phase = SavePhase::Failed;
                } else {
                    debug!(%errors, "autosave skipped for invalid draft");
                }
                return Err(SessionError::Validation(errors));
            }

            if fields.status != self.store.fields().status {
                self.store.update_field(FieldUpdate::Status(fields.status));
                self.autosave.note_revision(self.store.revision(), now);
            }
            self.store.clear_errors();
        }

        self.generation += 1;
        let submitted = self.store.fields().clone();
        self.in_flight = Some(InFlightSave {
            generation: self.generation,
            kind,
            trigger,
            submitted: submitted.clone(),
        });
        self.phase = SavePhase::Saving;
        self.observe(now);
        debug!(?kind, ?trigger, generation = self.generation, "save started");

        Ok(Some(SaveJob {
            kind,
            trigger,
            post_id: self.store.post_id(),
            fields: submitted,
            generation: self.generation,
        }))
    }

    /// Apply the result of `SaveJob::persist`.
    pub fn persist_finished(
        &mut self,
        generation: u64,
        outcome: PersistOutcome,
        now: Instant,
    ) -> SaveStep {
        let Some(flight) = self.current(generation) else {
            debug!(generation, "dropping stale persist result");
            return SaveStep::Stale;
        };
        let kind = flight.kind;

        match outcome {
            PersistOutcome::Persisted(id) => {
                self.store.set_post_id(id);
                if kind == SaveKind::Unpublish {
                    self.in_flight = None;
                    let saved_at = Utc::now();
                    self.store.mark_unpublished(saved_at);
                    self.autosave.note_revision(self.store.revision(), now);
                    self.succeeded(now);
                    info!(post_id = %id, "post unpublished");
                    return SaveStep::Unpublished { post_id: id, saved_at };
                }
                self.phase = SavePhase::Reloading;
                SaveStep::Reload(id)
            }
            PersistOutcome::Failed { post_id, error } => {
                if let Some(id) = post_id {
                    self.store.set_post_id(id);
                }
                self.failed(error, now)
            }
        }
    }

    /// Apply the canonical post fetched after a write.
    pub fn reload_finished(
        &mut self,
        generation: u64,
        result: Result<PostRecord, PersistenceError>,
        now: Instant,
    ) -> SaveStep {
        if self.current(generation).is_none() {
            debug!(generation, "dropping stale reload result");
            return SaveStep::Stale;
        }

        let record = match result {
            Ok(record) => record,
            Err(error) => return self.failed(error, now),
        };
        let Some(flight) = self.in_flight.take() else {
            return SaveStep::Stale;
        };

        let post_id = record.id;
        let saved_at = Utc::now();
        let title = record.fields.title.clone();
        let content = record.fields.content.clone();
        let edited = self.store.apply_saved(record, &flight.submitted, saved_at);
        self.derivation.rebase(&title, &content);
        self.autosave.note_revision(self.store.revision(), now);
        self.succeeded(now);

        info!(
            post_id = %post_id,
            kind = ?flight.kind,
            trigger = ?flight.trigger,
            kept_local = edited.len(),
            "post saved"
        );
        SaveStep::Saved { post_id, kind: flight.kind, trigger: flight.trigger, saved_at }
    }

    fn current(&self, generation: u64) -> Option<&InFlightSave> {
        self.in_flight.as_ref().filter(|flight| flight.generation == generation)
    }

    fn succeeded(&mut self, now: Instant) {
        self.phase = SavePhase::Done;
        self.last_error = None;
        self.surfaced_error = None;
        self.observe(now);
    }

    fn failed(&mut self, error: PersistenceError, now: Instant) -> SaveStep {
        self.in_flight = None;
        self.phase = SavePhase::Failed;

        let message = error.to_string();
        let notify = self.surfaced_error.as_deref() != Some(message.as_str());
        warn!(error = %error, notify, "save failed");
        self.surfaced_error = Some(message.clone());
        self.last_error = Some(message);
        self.observe(now);

        SaveStep::Failed { error, notify }
    }

    // ── Timers ─────────────────────────────────────────────────────

    /// Run derivation and autosave for everything due by `now`.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let mut tick = Tick::default();

        for update in self.derivation.poll_at(now, self.store.overrides()) {
            let field = update.field();
            if self.store.apply_derived(update) {
                tick.derived.push(field);
            }
        }
        if !tick.derived.is_empty() {
            debug!(fields = ?tick.derived, "derived fields updated");
            self.autosave.note_revision(self.store.revision(), now);
        }

        self.observe(now);
        if self.autosave.poll_at(now) {
            debug!("autosave due");
            // Suppressed or invalid autosaves simply wait for the next edit.
            if let Ok(Some(job)) = self.begin_save(SaveKind::Draft, SaveTrigger::Autosave, now) {
                tick.autosave = Some(job);
            }
        }

        tick
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.derivation.next_deadline(), self.autosave.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Stop all timers and forget any in-flight save.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.derivation.cancel();
        self.autosave.cancel();
    }

    fn observe(&mut self, now: Instant) {
        self.autosave.observe(self.store.is_dirty(), self.in_flight.is_some(), now);
    }
}
