// Save and publish workflow: validate → persist → reload.
//
// Validation runs synchronously inside the session. Persisting and reloading
// are the only remote steps; they run as futures owned by the session task
// and report back with the job's generation so stale results can be dropped.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use folio_common::types::{DraftFields, PostRecord, PostStatus};

use crate::draft::{DraftField, ValidationErrors};
use crate::persistence::{PersistenceError, PostStore};

/// Where the current (or last) save is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePhase {
    #[default]
    Idle,
    Validating,
    Saving,
    Reloading,
    Done,
    Failed,
}

impl SavePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Saving => "saving",
            Self::Reloading => "reloading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Draft,
    Publish,
    Unpublish,
}

/// What started a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTrigger {
    Explicit,
    Autosave,
}

// ── Validation ─────────────────────────────────────────────────────

/// Check a draft before it is persisted. Collects every violation.
pub fn validate(fields: &DraftFields) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if fields.title.trim().is_empty() {
        errors.insert(DraftField::Title, "title is required");
    }
    if fields.content.trim().is_empty() {
        errors.insert(DraftField::Content, "content is required");
    }
    if fields.status == PostStatus::Scheduled && fields.scheduled_for.is_none() {
        errors.insert(DraftField::ScheduledFor, "scheduled posts need a publish date");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ── Jobs ───────────────────────────────────────────────────────────

/// A validated save ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveJob {
    pub kind: SaveKind,
    pub trigger: SaveTrigger,
    /// Existing post to update, or None to create.
    pub post_id: Option<Uuid>,
    /// Fields as they were when the save was issued.
    pub fields: DraftFields,
    pub generation: u64,
}

/// Result of the persist step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted(Uuid),
    /// `post_id` is set when a create succeeded before a later step failed.
    Failed { post_id: Option<Uuid>, error: PersistenceError },
}

impl SaveJob {
    /// Create or update the post, then publish or unpublish as the kind asks.
    pub async fn persist<S: PostStore>(&self, store: &S) -> PersistOutcome {
        match self.kind {
            SaveKind::Unpublish => {
                let Some(id) = self.post_id else {
                    return PersistOutcome::Failed {
                        post_id: None,
                        error: PersistenceError::Rejected("post has not been saved yet".into()),
                    };
                };
                match store.unpublish_post(id).await {
                    Ok(()) => PersistOutcome::Persisted(id),
                    Err(error) => PersistOutcome::Failed { post_id: Some(id), error },
                }
            }
            SaveKind::Draft | SaveKind::Publish => {
                let written = match self.post_id {
                    Some(id) => store.update_post(id, &self.fields).await,
                    None => store.create_post(&self.fields).await,
                };
                let record = match written {
                    Ok(record) => record,
                    Err(error) => return PersistOutcome::Failed { post_id: self.post_id, error },
                };
                debug!(post_id = %record.id, kind = ?self.kind, "post written");

                if self.publishes() {
                    if let Err(error) = store.publish_post(record.id).await {
                        return PersistOutcome::Failed { post_id: Some(record.id), error };
                    }
                }
                PersistOutcome::Persisted(record.id)
            }
        }
    }

    /// True when the job ends with a publish call. Scheduled posts are
    /// published by the backend at their date instead.
    pub fn publishes(&self) -> bool {
        self.kind == SaveKind::Publish && self.fields.status != PostStatus::Scheduled
    }
}

/// Fetch the canonical post after a write.
pub async fn reload<S: PostStore>(store: &S, id: Uuid) -> Result<PostRecord, PersistenceError> {
    store.get_post_by_id(id).await
}
