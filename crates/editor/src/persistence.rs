// Persistence backend for posts.
//
// The session talks to the backend only through `PostStore`. `MemoryPostStore`
// is an in-process backend with the server-side behavior the editor relies
// on: slug canonicalization and disambiguation, excerpt fallback, reading
// time and timestamps. It also supports scripted failures and latency for
// tests and offline use.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use folio_common::extract::{extract_excerpt, plain_text, reading_time_minutes, DEFAULT_EXCERPT_LEN};
use folio_common::format::DetectedFormat;
use folio_common::slug::{disambiguate, slugify};
use folio_common::types::{DraftFields, PostRecord, PostStatus};

// ── Store trait ────────────────────────────────────────────────────

/// Errors reported by a persistence backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("post {0} not found")]
    NotFound(Uuid),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Remote post API used by the editing session.
///
/// All methods return `Send` futures so the session task can run on a
/// multi-threaded tokio runtime.
pub trait PostStore: Send + Sync + 'static {
    fn get_post_by_id(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<PostRecord, PersistenceError>> + Send;

    /// Create a post; the backend assigns the id.
    fn create_post(
        &self,
        input: &DraftFields,
    ) -> impl std::future::Future<Output = Result<PostRecord, PersistenceError>> + Send;

    fn update_post(
        &self,
        id: Uuid,
        input: &DraftFields,
    ) -> impl std::future::Future<Output = Result<PostRecord, PersistenceError>> + Send;

    fn publish_post(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), PersistenceError>> + Send;

    fn unpublish_post(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), PersistenceError>> + Send;
}

// ── In-memory backend ──────────────────────────────────────────────

/// Operations of `PostStore`, for call counts and failure scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    Publish,
    Unpublish,
}

impl StoreOp {
    fn index(self) -> usize {
        match self {
            Self::Get => 0,
            Self::Create => 1,
            Self::Update => 2,
            Self::Publish => 3,
            Self::Unpublish => 4,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    posts: Mutex<BTreeMap<Uuid, PostRecord>>,
    failures: Mutex<VecDeque<(StoreOp, PersistenceError)>>,
    calls: [AtomicUsize; 5],
}

/// In-process `PostStore`. Clones share the same posts.
#[derive(Debug, Clone, Default)]
pub struct MemoryPostStore {
    inner: Arc<MemoryInner>,
    latency: Duration,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the store.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next call of `op` fail with `error`.
    pub async fn fail_next(&self, op: StoreOp, error: PersistenceError) {
        self.inner.failures.lock().await.push_back((op, error));
    }

    /// Number of calls of `op` so far, failed ones included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Insert a post directly, bypassing call counts and failures.
    pub async fn seed(&self, input: &DraftFields) -> PostRecord {
        let mut posts = self.inner.posts.lock().await;
        let record = insert_new(&mut posts, input);
        debug!(post_id = %record.id, slug = %record.fields.slug, "seeded post");
        record
    }

    pub async fn post(&self, id: Uuid) -> Option<PostRecord> {
        self.inner.posts.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.posts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.posts.lock().await.is_empty()
    }

    /// Count the call, wait out the latency and consume a scripted failure.
    async fn enter(&self, op: StoreOp) -> Result<(), PersistenceError> {
        self.inner.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut failures = self.inner.failures.lock().await;
        match failures.iter().position(|(failing, _)| *failing == op) {
            Some(index) => match failures.remove(index) {
                Some((_, error)) => Err(error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl PostStore for MemoryPostStore {
    async fn get_post_by_id(&self, id: Uuid) -> Result<PostRecord, PersistenceError> {
        self.enter(StoreOp::Get).await?;
        self.inner.posts.lock().await.get(&id).cloned().ok_or(PersistenceError::NotFound(id))
    }

    async fn create_post(&self, input: &DraftFields) -> Result<PostRecord, PersistenceError> {
        self.enter(StoreOp::Create).await?;
        check_input(input)?;

        let mut posts = self.inner.posts.lock().await;
        let record = insert_new(&mut posts, input);
        debug!(post_id = %record.id, slug = %record.fields.slug, "post created");
        Ok(record)
    }

    async fn update_post(
        &self,
        id: Uuid,
        input: &DraftFields,
    ) -> Result<PostRecord, PersistenceError> {
        self.enter(StoreOp::Update).await?;
        check_input(input)?;

        let mut posts = self.inner.posts.lock().await;
        let fields = canonicalize(&posts, id, input);
        let record = posts.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;

        let now = Utc::now();
        record.reading_time_minutes = Some(body_reading_time(&fields));
        if fields.status == PostStatus::Published && record.published_at.is_none() {
            record.published_at = Some(now);
        }
        record.fields = fields;
        record.updated_at = now;
        debug!(post_id = %id, slug = %record.fields.slug, "post updated");
        Ok(record.clone())
    }

    async fn publish_post(&self, id: Uuid) -> Result<(), PersistenceError> {
        self.enter(StoreOp::Publish).await?;

        let mut posts = self.inner.posts.lock().await;
        let record = posts.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;
        let now = Utc::now();
        record.fields.status = PostStatus::Published;
        record.published_at.get_or_insert(now);
        record.updated_at = now;
        debug!(post_id = %id, "post published");
        Ok(())
    }

    async fn unpublish_post(&self, id: Uuid) -> Result<(), PersistenceError> {
        self.enter(StoreOp::Unpublish).await?;

        let mut posts = self.inner.posts.lock().await;
        let record = posts.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;
        record.fields.status = PostStatus::Draft;
        record.published_at = None;
        record.updated_at = Utc::now();
        debug!(post_id = %id, "post unpublished");
        Ok(())
    }
}

fn check_input(input: &DraftFields) -> Result<(), PersistenceError> {
    if input.title.trim().is_empty() {
        return Err(PersistenceError::Rejected("title is required".into()));
    }
    Ok(())
}

fn insert_new(posts: &mut BTreeMap<Uuid, PostRecord>, input: &DraftFields) -> PostRecord {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let fields = canonicalize(posts, id, input);
    let record = PostRecord {
        id,
        reading_time_minutes: Some(body_reading_time(&fields)),
        published_at: (fields.status == PostStatus::Published).then_some(now),
        fields,
        created_at: now,
        updated_at: now,
    };
    posts.insert(id, record.clone());
    record
}

/// Server-side normalization of a submitted post.
fn canonicalize(posts: &BTreeMap<Uuid, PostRecord>, id: Uuid, input: &DraftFields) -> DraftFields {
    let mut fields = input.clone();

    let requested = if fields.slug.trim().is_empty() { &fields.title } else { &fields.slug };
    let mut base = slugify(requested);
    if base.is_empty() {
        base = "post".into();
    }
    fields.slug = unique_slug(posts, id, &base);

    if fields.excerpt.trim().is_empty() {
        fields.excerpt =
            extract_excerpt(&fields.content, DetectedFormat::Markdown, DEFAULT_EXCERPT_LEN)
                .unwrap_or_default();
    }

    fields
}

/// First of `base`, `base-2`, `base-3`, … not used by another post.
fn unique_slug(posts: &BTreeMap<Uuid, PostRecord>, id: Uuid, base: &str) -> String {
    let mut occurrence = 1;
    loop {
        let candidate = disambiguate(base, occurrence);
        let taken = posts.values().any(|post| post.id != id && post.fields.slug == candidate);
        if !taken {
            return candidate;
        }
        occurrence += 1;
    }
}

fn body_reading_time(fields: &DraftFields) -> u32 {
    reading_time_minutes(&plain_text(&fields.content, DetectedFormat::Markdown))
}
