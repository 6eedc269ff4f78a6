// Draft state store: the editable fields of the open post, the last
// persisted baseline, edit override flags and per-field validation errors.
//
// All mutation goes through `DraftStore`. User edits use `update_field`;
// derived values (slug from title, excerpt from content) use `apply_derived`
// so they never set an override flag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use folio_common::import::ImportResult;
use folio_common::types::{DraftFields, PostRecord, PostStatus, SeoFields};

use crate::workflow::SavePhase;

// ── Fields ─────────────────────────────────────────────────────────

/// Names of the editable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    Title,
    Slug,
    Content,
    Excerpt,
    Status,
    FeaturedImage,
    Categories,
    Tags,
    ScheduledFor,
    AllowComments,
    Featured,
    Seo,
}

impl DraftField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Slug => "slug",
            Self::Content => "content",
            Self::Excerpt => "excerpt",
            Self::Status => "status",
            Self::FeaturedImage => "featured_image",
            Self::Categories => "categories",
            Self::Tags => "tags",
            Self::ScheduledFor => "scheduled_for",
            Self::AllowComments => "allow_comments",
            Self::Featured => "featured",
            Self::Seo => "seo",
        }
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new value for exactly one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate {
    Title(String),
    Slug(String),
    Content(String),
    Excerpt(String),
    Status(PostStatus),
    FeaturedImage(Option<String>),
    Categories(BTreeSet<Uuid>),
    Tags(BTreeSet<Uuid>),
    ScheduledFor(Option<DateTime<Utc>>),
    AllowComments(bool),
    Featured(bool),
    Seo(SeoFields),
}

impl FieldUpdate {
    pub fn field(&self) -> DraftField {
        match self {
            Self::Title(_) => DraftField::Title,
            Self::Slug(_) => DraftField::Slug,
            Self::Content(_) => DraftField::Content,
            Self::Excerpt(_) => DraftField::Excerpt,
            Self::Status(_) => DraftField::Status,
            Self::FeaturedImage(_) => DraftField::FeaturedImage,
            Self::Categories(_) => DraftField::Categories,
            Self::Tags(_) => DraftField::Tags,
            Self::ScheduledFor(_) => DraftField::ScheduledFor,
            Self::AllowComments(_) => DraftField::AllowComments,
            Self::Featured(_) => DraftField::Featured,
            Self::Seo(_) => DraftField::Seo,
        }
    }

    /// Write the value into `fields`. Returns true if the field changed.
    fn apply(self, fields: &mut DraftFields) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        }

        match self {
            Self::Title(v) => set(&mut fields.title, v),
            Self::Slug(v) => set(&mut fields.slug, v),
            Self::Content(v) => set(&mut fields.content, v),
            Self::Excerpt(v) => set(&mut fields.excerpt, v),
            Self::Status(v) => set(&mut fields.status, v),
            Self::FeaturedImage(v) => set(&mut fields.featured_image, v),
            Self::Categories(v) => set(&mut fields.category_ids, v),
            Self::Tags(v) => set(&mut fields.tag_ids, v),
            Self::ScheduledFor(v) => set(&mut fields.scheduled_for, v),
            Self::AllowComments(v) => set(&mut fields.allow_comments, v),
            Self::Featured(v) => set(&mut fields.featured, v),
            Self::Seo(v) => set(&mut fields.seo, v),
        }
    }
}

/// Fields whose value differs between `a` and `b`.
pub fn changed_fields(a: &DraftFields, b: &DraftFields) -> Vec<DraftField> {
    let mut changed = Vec::new();
    macro_rules! compare {
        ($($name:ident => $field:expr),* $(,)?) => {
            $( if a.$name != b.$name { changed.push($field); } )*
        };
    }
    compare!(
        title => DraftField::Title,
        slug => DraftField::Slug,
        content => DraftField::Content,
        excerpt => DraftField::Excerpt,
        status => DraftField::Status,
        featured_image => DraftField::FeaturedImage,
        category_ids => DraftField::Categories,
        tag_ids => DraftField::Tags,
        scheduled_for => DraftField::ScheduledFor,
        allow_comments => DraftField::AllowComments,
        featured => DraftField::Featured,
        seo => DraftField::Seo,
    );
    changed
}

/// Copy one field's value from `source` into `target`.
fn copy_field(target: &mut DraftFields, source: &DraftFields, field: DraftField) {
    match field {
        DraftField::Title => target.title.clone_from(&source.title),
        DraftField::Slug => target.slug.clone_from(&source.slug),
        DraftField::Content => target.content.clone_from(&source.content),
        DraftField::Excerpt => target.excerpt.clone_from(&source.excerpt),
        DraftField::Status => target.status = source.status,
        DraftField::FeaturedImage => target.featured_image.clone_from(&source.featured_image),
        DraftField::Categories => target.category_ids.clone_from(&source.category_ids),
        DraftField::Tags => target.tag_ids.clone_from(&source.tag_ids),
        DraftField::ScheduledFor => target.scheduled_for = source.scheduled_for,
        DraftField::AllowComments => target.allow_comments = source.allow_comments,
        DraftField::Featured => target.featured = source.featured,
        DraftField::Seo => target.seo.clone_from(&source.seo),
    }
}

// ── Override flags ─────────────────────────────────────────────────

/// Set when the user has typed a slug or excerpt by hand. While set, the
/// matching auto-derivation is suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOverrideFlags {
    pub slug_user_edited: bool,
    pub excerpt_user_edited: bool,
}

impl EditOverrideFlags {
    pub fn is_set(&self, field: DraftField) -> bool {
        match field {
            DraftField::Slug => self.slug_user_edited,
            DraftField::Excerpt => self.excerpt_user_edited,
            _ => false,
        }
    }

    fn set(&mut self, field: DraftField, value: bool) {
        match field {
            DraftField::Slug => self.slug_user_edited = value,
            DraftField::Excerpt => self.excerpt_user_edited = value,
            _ => {}
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ── Validation errors ──────────────────────────────────────────────

/// Validation messages keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(BTreeMap<DraftField, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: DraftField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn remove(&mut self, field: DraftField) -> Option<String> {
        self.0.remove(&field)
    }

    pub fn get(&self, field: DraftField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: DraftField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DraftField, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        for (index, (field, message)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ── Session snapshot ───────────────────────────────────────────────

/// Read-only view of the editing session published to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSessionState {
    pub post_id: Option<Uuid>,
    pub fields: DraftFields,
    pub is_dirty: bool,
    pub is_saving: bool,
    pub is_loading: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub field_errors: ValidationErrors,
    pub overrides: EditOverrideFlags,
    pub phase: SavePhase,
    pub last_error: Option<String>,
    /// Server-computed reading time of the last persisted version.
    pub reading_time_minutes: Option<u32>,
}

// ── Store ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DraftStore {
    post_id: Option<Uuid>,
    fields: DraftFields,
    /// Last loaded or saved version; `is_dirty` compares against it.
    baseline: DraftFields,
    overrides: EditOverrideFlags,
    field_errors: ValidationErrors,
    is_dirty: bool,
    is_loading: bool,
    last_saved_at: Option<DateTime<Utc>>,
    reading_time_minutes: Option<u32>,
    /// Bumped on every change to `fields`.
    revision: u64,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &DraftFields {
        &self.fields
    }

    pub fn baseline(&self) -> &DraftFields {
        &self.baseline
    }

    pub fn post_id(&self) -> Option<Uuid> {
        self.post_id
    }

    pub fn overrides(&self) -> EditOverrideFlags {
        self.overrides
    }

    pub fn field_errors(&self) -> &ValidationErrors {
        &self.field_errors
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply a user edit. Slug and excerpt edits raise their override flag
    /// before the value is written. Returns true if the value changed.
    pub fn update_field(&mut self, update: FieldUpdate) -> bool {
        let field = update.field();
        self.overrides.set(field, true);
        self.field_errors.remove(field);
        self.write(update)
    }

    /// Apply a derived value. Leaves override flags untouched.
    pub fn apply_derived(&mut self, update: FieldUpdate) -> bool {
        self.write(update)
    }

    fn write(&mut self, update: FieldUpdate) -> bool {
        let changed = update.apply(&mut self.fields);
        if changed {
            self.revision += 1;
            self.recompute_dirty();
        }
        changed
    }

    fn recompute_dirty(&mut self) {
        self.is_dirty = self.fields != self.baseline;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_errors(&mut self, errors: ValidationErrors) {
        self.field_errors = errors;
    }

    pub fn clear_errors(&mut self) {
        self.field_errors.clear();
    }

    /// Record the id assigned by the backend on create.
    pub fn set_post_id(&mut self, id: Uuid) {
        self.post_id = Some(id);
    }

    /// Allow auto-derivation of `field` again.
    pub fn clear_override(&mut self, field: DraftField) {
        self.overrides.set(field, false);
    }

    /// Replace the whole draft with a freshly loaded post.
    pub fn apply_loaded(&mut self, record: PostRecord) {
        self.post_id = Some(record.id);
        self.baseline = record.fields.clone();
        self.fields = record.fields;
        self.reading_time_minutes = record.reading_time_minutes;
        self.overrides.clear();
        self.field_errors.clear();
        self.is_loading = false;
        self.is_dirty = false;
        self.revision += 1;
    }

    /// Adopt the canonical post returned after a save.
    ///
    /// `submitted` is what the save sent. Fields still equal to it take the
    /// canonical value; fields edited while the save was in flight keep the
    /// local value and their override flag. Returns the fields edited in
    /// flight.
    pub fn apply_saved(
        &mut self,
        record: PostRecord,
        submitted: &DraftFields,
        saved_at: DateTime<Utc>,
    ) -> Vec<DraftField> {
        let edited_in_flight = changed_fields(&self.fields, submitted);

        let mut merged = record.fields.clone();
        for field in &edited_in_flight {
            copy_field(&mut merged, &self.fields, *field);
        }

        let previous = self.overrides;
        self.overrides.clear();
        for field in &edited_in_flight {
            self.overrides.set(*field, previous.is_set(*field));
        }

        self.post_id = Some(record.id);
        self.baseline = record.fields;
        self.reading_time_minutes = record.reading_time_minutes;
        if merged != self.fields {
            self.fields = merged;
            self.revision += 1;
        }
        self.recompute_dirty();
        self.last_saved_at = Some(saved_at);
        edited_in_flight
    }

    /// Adopt a successful unpublish: status goes back to draft on both the
    /// baseline and the local fields. Unpublishing writes nothing else, so
    /// unsaved local edits stay dirty and keep their override flags.
    pub fn mark_unpublished(&mut self, saved_at: DateTime<Utc>) {
        self.baseline.status = PostStatus::Draft;
        if self.fields.status != PostStatus::Draft {
            self.fields.status = PostStatus::Draft;
            self.revision += 1;
        }

        let unsaved = changed_fields(&self.fields, &self.baseline);
        let previous = self.overrides;
        self.overrides.clear();
        for field in &unsaved {
            self.overrides.set(*field, previous.is_set(*field));
        }
        self.field_errors.clear();
        self.recompute_dirty();
        self.last_saved_at = Some(saved_at);
    }

    /// Discard local edits and return to the last loaded or saved version.
    pub fn reset(&mut self) {
        if self.fields != self.baseline {
            self.fields = self.baseline.clone();
            self.revision += 1;
        }
        self.overrides.clear();
        self.field_errors.clear();
        self.is_dirty = false;
    }

    /// Fill empty title, content and excerpt from an import. Title and
    /// content count as user edits; the excerpt counts as derived.
    pub fn merge_import(&mut self, result: &ImportResult) -> Vec<DraftField> {
        let mut filled = Vec::new();

        if self.fields.title.trim().is_empty() {
            if let Some(title) = &result.title {
                if self.update_field(FieldUpdate::Title(title.clone())) {
                    filled.push(DraftField::Title);
                }
            }
        }
        if self.fields.content.trim().is_empty()
            && self.update_field(FieldUpdate::Content(result.content.clone()))
        {
            filled.push(DraftField::Content);
        }
        if self.fields.excerpt.trim().is_empty() {
            if let Some(excerpt) = &result.excerpt {
                if self.apply_derived(FieldUpdate::Excerpt(excerpt.clone())) {
                    filled.push(DraftField::Excerpt);
                }
            }
        }

        filled
    }

    pub fn snapshot(
        &self,
        phase: SavePhase,
        is_saving: bool,
        last_error: Option<String>,
    ) -> DraftSessionState {
        DraftSessionState {
            post_id: self.post_id,
            fields: self.fields.clone(),
            is_dirty: self.is_dirty,
            is_saving,
            is_loading: self.is_loading,
            last_saved_at: self.last_saved_at,
            field_errors: self.field_errors.clone(),
            overrides: self.overrides,
            phase,
            last_error,
            reading_time_minutes: self.reading_time_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_common::format::DetectedFormat;
    use folio_common::import::ImportMetadata;

    fn record(title: &str, slug: &str) -> PostRecord {
        let now = Utc::now();
        PostRecord {
            id: Uuid::new_v4(),
            fields: DraftFields {
                title: title.into(),
                slug: slug.into(),
                content: "Body".into(),
                ..DraftFields::default()
            },
            reading_time_minutes: Some(1),
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn import(title: Option<&str>, content: &str, excerpt: Option<&str>) -> ImportResult {
        ImportResult {
            title: title.map(str::to_string),
            content: content.into(),
            excerpt: excerpt.map(str::to_string),
            format: DetectedFormat::Markdown,
            metadata: ImportMetadata {
                file_name: "post.md".into(),
                byte_size: content.len() as u64,
                media_type: None,
                source_format: DetectedFormat::Markdown,
                converted: false,
                word_count: 1,
                reading_time_minutes: 1,
            },
        }
    }

    // ── update_field ───────────────────────────────────────────────

    #[test]
    fn edit_marks_dirty_and_bumps_revision() {
        let mut store = DraftStore::new();
        assert!(!store.is_dirty());

        assert!(store.update_field(FieldUpdate::Title("Hello".into())));
        assert!(store.is_dirty());
        assert_eq!(store.revision(), 1);

        // Same value again: no change.
        assert!(!store.update_field(FieldUpdate::Title("Hello".into())));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn editing_back_to_baseline_clears_dirty() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Featured(true));
        store.update_field(FieldUpdate::Featured(false));
        assert!(!store.is_dirty());
    }

    #[test]
    fn slug_edit_sets_override_even_when_unchanged() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Slug(String::new()));
        assert!(store.overrides().slug_user_edited);
        assert!(!store.overrides().excerpt_user_edited);
    }

    #[test]
    fn derived_write_leaves_override_unset() {
        let mut store = DraftStore::new();
        store.apply_derived(FieldUpdate::Excerpt("auto".into()));
        assert_eq!(store.fields().excerpt, "auto");
        assert!(!store.overrides().excerpt_user_edited);
    }

    #[test]
    fn edit_clears_that_fields_error_only() {
        let mut store = DraftStore::new();
        let mut errors = ValidationErrors::new();
        errors.insert(DraftField::Title, "title is required");
        errors.insert(DraftField::Content, "content is required");
        store.set_errors(errors);

        store.update_field(FieldUpdate::Title("T".into()));

        assert!(!store.field_errors().contains(DraftField::Title));
        assert!(store.field_errors().contains(DraftField::Content));
    }

    // ── load / reset ───────────────────────────────────────────────

    #[test]
    fn apply_loaded_replaces_everything() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Slug("mine".into()));
        store.set_loading(true);

        let post = record("Loaded", "loaded");
        let id = post.id;
        store.apply_loaded(post);

        assert_eq!(store.post_id(), Some(id));
        assert_eq!(store.fields().title, "Loaded");
        assert!(!store.is_dirty());
        assert!(!store.is_loading());
        assert_eq!(store.overrides(), EditOverrideFlags::default());
    }

    #[test]
    fn reset_restores_baseline() {
        let mut store = DraftStore::new();
        store.apply_loaded(record("Loaded", "loaded"));
        store.update_field(FieldUpdate::Title("Changed".into()));
        store.update_field(FieldUpdate::Excerpt("mine".into()));

        store.reset();

        assert_eq!(store.fields().title, "Loaded");
        assert!(!store.is_dirty());
        assert!(!store.overrides().excerpt_user_edited);
    }

    // ── apply_saved ────────────────────────────────────────────────

    #[test]
    fn saved_fields_take_canonical_values() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Title("Post".into()));
        store.update_field(FieldUpdate::Slug("custom".into()));
        let submitted = store.fields().clone();

        let mut canonical = record("Post", "custom-2");
        canonical.fields.content = String::new();
        let edited = store.apply_saved(canonical, &submitted, Utc::now());

        assert!(edited.is_empty());
        assert_eq!(store.fields().slug, "custom-2");
        assert!(!store.is_dirty());
        assert!(!store.overrides().slug_user_edited);
        assert!(store.last_saved_at().is_some());
    }

    #[test]
    fn edits_made_in_flight_survive_the_save() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Title("Post".into()));
        store.update_field(FieldUpdate::Excerpt("hand".into()));
        let submitted = store.fields().clone();

        store.update_field(FieldUpdate::Title("Post, revised".into()));

        let mut canonical = record("Post", "post");
        canonical.fields.content = String::new();
        canonical.fields.excerpt = "hand".into();
        let edited = store.apply_saved(canonical, &submitted, Utc::now());

        assert_eq!(edited, vec![DraftField::Title]);
        assert_eq!(store.fields().title, "Post, revised");
        assert_eq!(store.fields().slug, "post");
        assert_eq!(store.baseline().title, "Post");
        assert!(store.is_dirty());
        // Excerpt was not edited in flight: its flag is cleared.
        assert!(!store.overrides().excerpt_user_edited);
    }

    #[test]
    fn unpublish_resets_status_on_both_sides() {
        let mut store = DraftStore::new();
        let mut post = record("Live", "live");
        post.fields.status = PostStatus::Published;
        store.apply_loaded(post);

        store.mark_unpublished(Utc::now());

        assert_eq!(store.fields().status, PostStatus::Draft);
        assert_eq!(store.baseline().status, PostStatus::Draft);
        assert!(!store.is_dirty());
    }

    #[test]
    fn unpublish_keeps_unsaved_edits_dirty() {
        let mut store = DraftStore::new();
        let mut post = record("Live", "live");
        post.fields.status = PostStatus::Published;
        store.apply_loaded(post);
        store.update_field(FieldUpdate::Content("Unsaved new body".into()));
        store.update_field(FieldUpdate::Excerpt("typed".into()));

        store.mark_unpublished(Utc::now());

        assert_eq!(store.fields().content, "Unsaved new body");
        assert_eq!(store.baseline().content, "Body");
        assert_eq!(store.baseline().status, PostStatus::Draft);
        assert!(store.is_dirty());
        assert!(store.overrides().excerpt_user_edited);
    }

    // ── merge_import ───────────────────────────────────────────────

    #[test]
    fn import_fills_only_empty_fields() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Title("Kept".into()));

        let filled = store.merge_import(&import(Some("Imported"), "Body", Some("Body")));

        assert_eq!(filled, vec![DraftField::Content, DraftField::Excerpt]);
        assert_eq!(store.fields().title, "Kept");
        assert_eq!(store.fields().content, "Body");
        assert!(!store.overrides().excerpt_user_edited);
    }

    #[test]
    fn import_without_title_leaves_title_empty() {
        let mut store = DraftStore::new();
        let filled = store.merge_import(&import(None, "Body", None));
        assert_eq!(filled, vec![DraftField::Content]);
        assert!(store.fields().title.is_empty());
    }

    // ── helpers ────────────────────────────────────────────────────

    #[test]
    fn validation_errors_display_lists_fields() {
        let mut errors = ValidationErrors::new();
        errors.insert(DraftField::Content, "content is required");
        errors.insert(DraftField::Title, "title is required");
        assert_eq!(
            errors.to_string(),
            "validation failed: title: title is required; content: content is required"
        );
    }

    #[test]
    fn field_update_serializes_tagged() {
        let json = serde_json::to_value(FieldUpdate::Slug("x".into())).unwrap();
        assert_eq!(json, serde_json::json!({"field": "slug", "value": "x"}));
    }

    #[test]
    fn snapshot_carries_workflow_state() {
        let mut store = DraftStore::new();
        store.update_field(FieldUpdate::Title("T".into()));
        let state = store.snapshot(SavePhase::Saving, true, None);
        assert!(state.is_saving);
        assert!(state.is_dirty);
        assert_eq!(state.phase, SavePhase::Saving);
        assert_eq!(state.fields.title, "T");
    }
}
