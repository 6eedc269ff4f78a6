// Auto-derivation of slug and excerpt.
//
// Title and content changes feed debouncers; once a value settles the slug
// (from the title) or the excerpt (from the content) is recomputed, unless
// the user has overridden that field. Override flags are read when the value
// settles, not when it was typed.

use std::time::Instant;

use tracing::trace;

use folio_common::extract::extract_excerpt;
use folio_common::format::DetectedFormat;
use folio_common::slug::slugify;

use crate::config::DeriveConfig;
use crate::debounce::Debounced;
use crate::draft::{EditOverrideFlags, FieldUpdate};

#[derive(Debug, Clone)]
pub struct AutoDerivation {
    title: Debounced<String>,
    content: Debounced<String>,
    excerpt_max_len: usize,
}

impl AutoDerivation {
    pub fn new(config: &DeriveConfig) -> Self {
        Self {
            title: Debounced::new(config.title_debounce()),
            content: Debounced::new(config.content_debounce()),
            excerpt_max_len: config.excerpt_max_len,
        }
    }

    pub fn title_changed(&mut self, title: &str, now: Instant) {
        self.title.push_at(title.to_string(), now);
    }

    pub fn content_changed(&mut self, content: &str, now: Instant) {
        self.content.push_at(content.to_string(), now);
    }

    /// Treat `title` and `content` as already derived and drop anything
    /// pending. Used when a post is loaded or the draft is reset.
    pub fn seed(&mut self, title: &str, content: &str) {
        self.title.seed(title.to_string());
        self.content.seed(content.to_string());
    }

    /// Treat the persisted `title` and `content` as already derived but keep
    /// edits made while the save was in flight pending.
    pub fn rebase(&mut self, title: &str, content: &str) {
        self.title.rebase(title.to_string());
        self.content.rebase(content.to_string());
    }

    /// Derived updates for every value that settled by `now`.
    pub fn poll_at(&mut self, now: Instant, overrides: EditOverrideFlags) -> Vec<FieldUpdate> {
        let mut updates = Vec::new();

        if let Some(title) = self.title.poll_at(now) {
            if overrides.slug_user_edited {
                trace!("slug edited by hand, not deriving");
            } else {
                updates.push(FieldUpdate::Slug(slugify(&title)));
            }
        }

        if let Some(content) = self.content.poll_at(now) {
            if overrides.excerpt_user_edited {
                trace!("excerpt edited by hand, not deriving");
            } else {
                let excerpt =
                    extract_excerpt(&content, DetectedFormat::Markdown, self.excerpt_max_len);
                updates.push(FieldUpdate::Excerpt(excerpt.unwrap_or_default()));
            }
        }

        updates
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.title.next_deadline(), self.content.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn cancel(&mut self) {
        self.title.cancel();
        self.content.cancel();
    }
}
