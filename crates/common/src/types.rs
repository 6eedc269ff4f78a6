// Core post types shared by the import pipeline and the editing session.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication lifecycle of a post.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
    Archived,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Scheduled => "scheduled",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "scheduled" => Some(Self::Scheduled),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Robots meta directive emitted for a post page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RobotsDirective {
    #[default]
    #[serde(rename = "index,follow")]
    IndexFollow,
    #[serde(rename = "noindex,follow")]
    NoindexFollow,
    #[serde(rename = "index,nofollow")]
    IndexNofollow,
    #[serde(rename = "noindex,nofollow")]
    NoindexNofollow,
}

impl RobotsDirective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndexFollow => "index,follow",
            Self::NoindexFollow => "noindex,follow",
            Self::IndexNofollow => "index,nofollow",
            Self::NoindexNofollow => "noindex,nofollow",
        }
    }
}

/// SEO sub-record of a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeoFields {
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: Vec<String>,
    pub canonical_url: Option<String>,
    pub robots: RobotsDirective,
}

/// The editable fields of a post. Also the create/update payload sent to the
/// persistence backend (everything except the server-assigned id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DraftFields {
    pub title: String,
    pub slug: String,
    /// Post body, always markdown.
    pub content: String,
    pub excerpt: String,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub category_ids: BTreeSet<Uuid>,
    pub tag_ids: BTreeSet<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub allow_comments: bool,
    pub featured: bool,
    pub seo: SeoFields,
}

impl Default for DraftFields {
    fn default() -> Self {
        Self {
            title: String::new(),
            slug: String::new(),
            content: String::new(),
            excerpt: String::new(),
            status: PostStatus::Draft,
            featured_image: None,
            category_ids: BTreeSet::new(),
            tag_ids: BTreeSet::new(),
            scheduled_for: None,
            allow_comments: true,
            featured: false,
            seo: SeoFields::default(),
        }
    }
}

/// A post as returned by the persistence backend, including the fields the
/// server computes on write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: DraftFields,
    pub reading_time_minutes: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
