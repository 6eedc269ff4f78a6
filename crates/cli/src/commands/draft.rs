// `folio draft`: drive one editing session end to end.
//
// Opens a session on an in-memory backend, applies the given fields (and an
// optional import), lets slug and excerpt derivation settle, then saves or
// publishes and prints the canonical state the backend returned.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use folio_common::types::PostStatus;
use folio_editor::{
    spawn_session, DraftSessionState, EditorConfig, FieldUpdate, MemoryPostStore, SaveStatus,
    SessionEvent, SessionHandle,
};

use super::import::import_path;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DraftArgs {
    /// Post title.
    #[arg(long)]
    title: Option<String>,

    /// Markdown file to use as the post body.
    #[arg(long, value_name = "FILE", conflicts_with = "import")]
    content: Option<PathBuf>,

    /// File to import first; only fills fields that are still empty.
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Manual slug; disables slug derivation from the title.
    #[arg(long)]
    slug: Option<String>,

    /// Manual excerpt; disables excerpt derivation from the content.
    #[arg(long)]
    excerpt: Option<String>,

    /// Schedule the post for this RFC 3339 timestamp.
    #[arg(long, value_name = "TIMESTAMP")]
    schedule: Option<DateTime<Utc>>,

    /// Publish instead of saving a draft.
    #[arg(long)]
    publish: bool,

    /// Editor config file (defaults to `~/.folio/editor.toml`).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Default)]
struct DraftRequest {
    title: Option<String>,
    content: Option<String>,
    import: Option<PathBuf>,
    slug: Option<String>,
    excerpt: Option<String>,
    schedule: Option<DateTime<Utc>>,
    publish: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftReport {
    pub status: SaveStatus,
    pub state: DraftSessionState,
    pub events: Vec<SessionEvent>,
}

pub fn run(args: DraftArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = build_request(&args).and_then(|request| {
        let config = super::load_config(args.config.as_deref())?;
        super::block_on(run_session(request, config))?
    });

    match result {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn build_request(args: &DraftArgs) -> anyhow::Result<DraftRequest> {
    let content = match &args.content {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read `{}`", path.display()))?,
        ),
        None => None,
    };
    Ok(DraftRequest {
        title: args.title.clone(),
        content,
        import: args.import.clone(),
        slug: args.slug.clone(),
        excerpt: args.excerpt.clone(),
        schedule: args.schedule,
        publish: args.publish,
    })
}

async fn run_session(request: DraftRequest, config: EditorConfig) -> anyhow::Result<DraftReport> {
    let store = Arc::new(MemoryPostStore::new());
    let handle = spawn_session(Arc::clone(&store), config.clone());
    let mut events = handle.subscribe();

    let outcome = edit_and_save(&handle, &request, &config).await;
    let state = handle.snapshot().await;
    handle.shutdown().await;

    let status = outcome?;
    Ok(DraftReport { status, state: state?, events: drain(&mut events) })
}

async fn edit_and_save(
    handle: &SessionHandle,
    request: &DraftRequest,
    config: &EditorConfig,
) -> anyhow::Result<SaveStatus> {
    if let Some(path) = &request.import {
        let imported = import_path(path, None, &config.import_options()).await?;
        let filled = handle.merge_import(imported).await?;
        debug!(?filled, "merged import");
    }

    let mut updates = Vec::new();
    if let Some(title) = &request.title {
        updates.push(FieldUpdate::Title(title.clone()));
    }
    if let Some(content) = &request.content {
        updates.push(FieldUpdate::Content(content.clone()));
    }
    if let Some(slug) = &request.slug {
        updates.push(FieldUpdate::Slug(slug.clone()));
    }
    if let Some(excerpt) = &request.excerpt {
        updates.push(FieldUpdate::Excerpt(excerpt.clone()));
    }
    if let Some(at) = request.schedule {
        updates.push(FieldUpdate::Status(PostStatus::Scheduled));
        updates.push(FieldUpdate::ScheduledFor(Some(at)));
    }
    for update in updates {
        handle.update_field(update).await?;
    }

    // Let the derivation debounces elapse so the save carries derived fields.
    let settle = config.derive.title_debounce().window.max(config.derive.content_debounce().window);
    tokio::time::sleep(settle).await;

    let status =
        if request.publish { handle.publish().await? } else { handle.save_draft().await? };
    Ok(status)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn format_human(report: &DraftReport) -> String {
    let fields = &report.state.fields;
    let headline = match (report.status, report.state.post_id) {
        (SaveStatus::Completed { post_id, .. }, _) => {
            format!("Saved post {post_id} ({})", fields.status.as_str())
        }
        (SaveStatus::Suppressed, Some(post_id)) => format!("Save already running for {post_id}"),
        (SaveStatus::Suppressed, None) => "Save already running".to_string(),
    };
    let mut lines = vec![
        headline,
        format!("Title:    {}", fields.title),
        format!("Slug:     {}", fields.slug),
        format!("Excerpt:  {}", fields.excerpt),
    ];
    if let Some(minutes) = report.state.reading_time_minutes {
        lines.push(format!("Reading:  {minutes} min"));
    }
    lines.join("\n")
}
