// CLI subcommand dispatch.

use std::future::Future;
use std::path::Path;

use anyhow::Context;
use clap::Subcommand;

use folio_editor::EditorConfig;

pub mod config;
pub mod detect;
pub mod draft;
pub mod excerpt;
pub mod import;
pub mod slugify;

#[derive(Subcommand)]
pub enum Command {
    /// Parse a markdown, HTML or text file into post fields
    Import(import::ImportArgs),
    /// Print the detected format of a file
    Detect(detect::DetectArgs),
    /// Turn text into a URL slug
    Slugify(slugify::SlugifyArgs),
    /// Extract title, excerpt and reading stats from a file
    Excerpt(excerpt::ExcerptArgs),
    /// Run an editing session against an in-memory backend and save it
    Draft(draft::DraftArgs),
    /// Show or initialize the editor configuration
    Config(config::ConfigArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Import(args) => import::run(args),
        Command::Detect(args) => detect::run(args),
        Command::Slugify(args) => slugify::run(args),
        Command::Excerpt(args) => excerpt::run(args),
        Command::Draft(args) => draft::run(args),
        Command::Config(args) => config::run(args),
    }
}

/// Drive `future` to completion on a fresh current-thread runtime. Only
/// called from the synchronous command entry points.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Load the editor config from `path`, or from `~/.folio/editor.toml` with
/// defaults when no path is given.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display())),
        None => Ok(EditorConfig::load()),
    }
}
