// `folio import`: parse a file into post fields without opening a session.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;

use folio_common::import::{parse_file, ImportOptions, ImportResult, RawImportFile};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// File to import (`.md`, `.html`, `.txt`; anything else is sniffed).
    pub file: PathBuf,

    /// Declared media type, used when neither extension nor content decides.
    #[arg(long, value_name = "MIME")]
    media_type: Option<String>,

    /// Override the configured size limit in bytes.
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Editor config file (defaults to `~/.folio/editor.toml`).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: ImportArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = super::load_config(args.config.as_deref()).and_then(|config| {
        let mut options = config.import_options();
        if let Some(max_bytes) = args.max_bytes {
            options.max_bytes = max_bytes;
        }
        super::block_on(import_path(&args.file, args.media_type, &options))?
    });

    match result {
        Ok(result) => {
            if result.title.is_none() {
                output::print_warning(format, "NO_TITLE", "no title found in the imported file");
            }
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

pub(crate) async fn import_path(
    path: &Path,
    media_type: Option<String>,
    options: &ImportOptions,
) -> anyhow::Result<ImportResult> {
    let mut file = RawImportFile::from_path(path)
        .await
        .with_context(|| format!("failed to import `{}`", path.display()))?;
    file.media_type = media_type;

    let result = parse_file(&file, options)
        .with_context(|| format!("failed to import `{}`", path.display()))?;
    info!(
        file = %file.name,
        format = result.metadata.source_format.as_str(),
        words = result.metadata.word_count,
        "imported file"
    );
    Ok(result)
}

fn format_human(result: &ImportResult) -> String {
    let meta = &result.metadata;
    let mut lines = vec![
        format!("Title:    {}", result.title.as_deref().unwrap_or("(none)")),
        format!("Excerpt:  {}", result.excerpt.as_deref().unwrap_or("(none)")),
        format!(
            "Format:   {}{}",
            meta.source_format.as_str(),
            if meta.converted { " (converted to markdown)" } else { "" }
        ),
        format!(
            "Size:     {} bytes, {} words, {} min read",
            meta.byte_size, meta.word_count, meta.reading_time_minutes
        ),
        String::new(),
    ];
    lines.push(result.content.clone());
    lines.join("\n")
}
