// `folio excerpt`: title, excerpt and reading stats of a file as the
// editor would derive them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use folio_common::extract::{
    extract_excerpt, extract_title, plain_text, reading_time_minutes, word_count,
};
use folio_common::format::{detect, DetectedFormat};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ExcerptArgs {
    /// File to summarize.
    pub file: PathBuf,

    /// Maximum excerpt length in characters (defaults to the configured value).
    #[arg(long)]
    max_len: Option<usize>,

    /// Editor config file (defaults to `~/.folio/editor.toml`).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcerptResult {
    pub format: DetectedFormat,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub word_count: usize,
    pub reading_time_minutes: u32,
}

pub fn run(args: ExcerptArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = super::load_config(args.config.as_deref()).and_then(|config| {
        let max_len = args.max_len.unwrap_or(config.derive.excerpt_max_len);
        summarize(&args.file, max_len)
    });

    match result {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn summarize(path: &Path, max_len: usize) -> anyhow::Result<ExcerptResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let format = detect(name, &content);
    let text = plain_text(&content, format);

    Ok(ExcerptResult {
        format,
        title: extract_title(&content, format),
        excerpt: extract_excerpt(&content, format, max_len),
        word_count: word_count(&text),
        reading_time_minutes: reading_time_minutes(&text),
    })
}

fn format_human(result: &ExcerptResult) -> String {
    format!(
        "{}\n{}\n({} words, {} min read)",
        result.title.as_deref().unwrap_or("(untitled)"),
        result.excerpt.as_deref().unwrap_or("(no excerpt)"),
        result.word_count,
        result.reading_time_minutes,
    )
}
