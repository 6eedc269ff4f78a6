// `folio detect`: report how an import would classify a file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use folio_common::format::{detect_with_media_type, DetectedFormat};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// File to classify.
    pub file: PathBuf,

    /// Declared media type, used when neither extension nor content decides.
    #[arg(long, value_name = "MIME")]
    media_type: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectResult {
    pub file: String,
    pub format: DetectedFormat,
}

pub fn run(args: DetectArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match detect_path(&args.file, args.media_type.as_deref()) {
        Ok(result) => {
            output::print_output(format, &result, |r| {
                format!("{}: {}", r.file, r.format.as_str())
            })?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn detect_path(path: &Path, media_type: Option<&str>) -> anyhow::Result<DetectResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    Ok(DetectResult {
        file: path.display().to_string(),
        format: detect_with_media_type(name, media_type, &content),
    })
}
