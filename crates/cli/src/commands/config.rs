// `folio config`: show the effective editor config or write the defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use folio_editor::config::editor_config_path;
use folio_editor::EditorConfig;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config file to read or write (defaults to `~/.folio/editor.toml`).
    #[arg(long, value_name = "FILE")]
    path: Option<PathBuf>,

    /// Write the default config to the file if it does not exist yet.
    #[arg(long)]
    init: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub path: Option<String>,
    /// True when the file was written by this invocation.
    pub created: bool,
    pub config: EditorConfig,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let path = args.path.or_else(editor_config_path);

    match inspect(path.as_deref(), args.init) {
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

fn inspect(path: Option<&Path>, init: bool) -> anyhow::Result<ConfigReport> {
    let Some(path) = path else {
        anyhow::bail!("could not determine home directory; pass --path");
    };

    let mut created = false;
    if init && !path.exists() {
        EditorConfig::default()
            .save_to(path)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        created = true;
    }

    let config = if path.exists() {
        EditorConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?
    } else {
        EditorConfig::default()
    };

    Ok(ConfigReport { path: Some(path.display().to_string()), created, config })
}

fn format_human(report: &ConfigReport) -> String {
    let header = match (&report.path, report.created) {
        (Some(path), true) => format!("# wrote defaults to {path}"),
        (Some(path), false) => format!("# {path}"),
        (None, _) => "# defaults".to_string(),
    };
    let body = toml::to_string_pretty(&report.config).unwrap_or_else(|e| format!("# {e}"));
    format!("{header}\n{body}")
}
