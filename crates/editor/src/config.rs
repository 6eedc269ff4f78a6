// Local configuration for the editing session.
//
// Editor config: `~/.folio/editor.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use folio_common::extract::DEFAULT_EXCERPT_LEN;
use folio_common::import::{ImportOptions, DEFAULT_MAX_IMPORT_BYTES};

use crate::debounce::DebounceConfig;

/// Root directory for Folio local state: `~/.folio/`.
pub fn folio_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".folio"))
}

/// Path to the editor config file: `~/.folio/editor.toml`.
pub fn editor_config_path() -> Option<PathBuf> {
    folio_dir().map(|d| d.join("editor.toml"))
}

// ── Editor config ──────────────────────────────────────────────────

/// Editing session configuration at `~/.folio/editor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EditorConfig {
    /// Slug and excerpt derivation.
    pub derive: DeriveConfig,
    /// Background saving of dirty drafts.
    pub autosave: AutosaveConfig,
    /// File import limits.
    pub import: ImportConfig,
}

impl EditorConfig {
    /// Load from `~/.folio/editor.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        editor_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.folio/editor.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = editor_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Import options derived from the import and derive sections.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            max_bytes: self.import.max_bytes,
            excerpt_max_len: self.derive.excerpt_max_len,
        }
    }
}

/// Debounce windows and limits for auto-derived fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeriveConfig {
    /// Quiet period before a title change re-derives the slug.
    pub title_debounce_ms: u64,
    /// Quiet period before a content change re-derives the excerpt.
    pub content_debounce_ms: u64,
    /// Maximum excerpt length in characters, ellipsis included.
    pub excerpt_max_len: usize,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            title_debounce_ms: 300,
            content_debounce_ms: 500,
            excerpt_max_len: DEFAULT_EXCERPT_LEN,
        }
    }
}

impl DeriveConfig {
    pub fn title_debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.title_debounce_ms)
    }

    pub fn content_debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.content_debounce_ms)
    }
}

/// Autosave timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Disable to save only on explicit request.
    pub enabled: bool,
    /// Quiet period before an edit counts as a new snapshot.
    pub snapshot_debounce_ms: u64,
    /// Delay between the last snapshot change and the autosave.
    pub interval_sec: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { enabled: true, snapshot_debounce_ms: 1000, interval_sec: 30 }
    }
}

impl AutosaveConfig {
    pub fn snapshot_debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.snapshot_debounce_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportConfig {
    /// Largest accepted upload in bytes.
    pub max_bytes: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_MAX_IMPORT_BYTES }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
