// File import: read → detect → (html) normalize → extract → ImportResult.
//
// Apart from reading the file this is a pure transform; `parse_file` works on
// an already-loaded `RawImportFile` so it can be unit tested synchronously.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{
    extract_excerpt, extract_title, plain_text, reading_time_minutes, word_count,
    DEFAULT_EXCERPT_LEN,
};
use crate::format::{detect_with_media_type, DetectedFormat};
use crate::html::html_to_markdown;

/// Default upper bound for an imported file.
pub const DEFAULT_MAX_IMPORT_BYTES: u64 = 5 * 1024 * 1024;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read `{name}` as UTF-8 text")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{name}` is {size} bytes, larger than the {limit} byte import limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("could not parse `{name}`: {reason}")]
    Parse { name: String, reason: String },
}

/// An uploaded file before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImportFile {
    pub name: String,
    pub size: u64,
    /// Declared MIME type, if the upload carried one.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawImportFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), size: bytes.len() as u64, media_type, bytes }
    }

    /// Build from an in-memory string.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, None, text.into().into_bytes())
    }

    /// Read a file from disk. The name is the path's file name.
    pub async fn from_path(path: &Path) -> Result<Self, ImportError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ImportError::Read { name: name.clone(), source })?;
        Ok(Self::new(name, None, bytes))
    }

    /// Decode the payload as UTF-8, dropping a leading byte-order mark.
    pub fn text(&self) -> Result<&str, ImportError> {
        let text = std::str::from_utf8(&self.bytes).map_err(|error| ImportError::Read {
            name: self.name.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        })?;
        Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text))
    }
}

/// Import limits and extraction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub max_bytes: u64,
    pub excerpt_max_len: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_MAX_IMPORT_BYTES, excerpt_max_len: DEFAULT_EXCERPT_LEN }
    }
}

/// Provenance and reading stats of an import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportMetadata {
    pub file_name: String,
    pub byte_size: u64,
    pub media_type: Option<String>,
    /// Format detected for the uploaded file, before any conversion.
    pub source_format: DetectedFormat,
    /// True when the body was converted from HTML.
    pub converted: bool,
    pub word_count: usize,
    pub reading_time_minutes: u32,
}

/// Parsed upload, ready to merge into a draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub title: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    /// Format of `content`; markdown whenever the source was HTML.
    pub format: DetectedFormat,
    pub metadata: ImportMetadata,
}

/// Parse an uploaded file into normalized content plus metadata.
pub fn parse_file(
    file: &RawImportFile,
    options: &ImportOptions,
) -> Result<ImportResult, ImportError> {
    if file.size > options.max_bytes {
        return Err(ImportError::TooLarge {
            name: file.name.clone(),
            size: file.size,
            limit: options.max_bytes,
        });
    }

    let raw = file.text()?;
    if raw.trim().is_empty() {
        return Err(ImportError::Parse { name: file.name.clone(), reason: "file is empty".into() });
    }

    let source_format = detect_with_media_type(&file.name, file.media_type.as_deref(), raw);

    let (content, format) = match source_format {
        DetectedFormat::Html => (html_to_markdown(raw), DetectedFormat::Markdown),
        other => (raw.to_string(), other),
    };

    if content.trim().is_empty() {
        return Err(ImportError::Parse {
            name: file.name.clone(),
            reason: format!("{source_format} conversion produced no content"),
        });
    }

    let mut title = extract_title(&content, format);
    if title.is_none() && source_format == DetectedFormat::Html {
        // The converted body loses `<title>`; the original still has it.
        title = extract_title(raw, DetectedFormat::Html);
    }
    let excerpt = extract_excerpt(&content, format, options.excerpt_max_len);

    let body_text = plain_text(&content, format);
    let metadata = ImportMetadata {
        file_name: file.name.clone(),
        byte_size: file.size,
        media_type: file.media_type.clone(),
        source_format,
        converted: source_format != format,
        word_count: word_count(&body_text),
        reading_time_minutes: reading_time_minutes(&body_text),
    };

    Ok(ImportResult { title, content, excerpt, format, metadata })
}
