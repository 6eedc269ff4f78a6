// Import format detection: extension first, content sniffing second, the
// declared media type only when sniffing finds no markup. Never fails;
// unknown input is plain text.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Format of an uploaded post body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    Markdown,
    Html,
    Text,
}

impl DetectedFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }

    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Map a declared MIME type to a format. Parameters such as
    /// `; charset=utf-8` are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "text/plain" => Some(Self::Text),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn html_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)<!doctype\s+html|<html[\s>]").expect("html marker pattern should compile")
    })
}

fn markdown_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(?:#{1,6}[ \t]+\S|```|~~~)")
            .expect("markdown marker pattern should compile")
    })
}

/// Classify `content` using the file name and the body itself.
///
/// An explicit extension always wins, so `notes.txt` containing `# Heading`
/// stays plain text.
pub fn detect(filename: &str, content: &str) -> DetectedFormat {
    detect_with_media_type(filename, None, content)
}

/// Like [`detect`] but also consults the declared media type when neither
/// the file name nor the content gives a markup signal. Uploads are often
/// declared `text/plain` whatever they hold, so the body is sniffed first.
pub fn detect_with_media_type(
    filename: &str,
    media_type: Option<&str>,
    content: &str,
) -> DetectedFormat {
    if let Some(format) = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DetectedFormat::from_extension)
    {
        return format;
    }

    match sniff(content) {
        DetectedFormat::Text => {
            media_type.and_then(DetectedFormat::from_media_type).unwrap_or(DetectedFormat::Text)
        }
        sniffed => sniffed,
    }
}

/// Content-only classification.
pub fn sniff(content: &str) -> DetectedFormat {
    if html_marker().is_match(content) {
        DetectedFormat::Html
    } else if markdown_marker().is_match(content) {
        DetectedFormat::Markdown
    } else {
        DetectedFormat::Text
    }
}
