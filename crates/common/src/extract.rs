// Title and excerpt extraction from post bodies.
//
// Markdown is walked with pulldown-cmark so headings inside code fences or
// HTML blocks are never mistaken for the title. Excerpts are plain text,
// whitespace-collapsed and bounded to `max_len` characters including the
// ellipsis.

use std::sync::OnceLock;

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use regex::Regex;

use crate::format::DetectedFormat;
use crate::html::strip_tags;

/// Default excerpt bound, ellipsis included.
pub const DEFAULT_EXCERPT_LEN: usize = 160;
/// A plain-text first line at or over this many characters is a paragraph,
/// not a title.
pub const MAX_TEXT_TITLE_CHARS: usize = 100;
/// Appended when an excerpt is truncated.
pub const ELLIPSIS: &str = "...";

const WORDS_PER_MINUTE: usize = 200;

fn html_h1() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<h1(?:\s[^>]*)?>(.*?)</h1\s*>").expect("h1 pattern should compile")
    })
}

fn html_title() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<title(?:\s[^>]*)?>(.*?)</title\s*>")
            .expect("title pattern should compile")
    })
}

// ── Title ───────────────────────────────────────────────────────────

/// Derive a human-usable title from `content`.
///
/// - markdown: text of the first `#` heading
/// - html: first `<h1>`, else `<title>`
/// - text: first non-empty line, if shorter than 100 characters
pub fn extract_title(content: &str, format: DetectedFormat) -> Option<String> {
    let title = match format {
        DetectedFormat::Markdown => markdown_title(content),
        DetectedFormat::Html => html_title_text(content),
        DetectedFormat::Text => content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .filter(|line| line.chars().count() < MAX_TEXT_TITLE_CHARS)
            .map(str::to_string),
    }?;

    let title = collapse_whitespace(&title);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn markdown_title(markdown: &str) -> Option<String> {
    let mut title: Option<String> = None;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H1, .. })
                if title.is_none() && is_atx_heading(markdown, range.start) =>
            {
                title = Some(String::new());
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(title) = title.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if title.is_some() => {
                return title;
            }
            _ => {}
        }
    }

    None
}

fn html_title_text(html: &str) -> Option<String> {
    let from_h1 = html_h1()
        .captures(html)
        .map(|caps| collapse_whitespace(&strip_tags(&caps[1])))
        .filter(|text| !text.is_empty());

    from_h1.or_else(|| {
        html_title()
            .captures(html)
            .map(|caps| collapse_whitespace(&strip_tags(&caps[1])))
            .filter(|text| !text.is_empty())
    })
}

// ── Excerpt ─────────────────────────────────────────────────────────

/// Derive a plain-text excerpt of at most `max_len` characters.
///
/// Returns `None` when nothing readable remains after stripping.
pub fn extract_excerpt(content: &str, format: DetectedFormat, max_len: usize) -> Option<String> {
    let text = plain_text(content, format);
    if text.is_empty() {
        return None;
    }
    Some(truncate_at_word(&text, max_len))
}

/// Readable text of `content` with format noise removed and whitespace
/// collapsed to single spaces.
pub fn plain_text(content: &str, format: DetectedFormat) -> String {
    match format {
        DetectedFormat::Markdown => collapse_whitespace(&markdown_body_text(content)),
        DetectedFormat::Html => collapse_whitespace(&strip_tags(content)),
        DetectedFormat::Text => collapse_whitespace(content),
    }
}

/// Walk markdown and keep body text: drops the title heading, code blocks,
/// inline code, images and raw HTML. Link text is kept, emphasis markers
/// vanish with the parse.
fn markdown_body_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut skip_depth = 0usize;
    let mut title_skipped = false;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H1, .. })
                if !title_skipped && is_atx_heading(markdown, range.start) =>
            {
                title_skipped = true;
                skip_depth = 1;
            }
            Event::Start(Tag::CodeBlock(_) | Tag::Image { .. } | Tag::HtmlBlock) => {
                skip_depth = 1;
            }
            Event::Text(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak | Event::Rule => out.push(' '),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableCell,
            ) => out.push(' '),
            _ => {}
        }
    }

    out
}

fn is_atx_heading(markdown: &str, offset: usize) -> bool {
    let line_start = markdown[..offset].rfind('\n').map(|index| index + 1).unwrap_or(0);
    markdown[line_start..]
        .chars()
        .find(|ch| !ch.is_whitespace())
        .map(|ch| ch == '#')
        .unwrap_or(false)
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bound `text` to `max_len` characters, ellipsis included.
///
/// Cuts at the last space that leaves room for the ellipsis; a single word
/// longer than the budget is hard-cut. Text already within bounds is
/// returned unchanged.
pub fn truncate_at_word(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_len <= ellipsis_len {
        return text.chars().take(max_len).collect();
    }

    let budget = max_len - ellipsis_len;
    // One extra char so a word ending exactly at the budget is kept whole.
    let window: String = text.chars().take(budget + 1).collect();

    let cut = match window.rfind(char::is_whitespace) {
        Some(index) if index > 0 => window[..index].trim_end().to_string(),
        _ => window.chars().take(budget).collect(),
    };

    format!("{cut}{ELLIPSIS}")
}

// ── Reading stats ───────────────────────────────────────────────────

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated reading time at 200 words per minute, rounded up. Zero only for
/// text with no words.
pub fn reading_time_minutes(text: &str) -> u32 {
    let words = word_count(text);
    words.div_ceil(WORDS_PER_MINUTE) as u32
}
