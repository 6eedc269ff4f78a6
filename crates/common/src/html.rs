// HTML → markdown normalization for imported post bodies.
//
// Ordered, best-effort substitution pipeline aimed at common authoring-tool
// output. Structural rewrites (headings, lists, code) run before the blanket
// tag strip so their markup is translated instead of discarded.

use std::sync::OnceLock;

use regex::{Captures, Regex};

struct Patterns {
    non_content: Regex,
    heading: Regex,
    strong: Regex,
    em: Regex,
    anchor: Regex,
    img: Regex,
    attr_src: Regex,
    attr_alt: Regex,
    unordered_list: Regex,
    ordered_list: Regex,
    list_item: Regex,
    pre_code: Regex,
    inline_code: Regex,
    paragraph: Regex,
    line_break: Regex,
    any_tag: Regex,
    numeric_entity: Regex,
    blank_runs: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        non_content: Regex::new(concat!(
            r"(?is)<!--.*?-->",
            r"|<head(?:\s[^>]*)?>.*?</head>",
            r"|<script(?:\s[^>]*)?>.*?</script>",
            r"|<style(?:\s[^>]*)?>.*?</style>",
        ))
        .expect("non-content pattern should compile"),
        heading: Regex::new(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>")
            .expect("heading pattern should compile"),
        strong: Regex::new(r"(?is)<(?:strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)\s*>")
            .expect("strong pattern should compile"),
        em: Regex::new(r"(?is)<(?:em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)\s*>")
            .expect("em pattern should compile"),
        anchor: Regex::new(
            r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#,
        )
        .expect("anchor pattern should compile"),
        img: Regex::new(r"(?is)<img\b[^>]*>").expect("img pattern should compile"),
        attr_src: Regex::new(r#"(?is)\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("src attribute pattern should compile"),
        attr_alt: Regex::new(r#"(?is)\salt\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("alt attribute pattern should compile"),
        unordered_list: Regex::new(r"(?is)<ul(?:\s[^>]*)?>(.*?)</ul\s*>")
            .expect("ul pattern should compile"),
        ordered_list: Regex::new(r"(?is)<ol(?:\s[^>]*)?>(.*?)</ol\s*>")
            .expect("ol pattern should compile"),
        list_item: Regex::new(r"(?is)<li(?:\s[^>]*)?>(.*?)</li\s*>")
            .expect("li pattern should compile"),
        pre_code: Regex::new(
            r"(?is)<pre(?:\s[^>]*)?>\s*<code(?:\s[^>]*)?>(.*?)</code\s*>\s*</pre\s*>",
        )
        .expect("pre/code pattern should compile"),
        inline_code: Regex::new(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>")
            .expect("code pattern should compile"),
        paragraph: Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>")
            .expect("paragraph pattern should compile"),
        line_break: Regex::new(r"(?i)<br\s*/?>").expect("br pattern should compile"),
        any_tag: Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("tag pattern should compile"),
        numeric_entity: Regex::new(r"&#(?:([0-9]{1,7})|[xX]([0-9A-Fa-f]{1,6}));")
            .expect("numeric entity pattern should compile"),
        blank_runs: Regex::new(r"\n{3,}").expect("blank run pattern should compile"),
    })
}

/// Convert an HTML fragment or document into markdown.
pub fn html_to_markdown(html: &str) -> String {
    let p = patterns();

    let text = p.non_content.replace_all(html, "");

    let text = p.heading.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("{} {}\n\n", "#".repeat(level), caps[2].trim())
    });

    let text = p.strong.replace_all(&text, "**$1**");
    let text = p.em.replace_all(&text, "*$1*");

    let text = p.anchor.replace_all(&text, |caps: &Captures| {
        let href = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        format!("[{}]({href})", caps[3].trim())
    });

    let text = p.img.replace_all(&text, |caps: &Captures| {
        let tag = &caps[0];
        let src = attribute(&p.attr_src, tag).unwrap_or_default();
        let alt = attribute(&p.attr_alt, tag).unwrap_or_default();
        format!("![{alt}]({src})")
    });

    let text = p.unordered_list.replace_all(&text, |caps: &Captures| {
        let mut out = String::from("\n");
        for item in p.list_item.captures_iter(&caps[1]) {
            out.push_str("- ");
            out.push_str(item[1].trim());
            out.push('\n');
        }
        out.push('\n');
        out
    });

    let text = p.ordered_list.replace_all(&text, |caps: &Captures| {
        let mut out = String::from("\n");
        for (index, item) in p.list_item.captures_iter(&caps[1]).enumerate() {
            out.push_str(&format!("{}. {}\n", index + 1, item[1].trim()));
        }
        out.push('\n');
        out
    });

    let text = p.pre_code.replace_all(&text, |caps: &Captures| {
        format!("\n```\n{}\n```\n\n", caps[1].trim_matches('\n'))
    });
    let text = p.inline_code.replace_all(&text, "`$1`");

    let text = p.paragraph.replace_all(&text, |caps: &Captures| format!("{}\n\n", caps[1].trim()));
    let text = p.line_break.replace_all(&text, "\n");

    let text = p.any_tag.replace_all(&text, "");
    let text = decode_entities(&text);

    p.blank_runs.replace_all(&text, "\n\n").trim().to_string()
}

fn attribute(pattern: &Regex, tag: &str) -> Option<String> {
    pattern
        .captures(tag)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
}

/// Remove every tag (plus comment, script, style and head blocks) and decode
/// entities, leaving only the readable text.
pub fn strip_tags(html: &str) -> String {
    let p = patterns();
    let text = p.non_content.replace_all(html, " ");
    let text = p.any_tag.replace_all(&text, " ");
    decode_entities(&text)
}

/// Decode the named entities authoring tools commonly emit, plus numeric
/// character references. `&amp;` is decoded last so `&amp;lt;` yields the
/// literal text `&lt;`.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    let decoded = patterns().numeric_entity.replace_all(&decoded, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
            (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
            _ => None,
        };
        code.and_then(char::from_u32).map_or_else(|| caps[0].to_string(), String::from)
    });

    decoded.replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── headings and paragraphs ────────────────────────────────────

    #[test]
    fn converts_heading_and_paragraph() {
        let md = html_to_markdown("<h1>Hello</h1><p>World <strong>wide</strong> web.</p>");
        assert_eq!(md, "# Hello\n\nWorld **wide** web.");
    }

    #[test]
    fn converts_all_heading_levels() {
        let md = html_to_markdown("<h2 class=\"x\">Two</h2><h6>Six</h6>");
        assert_eq!(md, "## Two\n\n###### Six");
    }

    #[test]
    fn line_breaks_become_newlines() {
        assert_eq!(html_to_markdown("<p>a<br>b<br/>c</p>"), "a\nb\nc");
    }

    // ── inline formatting ──────────────────────────────────────────

    #[test]
    fn converts_emphasis_variants() {
        assert_eq!(html_to_markdown("<b>bold</b> <i>it</i> <em>em</em>"), "**bold** *it* *em*");
    }

    #[test]
    fn br_and_blockquote_are_not_mistaken_for_bold() {
        let md = html_to_markdown("<blockquote>quoted</blockquote>");
        assert_eq!(md, "quoted");
    }

    #[test]
    fn converts_links() {
        let md = html_to_markdown(r#"<p>See <a class="l" href="https://x.dev">the docs</a>.</p>"#);
        assert_eq!(md, "See [the docs](https://x.dev).");
    }

    #[test]
    fn converts_images_with_and_without_alt() {
        assert_eq!(html_to_markdown(r#"<img alt="Cat" src="/cat.png">"#), "![Cat](/cat.png)");
        assert_eq!(html_to_markdown(r#"<img src='/dog.png' />"#), "![](/dog.png)");
    }

    #[test]
    fn img_is_not_mistaken_for_italic() {
        assert_eq!(html_to_markdown(r#"<img src="/a.png"><i>x</i>"#), "![](/a.png)*x*");
    }

    // ── lists ──────────────────────────────────────────────────────

    #[test]
    fn converts_unordered_list() {
        let md = html_to_markdown("<ul><li>one</li><li> two </li></ul>");
        assert_eq!(md, "- one\n- two");
    }

    #[test]
    fn ordered_list_counter_resets_per_list() {
        let md = html_to_markdown("<ol><li>a</li><li>b</li></ol><p>mid</p><ol><li>c</li></ol>");
        assert_eq!(md, "1. a\n2. b\n\nmid\n\n1. c");
    }

    // ── code ───────────────────────────────────────────────────────

    #[test]
    fn converts_pre_code_to_fence() {
        let md = html_to_markdown("<pre><code>let x = 1;\nlet y = 2;</code></pre>");
        assert_eq!(md, "```\nlet x = 1;\nlet y = 2;\n```");
    }

    #[test]
    fn converts_inline_code() {
        assert_eq!(html_to_markdown("<p>call <code>run()</code></p>"), "call `run()`");
    }

    #[test]
    fn code_entities_decoded_after_strip() {
        let md = html_to_markdown("<pre><code>&lt;div&gt;</code></pre>");
        assert_eq!(md, "```\n<div>\n```");
    }

    // ── stripping and cleanup ──────────────────────────────────────

    #[test]
    fn strips_unknown_tags() {
        assert_eq!(html_to_markdown("<div><span>text</span></div>"), "text");
    }

    #[test]
    fn drops_head_script_and_comments() {
        let html = concat!(
            "<!DOCTYPE html><html><head><title>T</title></head><body>",
            "<!-- c --><script>var a = '<p>';</script><p>Body</p></body></html>",
        );
        assert_eq!(html_to_markdown(html), "Body");
    }

    #[test]
    fn collapses_blank_line_runs() {
        let md = html_to_markdown("<p>a</p>\n\n\n\n<p>b</p>");
        assert_eq!(md, "a\n\nb");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(html_to_markdown(""), "");
        assert_eq!(html_to_markdown("   "), "");
    }

    // ── entities ───────────────────────────────────────────────────

    #[test]
    fn decodes_named_entities() {
        assert_eq!(
            decode_entities("a&nbsp;b &amp; &lt;c&gt; &quot;d&quot; &#39;e&#39;"),
            "a b & <c> \"d\" 'e'"
        );
    }

    #[test]
    fn amp_decoded_last() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(decode_entities("&#8212; &#x2014;"), "— —");
    }

    #[test]
    fn invalid_numeric_entity_left_as_is() {
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
    }

    #[test]
    fn strip_tags_keeps_text_only() {
        let text = strip_tags("<p>One</p><p>Two &amp; three</p>");
        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), vec!["One", "Two", "&", "three"]);
    }
}
