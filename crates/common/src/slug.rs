// Post slug generation.
//
// Slugs: accents folded, lowercase, only [a-z0-9_-] kept, whitespace runs
// become a single hyphen, hyphen runs collapse, no leading/trailing hyphen.
// Duplicate slugs are disambiguated with a numeric suffix: `post`, `post-2`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Convert a post title into a URL-safe slug.
///
/// - Decomposes accented letters and drops the combining marks (`Über` → `uber`)
/// - Lowercases all characters
/// - Removes everything except ASCII letters, digits, `_`, `-` and whitespace
/// - Replaces whitespace runs with a single hyphen
/// - Collapses consecutive hyphens
/// - Strips leading and trailing hyphens
///
/// Idempotent: `slugify(&slugify(x)) == slugify(x)`. Returns an empty string
/// when nothing slug-worthy remains.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.nfkd().filter(|ch| !is_combining_mark(*ch)).flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else if ch == '-' || ch.is_whitespace() {
            pending_hyphen = true;
        }
    }

    slug
}

/// Append an ordinal suffix to a slug to disambiguate duplicates.
///
/// - `base`: the slug without suffix
/// - `occurrence`: which occurrence this is (1 = first, no suffix)
pub fn disambiguate(base: &str, occurrence: usize) -> String {
    if occurrence <= 1 {
        base.to_string()
    } else {
        format!("{base}-{occurrence}")
    }
}
