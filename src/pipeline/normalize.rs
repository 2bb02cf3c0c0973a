//! Body normalization: turns possibly-HTML email bodies into plain text.
//!
//! Pure string processing, no I/O. Markup is parsed with `scraper`
//! (html5ever), which never rejects input, so malformed HTML degrades to
//! best-effort text instead of failing the request.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};

/// Below this length, text is only treated as markup if it contains a tag.
pub const MARKUP_MIN_LEN: usize = 50;

/// Elements whose text content is dropped entirely.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

pub(crate) static TAG_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>").expect("valid tag regex")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid whitespace regex"));

/// Normalize an email body for prompting.
///
/// Markup (see [`looks_like_markup`]) is reduced to its visible text, with
/// `script`/`style` contents removed. Whitespace runs are always collapsed
/// to a single space and the result is trimmed. Idempotent.
pub fn normalize(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut text = collapse_whitespace(input);

    // Entity-escaped markup (`&lt;p&gt;`) surfaces as markup after one pass.
    // Each changing pass shortens the text, so the input length bounds the
    // number of passes.
    for _ in 0..input.len() {
        if !looks_like_markup(&text) {
            break;
        }
        let stripped = collapse_whitespace(&strip_markup(&text));
        if stripped == text {
            break;
        }
        text = stripped;
    }

    text
}

/// Heuristic markup check.
///
/// Requires both `<` and `>`, plus either a minimum length or something
/// shaped like an HTML tag. Short plain text with stray angle brackets
/// (`a < b > c`) is left alone.
pub fn looks_like_markup(text: &str) -> bool {
    if !text.contains('<') || !text.contains('>') {
        return false;
    }
    text.chars().count() >= MARKUP_MIN_LEN || TAG_SHAPE.is_match(text)
}

/// Visible text of an HTML fragment: text nodes outside `script`/`style`,
/// each trimmed, empty ones skipped, joined with single spaces.
pub fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    parts.join(" ")
}

/// Collapse runs of two or more whitespace characters into one space, then trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}
