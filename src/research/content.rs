// src/research/content.rs

//! Reduce fetched HTML to readable text before extraction: drop script,
//! style, and boilerplate chrome (nav/footer/header), strip remaining
//! tags, decode common entities, collapse whitespace.

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<nav\b.*?</nav\s*>|<footer\b.*?</footer\s*>|<header\b.*?</header\s*>|<noscript\b.*?</noscript\s*>",
    )
    .expect("block pattern")
});

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comments"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tags"));

const MAX_CONTENT_CHARS: usize = 40_000;

pub fn strip_markup(html: &str) -> String {
    let without_blocks = BLOCK_RE.replace_all(html, " ");
    let without_comments = COMMENT_RE.replace_all(&without_blocks, " ");
    let without_tags = TAG_RE.replace_all(&without_comments, " ");

    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_CONTENT_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push_str(" ...[truncated]");
        out
    }
}
