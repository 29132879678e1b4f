//! Scrapbox bracket notation.
//!
//! Lines are stored exactly as written, but the embedder only sees the
//! visible text: `[link]`, `[* bold]`, `[label https://..]` and `#tag` are
//! reduced to what a reader would see on the page.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // Innermost [...] group; nested groups such as [[bold]] take two passes
    static ref BRACKET_RE: Regex = Regex::new(r"\[([^\[\]]*)\]").unwrap();
    // [* text], [/ text], [- text], [*/ text], ...
    static ref DECORATION_RE: Regex = Regex::new(r"^[*/\-_!%~]+\s+(.*)$").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^https?://\S+$").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(^|\s)#(\S+)").unwrap();
}

/// Reduce a line of Scrapbox notation to its visible text.
pub fn plain_text(line: &str) -> String {
    let mut text: Cow<'_, str> = Cow::Borrowed(line.trim());

    while BRACKET_RE.is_match(&text) {
        text = Cow::Owned(
            BRACKET_RE
                .replace_all(&text, |caps: &Captures| visible_text(&caps[1]))
                .into_owned(),
        );
    }

    TAG_RE.replace_all(&text, "$1$2").trim().to_string()
}

fn visible_text(inner: &str) -> String {
    let inner = inner.trim();

    if let Some(caps) = DECORATION_RE.captures(inner) {
        return caps[1].trim().to_string();
    }

    let tokens: Vec<&str> = inner.split_whitespace().collect();
    match tokens.as_slice() {
        [first, rest @ ..] if !rest.is_empty() && URL_RE.is_match(first) => rest.join(" "),
        [rest @ .., last] if !rest.is_empty() && URL_RE.is_match(last) => rest.join(" "),
        _ => inner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_and_decorations() {
        assert_eq!(plain_text("see [Recipes] for more"), "see Recipes for more");
        assert_eq!(plain_text("[* important] note"), "important note");
        assert_eq!(plain_text("[[bold]] text"), "bold text");
        assert_eq!(plain_text("[*/ strong italic]"), "strong italic");
    }

    #[test]
    fn url_labels() {
        assert_eq!(plain_text("[Rust https://www.rust-lang.org]"), "Rust");
        assert_eq!(plain_text("[https://www.rust-lang.org The Book]"), "The Book");
        assert_eq!(
            plain_text("[https://www.rust-lang.org]"),
            "https://www.rust-lang.org"
        );
    }

    #[test]
    fn tags_and_indent() {
        assert_eq!(plain_text("  \tbuy #groceries today"), "buy groceries today");
        assert_eq!(plain_text("#todo"), "todo");
        assert_eq!(plain_text("issue#42"), "issue#42");
    }

    #[test]
    fn plain_lines_pass_through() {
        assert_eq!(plain_text("Add sugar"), "Add sugar");
        assert_eq!(plain_text(""), "");
        assert_eq!(plain_text("[]"), "");
    }
}
