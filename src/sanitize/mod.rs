//! HTML-to-plaintext sanitizer.
//!
//! [`sanitize`] turns feed titles, summaries and bodies into single-line plain
//! text. The pipeline runs in a fixed order:
//!
//! 1. Whitespace sitting directly between two tags is removed (`>  <` → `><`)
//!    so that stripping the tags does not leave stray spaces behind.
//! 2. Markup is stripped with a tolerant scanner (see [`strip_tags`]).
//! 3. Every whitespace run collapses to a single ASCII space.
//! 4. Character references are decoded (`&amp;` → `&`).
//!
//! The function is total: malformed markup degrades to best-effort text.
//!
//! # Examples
//!
//! ```
//! use feedsift::sanitize::sanitize;
//!
//! assert_eq!(sanitize("<p>Fish &amp;\n\tchips</p>"), "Fish & chips");
//! assert_eq!(sanitize("<b>bold"), "bold");
//! ```

mod entities;
mod stripper;

use std::borrow::Cow;
use std::fmt;

pub use entities::{decode_entities, escape_text};
pub use stripper::strip_tags;

/// Converts HTML (or text that may contain HTML) to plain text.
pub fn sanitize(text: &str) -> String {
    let text = strip_spaces_between_tags(text);
    let text = strip_tags(&text);
    let text = collapse_whitespace(&text);
    decode_entities(&text).into_owned()
}

/// Sanitizes any displayable value by its textual form.
///
/// Raw feed fields are not always strings (numeric tag terms, for instance).
pub fn sanitize_display<T: fmt::Display + ?Sized>(value: &T) -> String {
    sanitize(&value.to_string())
}

/// Removes whitespace runs that sit between a `>` and the next `<`.
pub fn strip_spaces_between_tags(text: &str) -> Cow<'_, str> {
    if !text.contains('>') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(gt) = rest.find('>') {
        out.push_str(&rest[..=gt]);
        let after = &rest[gt + 1..];
        let trimmed = after.trim_start_matches(char::is_whitespace);
        rest = if trimmed.len() < after.len() && trimmed.starts_with('<') {
            trimmed
        } else {
            after
        };
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Replaces every run of whitespace (spaces, tabs, newlines, Unicode spaces)
/// with a single ASCII space. Leading and trailing runs are collapsed, not
/// trimmed.
///
/// Returns `Cow::Borrowed` when the text is already collapsed.
pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    let mut prev_ws = false;
    let needs_collapse = text.chars().any(|c| {
        let ws = c.is_whitespace();
        let hit = ws && (prev_ws || c != ' ');
        prev_ws = ws;
        hit
    });

    if !needs_collapse {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }

    Cow::Owned(out)
}
