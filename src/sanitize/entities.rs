use std::borrow::Cow;

/// Decodes named and numeric character references (`&amp;`, `&#39;`, `&#x27;`)
/// into the characters they stand for.
///
/// Unknown references are left as-is, so this never fails.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    html_escape::decode_html_entities(text)
}

/// Escapes `&`, `<`, `>`, `"` and `'` so that text declared as plain can be
/// handled by the same pipeline as HTML bodies.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(text)
}
