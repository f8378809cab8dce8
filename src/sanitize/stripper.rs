//! Tolerant tag stripper.
//!
//! A small state machine over the input that keeps character data and drops
//! markup: start/end tags, comments, declarations, CDATA sections and
//! processing instructions. It never fails. Anything that cannot be closed
//! (an unterminated tag, a comment without `-->`) is kept as a literal `<`
//! and scanning resumes right after it.
//!
//! Character references are passed through untouched so that an escaped
//! `&lt;b&gt;` never turns into markup during stripping.

/// Elements whose bodies are raw text: no markup is recognised inside them
/// until the matching end tag.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// What the scanner found at a `<`.
#[derive(Debug, PartialEq)]
enum Markup {
    /// Markup spanning up to (not including) this byte offset; drop it.
    Skip(usize),
    /// A start tag for a raw-text element ending at the offset.
    RawTextStart { end: usize, name: &'static str },
    /// Not markup; keep the `<` as data.
    Literal,
}

/// Removes markup from `text` until a pass no longer reduces the number of
/// `<` characters.
///
/// Usually a single pass is enough. Further passes handle markup that was
/// hidden inside other markup (e.g. `<<b>script>`). Termination does not
/// depend on the input being well formed: every accepted pass strictly
/// lowers the `<` count.
pub fn strip_tags(text: &str) -> String {
    let mut text = text.to_string();
    while text.contains('<') && text.contains('>') {
        let stripped = strip_once(&text);
        if count_lt(&stripped) == count_lt(&text) {
            break;
        }
        text = stripped;
    }
    text
}

fn count_lt(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'<').count()
}

/// Runs a single stripping pass, returning only the character data.
pub(crate) fn strip_once(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let Some(rel) = input[i..].find('<') else {
            out.push_str(&input[i..]);
            break;
        };
        let lt = i + rel;
        out.push_str(&input[i..lt]);

        match scan_markup(input, lt) {
            Markup::Skip(end) => i = end,
            Markup::RawTextStart { end, name } => {
                let body_end = find_raw_text_end(input, end, name);
                out.push_str(&input[end..body_end]);
                i = body_end;
            }
            Markup::Literal => {
                out.push('<');
                i = lt + 1;
            }
        }
    }

    out
}

fn scan_markup(input: &str, lt: usize) -> Markup {
    let bytes = input.as_bytes();
    let Some(&next) = bytes.get(lt + 1) else {
        return Markup::Literal;
    };

    match next {
        b if b.is_ascii_alphabetic() => scan_start_tag(input, lt),
        b'/' => skip_to(input, lt + 2, ">"),
        b'!' => {
            let rest = &input[lt..];
            if rest.starts_with("<!--") {
                skip_to(input, lt + 4, "-->")
            } else if rest.starts_with("<![CDATA[") {
                skip_to(input, lt + 9, "]]>")
            } else {
                skip_to(input, lt + 2, ">")
            }
        }
        b'?' => skip_to(input, lt + 2, ">"),
        _ => Markup::Literal,
    }
}

fn skip_to(input: &str, from: usize, terminator: &str) -> Markup {
    match input.get(from..).and_then(|rest| rest.find(terminator)) {
        Some(pos) => Markup::Skip(from + pos + terminator.len()),
        None => Markup::Literal,
    }
}

/// Scans `<name attr="..." ...>`, honouring quoted attribute values so that a
/// `>` inside quotes does not end the tag.
fn scan_start_tag(input: &str, lt: usize) -> Markup {
    let bytes = input.as_bytes();
    let name_start = lt + 1;
    let mut i = name_start;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'/' && bytes[i] != b'>'
    {
        i += 1;
    }
    let name = &input[name_start..i];

    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => {
                let end = i + 1;
                let self_closing = i > name_start && bytes[i - 1] == b'/';
                if !self_closing {
                    if let Some(raw) = RAW_TEXT_ELEMENTS
                        .iter()
                        .find(|el| el.eq_ignore_ascii_case(name))
                    {
                        return Markup::RawTextStart { end, name: *raw };
                    }
                }
                return Markup::Skip(end);
            }
            None => {}
        }
        i += 1;
    }

    Markup::Literal
}

/// Finds where the body of a raw-text element ends: at its `</name`, matched
/// case-insensitively, or at the end of input.
fn find_raw_text_end(input: &str, from: usize, name: &str) -> usize {
    let bytes = input.as_bytes();
    let needle_len = name.len() + 2;
    let mut i = from;
    while let Some(rel) = input[i..].find("</") {
        let at = i + rel;
        if let Some(candidate) = bytes.get(at + 2..at + needle_len) {
            if candidate.eq_ignore_ascii_case(name.as_bytes()) {
                return at;
            }
        }
        i = at + 2;
    }
    input.len()
}
