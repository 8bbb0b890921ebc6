//! Text normalization passes.
//!
//! Each pass is a pure function so the pipeline in [`crate::sanitizer`] can
//! apply them in a fixed order and collect what each one changed.

/// Outcome of [`repair_encoding`].
pub struct Repaired {
    pub text: String,
    pub fixed: bool,
}

/// Replaces invalid UTF-8 sequences with U+FFFD.
pub fn repair_encoding(bytes: &[u8]) -> Repaired {
    match std::str::from_utf8(bytes) {
        Ok(text) => Repaired {
            text: text.to_string(),
            fixed: false,
        },
        Err(_) => Repaired {
            text: String::from_utf8_lossy(bytes).into_owned(),
            fixed: true,
        },
    }
}

/// Outcome of [`strip_control`].
pub struct Stripped {
    pub text: String,
    /// Characters removed. A CRLF pair folded into LF counts as zero.
    pub removed: usize,
}

/// True for invisible format characters that can hide content from a reviewer.
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

/// Removes control characters except newlines.
///
/// - CRLF and lone CR become LF
/// - TAB is kept only when `preserve_tabs` is set
/// - C0, DEL and C1 controls are removed
/// - zero-width, bidi-override and BOM characters are removed
pub fn strip_control(input: &str, preserve_tabs: bool) -> Stripped {
    let mut text = String::with_capacity(input.len());
    let mut removed = 0;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => text.push('\n'),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                text.push('\n');
            }
            '\t' if preserve_tabs => text.push('\t'),
            c if c.is_control() || is_invisible_format(c) => removed += 1,
            c => text.push(c),
        }
    }

    Stripped { text, removed }
}

/// Cuts `text` to at most `max_bytes` bytes without splitting a codepoint.
///
/// Returns true if anything was cut.
pub fn truncate_utf8(text: &mut String, max_bytes: usize) -> bool {
    if text.len() <= max_bytes {
        return false;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}
