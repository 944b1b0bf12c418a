use std::borrow::Cow;

/// Appended to text that was cut short before being sent to the model.
pub const TRUNCATION_MARKER: &str = "...";

/// Keep the first `max_chars` characters of `text`, appending
/// [`TRUNCATION_MARKER`] when anything was dropped. Counts characters, not
/// bytes, so multi-byte scripts are never split mid-codepoint.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            Cow::Owned(out)
        }
    }
}

/// First `max_chars` characters, for log lines.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        None => text,
        Some((cut, _)) => &text[..cut],
    }
}
