/// Message length accepted by the chat transport, in characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4000;

/// Byte offset where the first `max_len` characters end, if the text is
/// longer than that.
fn overflow_at(text: &str, max_len: usize) -> Option<usize> {
    text.char_indices().nth(max_len).map(|(offset, _)| offset)
}

/// Splits `text` into pieces of at most `max_len` characters, cutting at
/// the last line break inside each window when there is one.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if overflow_at(text, max_len).is_none() {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(end) = overflow_at(rest, max_len) {
        let window = &rest[..end];
        let cut = window.rfind('\n').unwrap_or(window.len());
        let head = rest[..cut].trim();
        if !head.is_empty() {
            parts.push(head.to_string());
        }
        rest = rest[cut..].trim();
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}
