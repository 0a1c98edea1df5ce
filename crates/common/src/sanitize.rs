//! Payload string bounding and sanitization (§3 Data Model — Invariants).

/// `tell`/`emote`/`channel` payload `message` field bound.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// `finger`/`who` payload `formatted`/`info` field bound.
pub const MAX_FORMATTED_CHARS: usize = 8192;

/// Strip non-printable characters, trim trailing whitespace, and truncate to
/// `max_chars`. Leading whitespace is preserved (ASCII art and indentation in
/// `emote`/`finger` payloads depend on it).
#[must_use]
pub fn sanitize(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let truncated: String = cleaned.chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        assert_eq!(sanitize("hi\x07there", 100), "hithere");
    }

    #[test]
    fn keeps_newlines_and_tabs() {
        assert_eq!(sanitize("a\nb\tc", 100), "a\nb\tc");
    }

    #[test]
    fn trims_trailing_whitespace() {
        assert_eq!(sanitize("hello   ", 100), "hello");
    }

    #[test]
    fn truncates_to_bound() {
        assert_eq!(sanitize("abcdef", 3), "abc");
    }
}
