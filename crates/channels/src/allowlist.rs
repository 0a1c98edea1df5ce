//! Allow/ban-list matching shared by moderation checks.
//!
//! An empty allow-list means unrestricted. Entries match case-insensitively,
//! either exactly or with a single `*` glob for any run of characters.

/// Check if `subject` (a MUD name, or a `mud:user` endpoint) is permitted by
/// `list`. An empty list allows everyone.
pub fn is_allowed(subject: &str, list: &[String]) -> bool {
    if list.is_empty() {
        return true;
    }
    let subject_lower = subject.to_lowercase();
    list.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        if pattern.contains('*') {
            glob_match(&pattern, &subject_lower)
        } else {
            pattern == subject_lower
        }
    })
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_allows_everyone() {
        assert!(is_allowed("Alpha", &[]));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let list = vec!["Alpha".to_string()];
        assert!(is_allowed("alpha", &list));
        assert!(!is_allowed("Beta", &list));
    }

    #[test]
    fn glob_prefix_match() {
        let list = vec!["Alpha:*".to_string()];
        assert!(is_allowed("Alpha:ann", &list));
        assert!(!is_allowed("Beta:ann", &list));
    }
}
