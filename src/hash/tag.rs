//! Hash-tag extraction
//!
//! `{user1000}.following` and `{user1000}.followers` share the hash key
//! `user1000` and therefore land on the same shard.

/// Extract the hash tag of a key
///
/// Uses the first `{` and the next `}` after it. When there is no brace, the
/// brace is unclosed or the braces are empty, the full key is returned.
pub fn extract_hash_tag(key: &str) -> &str {
    let Some(open) = key.find('{') else {
        return key;
    };

    match key[open + 1..].find('}') {
        Some(len) if len > 0 => &key[open + 1..open + 1 + len],
        _ => key,
    }
}

/// Hash key for a record, honoring hash tags only when enabled
pub fn hash_key(key: &str, hash_tags: bool) -> &str {
    if hash_tags {
        extract_hash_tag(key)
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tag_wins() {
        assert_eq!(extract_hash_tag("{first}{second}"), "first");
        assert_eq!(extract_hash_tag("{user1000}.following"), "user1000");
        assert_eq!(extract_hash_tag("foo{bar}{zap}"), "bar");
    }

    #[test]
    fn test_full_key_fallbacks() {
        assert_eq!(extract_hash_tag("plain"), "plain");
        assert_eq!(extract_hash_tag("{}"), "{}");
        assert_eq!(extract_hash_tag("{}.rest"), "{}.rest");
        assert_eq!(extract_hash_tag("open{only"), "open{only");
        assert_eq!(extract_hash_tag("close}first{"), "close}first{");
    }

    #[test]
    fn test_brace_inside_tag() {
        // Only the first `{` counts; the second one is part of the tag
        assert_eq!(extract_hash_tag("{{bar}}"), "{bar");
    }

    #[test]
    fn test_disabled_tags() {
        assert_eq!(hash_key("{a}b", false), "{a}b");
        assert_eq!(hash_key("{a}b", true), "a");
    }
}
