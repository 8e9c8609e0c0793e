//! Topic-exchange routing-key matching.

/// Returns `true` if `routing_key` matches the topic binding `pattern`.
///
/// Both are dot-separated words. In the pattern, `*` matches exactly one
/// word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_key_matches() {
        assert!(topic_matches("army_moves.alice", "army_moves.alice"));
        assert!(!topic_matches("army_moves.alice", "army_moves.bob"));
    }

    #[test]
    fn test_star_matches_exactly_one_word() {
        assert!(topic_matches("war.*", "war.bob"));
        assert!(!topic_matches("war.*", "war"));
        assert!(!topic_matches("war.*", "war.bob.extra"));
        assert!(!topic_matches("war.*", "game_logs.bob"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(topic_matches("game_logs.#", "game_logs"));
        assert!(topic_matches("game_logs.#", "game_logs.alice"));
        assert!(topic_matches("game_logs.#", "game_logs.alice.debug"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#.alice", "war.alice"));
        assert!(!topic_matches("#.alice", "war.bob"));
    }

    #[test]
    fn test_mixed_wildcards() {
        assert!(topic_matches("*.#.end", "a.end"));
        assert!(topic_matches("*.#.end", "a.b.c.end"));
        assert!(!topic_matches("*.#.end", "end"));
    }
}
