//! AMQP topic pattern matching
//!
//! Routing keys and binding patterns are dot separated words. In a pattern
//! `*` stands for exactly one word and `#` for zero or more words.

/// True when `routing_key` is accepted by the binding `pattern`
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // `#` swallows 0..=key.len() words
            (0..=key.len()).any(|skip| match_words(rest, &key[skip..]))
        }
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) if word == "*" || word == head => match_words(rest, tail),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_words() {
        assert!(topic_matches("ns.users", "ns.users"));
        assert!(!topic_matches("ns.users", "ns.users.1"));
        assert!(!topic_matches("ns", "ns.users"));
        assert!(topic_matches("", ""));
        assert!(!topic_matches("", "ns"));
    }

    #[test]
    fn test_wildcards() {
        assert!(topic_matches("ns.*", "ns.users"));
        assert!(!topic_matches("ns.*", "ns"));
        assert!(topic_matches("ns.#", "ns"));
        assert!(topic_matches("ns.#", "ns.users.1"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("*.users.#", "ns.users"));
        assert!(!topic_matches("*.users.#", "ns.orders.1"));
    }

    proptest! {
        #[test]
        fn prop_hash_matches_everything(key in "[a-z]{1,6}(\\.[a-z]{1,6}){0,4}") {
            prop_assert!(topic_matches("#", &key));
        }

        #[test]
        fn prop_key_matches_itself(key in "[a-z]{1,6}(\\.[a-z]{1,6}){0,4}") {
            prop_assert!(topic_matches(&key, &key));
        }

        #[test]
        fn prop_star_count_must_equal_word_count(words in 1usize..6, stars in 1usize..6) {
            let key = vec!["w"; words].join(".");
            let pattern = vec!["*"; stars].join(".");
            prop_assert_eq!(topic_matches(&pattern, &key), words == stars);
        }
    }
}
