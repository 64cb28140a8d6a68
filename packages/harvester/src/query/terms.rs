//! Free-text query to search terms.

/// Words too common to narrow a search.
pub const STOP_WORDS: [&str; 25] = [
    "a", "an", "and", "are", "as", "at", "be", "been", "by", "for", "from", "has", "in", "is",
    "it", "of", "on", "that", "the", "to", "was", "when", "where", "will", "with",
];

/// Lowercased, purely alphabetic words of `query` that are not stop words.
pub fn main_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.chars().all(char::is_alphabetic))
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_words() {
        assert_eq!(
            main_words("The best Rust tutorials for beginners"),
            vec!["best", "rust", "tutorials", "beginners"]
        );
    }

    #[test]
    fn test_drops_non_alphabetic() {
        assert_eq!(main_words("rust 2024 c++ async-await Ünïcode"), vec!["rust", "ünïcode"]);
        assert!(main_words("   ").is_empty());
    }
}
