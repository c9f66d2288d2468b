use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Shortest token, in characters, that is kept as a term.
pub const MIN_TERM_CHARS: usize = 3;

lazy_static! {
    // Word characters are ASCII only; anything else is stripped before splitting.
    static ref NON_WORD: Regex = Regex::new(r"[^A-Za-z0-9_\s]").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "the", "is", "at", "which", "on", "and", "a", "an", "to", "in", "of", "for",
            "with", "by", "that", "this", "it", "or", "as", "be", "are", "i", "me", "my",
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into normalized terms: lowercase, strip punctuation, split on
/// whitespace, drop short tokens and stop words. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped
        .split_whitespace()
        .filter(|tok| tok.chars().count() >= MIN_TERM_CHARS)
        .filter(|tok| !is_stopword(tok))
        .map(str::to_owned)
        .collect()
}
