//! Lexical tokenization shared by indexing and querying.
//!
//! Text is lowercased, statute subsections such as `87103(a)` are collapsed
//! into one token (`87103a`), everything except letters, digits and hyphens
//! becomes whitespace, and English stop words are dropped.
//!
//! Negation words (`not`, `no`) are deliberately absent from the stop list:
//! "is not required to disclose" and "is required to disclose" must not
//! tokenize alike.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PAREN_SUBSECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\(([a-zA-Z0-9])\)").expect("static regex"));

static NON_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\-]+").expect("static regex"));

#[rustfmt::skip]
const STOPWORDS_LIST: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an",
    "and", "any", "are", "as", "at", "be", "because", "been", "before", "being",
    "below", "between", "both", "but", "by", "can", "could", "did", "do", "does",
    "doing", "done", "down", "during", "each", "few", "for", "from", "further",
    "get", "got", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "let", "may", "me", "might", "more", "most", "much",
    "must", "my", "myself", "nor", "of", "off", "on", "once", "only", "or", "other",
    "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "shall",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "upon", "us", "very", "was",
    "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

static STOPWORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOPWORDS_LIST.iter().copied().collect());

/// Splits `text` into index terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let collapsed = PAREN_SUBSECTION.replace_all(&lowered, "$1$2");
    let cleaned = NON_TOKEN.replace_all(&collapsed, " ");
    cleaned
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Returns true if `word` is dropped by [`tokenize`].
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}
