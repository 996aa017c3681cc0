use std::sync::LazyLock;

use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").expect("valid regex"));

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "against", "all", "and", "are", "amid", "as", "at", "before",
    "but", "by", "can", "could", "does", "for", "from", "has", "have", "her", "his", "how",
    "into", "its", "may", "more", "new", "not", "now", "off", "on", "our", "out", "over",
    "says", "said", "she", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "through", "under", "until", "was", "were", "what", "when",
    "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

const MIN_WORD_CHARS: usize = 3;
const KEYWORD_WORDS: usize = 2;

/// Picks a short tracking keyword out of an article title: the first two
/// words that are neither stop words nor shorter than three characters.
pub fn extract_main_keyword(title: &str) -> String {
    let words: Vec<&str> = WORD
        .find_iter(title)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .take(KEYWORD_WORDS)
        .collect();

    if words.is_empty() {
        title.trim().to_string()
    } else {
        words.join(" ")
    }
}
