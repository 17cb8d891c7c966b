//! Cleanup of raw model replies before they enter the transcript

use regex::Regex;
use std::sync::LazyLock;

/// Double quotes in their ASCII and typographic forms. Apostrophes stay so
/// contractions survive.
const QUOTE_CHARS: &[char] = &['"', '“', '”', '„', '«', '»'];

/// `#tag` plus at most one trailing whitespace character
static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+\s?").expect("hashtag pattern is valid"));

/// Strip quotes and hashtags, collapse whitespace runs, trim.
///
/// Total over all inputs; empty in, empty out.
pub fn sanitize_response(raw: &str) -> String {
    let unquoted = raw.replace(QUOTE_CHARS, "");
    let untagged = HASHTAG.replace_all(&unquoted, "");
    untagged.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Address `speaker` unless the text already opens with a mention
pub fn prefix_mention(text: &str, speaker: Option<&str>) -> String {
    match speaker {
        Some(name) if !text.starts_with('@') => format!("@{name} {text}"),
        _ => text.to_string(),
    }
}
