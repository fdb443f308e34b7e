use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on characters of any single field sent to the model
pub const MAX_PROMPT_FIELD_CHARS: usize = 500;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip markup tags, collapse whitespace and truncate to
/// [`MAX_PROMPT_FIELD_CHARS`] characters.
pub fn sanitize_input(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = TAG_RE.replace_all(text, "");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = text.trim();

    match text.char_indices().nth(MAX_PROMPT_FIELD_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
