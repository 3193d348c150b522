//! Text helpers for config values and server-provided messages.

/// Longest server message shown to the user, in characters.
pub const MAX_MESSAGE_CHARS: usize = 180;

/// Trimmed value, or `None` for missing and blank input.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToString::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Single-line form of a server message: runs of whitespace (newlines
/// included) become one space and the result is capped at
/// [`MAX_MESSAGE_CHARS`].
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .collect()
}
