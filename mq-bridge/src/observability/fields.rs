//! Field formatting helpers.

use crate::webhook::ForwardError;

/// Error list rendered as one log field value.
pub fn format_forward_errors(errors: &[ForwardError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bounded UTF-8 preview of a payload for debug logs.
pub fn format_body_preview(body: &[u8]) -> String {
    const MAX_PREVIEW: usize = 256;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_PREVIEW {
        return text.into_owned();
    }
    let mut preview: String = text.chars().take(MAX_PREVIEW).collect();
    preview.push_str("...");
    preview
}
