#![forbid(unsafe_code)]

//! Maps yt-dlp diagnostics onto [`SourceError`] kinds.
//!
//! yt-dlp has no stable machine-readable error codes, so this is plain
//! substring matching against whatever it printed on stderr. Wording changes
//! between yt-dlp releases; when they do, only this file needs touching.

use crate::error::SourceError;

/// Upper bound for diagnostics copied into an `Upstream` error message.
pub const MAX_DIAGNOSTIC_CHARS: usize = 300;

const BLOCKED_MARKERS: &[&str] = &["sign in to confirm", "bot", "authentication"];
const NOT_FOUND_MARKERS: &[&str] = &["video unavailable", "private video"];
const MISSING_MARKERS: &[&str] = &["no subtitles", "no automatic captions"];

/// Classifies the diagnostic text of a failed (or suspicious) yt-dlp run.
/// First matching group wins; anything unmatched becomes `Upstream`.
pub fn classify_failure(diagnostic: &str) -> SourceError {
    let lowered = diagnostic.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

    if contains_any(BLOCKED_MARKERS) {
        SourceError::Blocked
    } else if contains_any(NOT_FOUND_MARKERS) {
        SourceError::NotFound
    } else if contains_any(MISSING_MARKERS) {
        SourceError::TrackMissing
    } else {
        SourceError::Upstream(truncate_diagnostic(diagnostic))
    }
}

pub fn truncate_diagnostic(diagnostic: &str) -> String {
    let trimmed = diagnostic.trim();
    if trimmed.is_empty() {
        return "yt-dlp failed without diagnostics".to_string();
    }
    if trimmed.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
    cut.push('…');
    cut
}
