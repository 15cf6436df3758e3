#![forbid(unsafe_code)]

//! Guards shared by the transcript binaries: privilege checks at startup and
//! validation of video ids before they reach the yt-dlp command line.

use anyhow::{Result, bail};
use nix::unistd::Uid;

use crate::error::TranscriptError;

const MAX_VIDEO_ID_LEN: usize = 64;

/// Fails fast when a binary is started as root. yt-dlp runs with whatever
/// privileges we have, so a regular or dedicated service account is required.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Accepts YouTube-style ids: ASCII letters, digits, `_` and `-`, not starting
/// with `-` so the id can never be read as a yt-dlp option.
pub fn validate_video_id(video_id: &str) -> Result<(), TranscriptError> {
    let valid = !video_id.is_empty()
        && video_id.len() <= MAX_VIDEO_ID_LEN
        && !video_id.starts_with('-')
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(TranscriptError::InvalidVideoId(video_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Uid;

    #[test]
    fn ensure_not_root_allows_unprivileged_uid() {
        let uid = Uid::from_raw(1000);
        assert!(ensure_not_root_for(uid, "tester").is_ok());
    }

    #[test]
    fn ensure_not_root_rejects_root_uid() {
        let uid = Uid::from_raw(0);
        let err = ensure_not_root_for(uid, "tester").unwrap_err();
        assert!(err.to_string().contains("must not be run as root"));
    }

    #[test]
    fn accepts_youtube_ids() {
        for id in ["dQw4w9WgXcQ", "a-b_c", "x"] {
            assert!(validate_video_id(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn rejects_option_like_and_odd_ids() {
        let long = "a".repeat(65);
        for id in ["", "-exec", "../etc", "abc def", "abc;rm", "ví", long.as_str()] {
            assert_eq!(
                validate_video_id(id),
                Err(TranscriptError::InvalidVideoId(id.to_string())),
                "{id}"
            );
        }
    }
}
