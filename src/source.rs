#![forbid(unsafe_code)]

//! Caption sources: the trait the resolver talks to, plus the yt-dlp backed
//! implementation used by the binaries.
//!
//! `YtDlpSource` never keeps files around. Every fetch gets its own scratch
//! directory (named after the video id, the process id and a random suffix)
//! which is removed when the fetch returns, whatever the outcome.

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::classify::{classify_failure, truncate_diagnostic};
use crate::decoder::{decode_subtitle, select_subtitle_file};
use crate::error::SourceError;

/// yt-dlp lists live chat replays among the manual subtitles.
const LIVE_CHAT_CODE: &str = "live_chat";
const ORIGINAL_SUFFIX: &str = "-orig";
/// `json3` first; the other formats are fallbacks the decoder may still read.
const SUB_FORMAT: &str = "json3/json/best";

/// One caption track as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionTrack {
    /// Identifier the source needs to fetch this track again.
    pub code: String,
    pub language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_generated: bool,
    pub is_translatable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub translation_languages: Vec<String>,
}

impl CaptionTrack {
    pub fn manual(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            language_code: code.clone(),
            code,
            name: None,
            is_generated: false,
            is_translatable: false,
            translation_languages: Vec::new(),
        }
    }

    pub fn generated(code: impl Into<String>, translation_languages: Vec<String>) -> Self {
        let code = code.into();
        Self {
            language_code: code.clone(),
            code,
            name: None,
            is_generated: true,
            is_translatable: !translation_languages.is_empty(),
            translation_languages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionSegment {
    pub text: String,
}

impl CaptionSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Manual,
    Generated,
    Translated { from: String },
}

/// What the resolver asks a source to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRequest {
    pub code: String,
    pub language: String,
    pub kind: TrackKind,
}

impl TrackRequest {
    pub fn for_track(track: &CaptionTrack) -> Self {
        Self {
            code: track.code.clone(),
            language: track.language_code.clone(),
            kind: if track.is_generated {
                TrackKind::Generated
            } else {
                TrackKind::Manual
            },
        }
    }

    pub fn translated(track: &CaptionTrack, target_code: &str) -> Self {
        Self {
            code: target_code.to_string(),
            language: target_code.to_string(),
            kind: TrackKind::Translated {
                from: track.language_code.clone(),
            },
        }
    }

    fn wants_automatic(&self) -> bool {
        !matches!(self.kind, TrackKind::Manual)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackListing {
    pub video_id: String,
    pub tracks: Vec<CaptionTrack>,
}

impl TrackListing {
    pub fn manual(&self) -> impl Iterator<Item = &CaptionTrack> {
        self.tracks.iter().filter(|track| !track.is_generated)
    }

    pub fn generated(&self) -> impl Iterator<Item = &CaptionTrack> {
        self.tracks.iter().filter(|track| track.is_generated)
    }
}

/// Anything able to list and fetch caption tracks for a video.
pub trait CaptionSource: Send + Sync {
    fn list_tracks(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<TrackListing, SourceError>> + Send;

    fn fetch_track(
        &self,
        video_id: &str,
        request: &TrackRequest,
    ) -> impl Future<Output = Result<Vec<CaptionSegment>, SourceError>> + Send;
}

#[derive(Debug, Clone)]
pub struct YtDlpSource {
    binary: PathBuf,
    timeout: Duration,
    cookies: Option<PathBuf>,
    scratch_root: PathBuf,
    fallback_language: String,
}

impl YtDlpSource {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            cookies: None,
            scratch_root: std::env::temp_dir(),
            fallback_language: "en".to_string(),
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Language whose files rank second when yt-dlp writes several.
    pub fn with_fallback_language(mut self, language: impl Into<String>) -> Self {
        self.fallback_language = language.into();
        self
    }

    fn video_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={video_id}")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn push_cookies(&self, command: &mut Command) {
        if let Some(cookies) = &self.cookies
            && tokio::fs::try_exists(cookies).await.unwrap_or(false)
        {
            command.arg("--cookies").arg(cookies);
        }
    }

    /// Runs the command within the configured time budget. The child is killed
    /// when the budget runs out because the future owning it is dropped.
    async fn run(&self, mut command: Command) -> Result<Output, SourceError> {
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(SourceError::Upstream(format!(
                "could not launch {}: {err}",
                self.binary.display()
            ))),
            Err(_) => Err(SourceError::Timeout),
        }
    }

    async fn download_track(
        &self,
        video_id: &str,
        request: &TrackRequest,
        scratch: &Path,
    ) -> Result<Vec<CaptionSegment>, SourceError> {
        let output_pattern = scratch.join(video_id);

        let mut command = self.command();
        command
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(if request.wants_automatic() {
                "--write-auto-sub"
            } else {
                "--write-sub"
            })
            .arg("--sub-langs")
            .arg(&request.code)
            .arg("--sub-format")
            .arg(SUB_FORMAT)
            .arg("--output")
            .arg(&output_pattern);
        self.push_cookies(&mut command).await;
        command.arg(Self::video_url(video_id));

        let output = self.run(command).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let candidates = collect_files(scratch).await?;
        let Some(path) =
            select_subtitle_file(&candidates, &request.language, &self.fallback_language)
        else {
            debug!(
                video_id,
                code = %request.code,
                files = candidates.len(),
                "no decodable subtitle file written"
            );
            return Err(SourceError::TrackMissing);
        };

        let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
            SourceError::Upstream(format!("reading {}: {err}", path.display()))
        })?;
        let text = decode_subtitle(&raw)?;
        Ok(vec![CaptionSegment::new(text)])
    }
}

impl CaptionSource for YtDlpSource {
    async fn list_tracks(&self, video_id: &str) -> Result<TrackListing, SourceError> {
        let mut command = self.command();
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress");
        self.push_cookies(&mut command).await;
        command.arg(Self::video_url(video_id));

        let output = self.run(command).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match classify_failure(&stderr) {
                SourceError::TrackMissing => SourceError::Disabled,
                other => other,
            });
        }

        let info: CaptionInfo = serde_json::from_slice(&output.stdout).map_err(|err| {
            SourceError::Upstream(truncate_diagnostic(&format!(
                "parsing yt-dlp metadata: {err}"
            )))
        })?;
        Ok(TrackListing {
            video_id: video_id.to_string(),
            tracks: tracks_from_info(&info),
        })
    }

    async fn fetch_track(
        &self,
        video_id: &str,
        request: &TrackRequest,
    ) -> Result<Vec<CaptionSegment>, SourceError> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{video_id}-{}-", std::process::id()))
            .tempdir_in(&self.scratch_root)
            .map_err(|err| {
                SourceError::Upstream(format!(
                    "creating scratch directory in {}: {err}",
                    self.scratch_root.display()
                ))
            })?;

        // `scratch` is dropped (and deleted) on every return path below.
        self.download_track(video_id, request, scratch.path()).await
    }
}

/// Subset of yt-dlp's `--dump-single-json` output describing captions.
#[derive(Debug, Default, Deserialize)]
struct CaptionInfo {
    #[serde(default)]
    subtitles: Option<BTreeMap<String, Vec<CaptionFormat>>>,
    #[serde(default)]
    automatic_captions: Option<BTreeMap<String, Vec<CaptionFormat>>>,
}

#[derive(Debug, Deserialize)]
struct CaptionFormat {
    name: Option<String>,
}

fn first_name(formats: &[CaptionFormat]) -> Option<String> {
    formats.iter().find_map(|format| format.name.clone())
}

/// Turns yt-dlp's caption maps into tracks.
///
/// Manual subtitles map one-to-one. Automatic keys shaped `<target>-<code>`,
/// where `<code>` is a manual subtitle, are machine translations of that
/// manual track and are attached to it instead of becoming tracks. Of the
/// remaining automatic keys, those ending in `-orig` are the
/// speech-recognition tracks and every other key is a translation of them;
/// older yt-dlp releases have no `-orig` keys, in which case each automatic
/// key is treated as its own generated track.
fn tracks_from_info(info: &CaptionInfo) -> Vec<CaptionTrack> {
    let mut tracks = Vec::new();

    if let Some(subtitles) = &info.subtitles {
        for (code, formats) in subtitles {
            if code == LIVE_CHAT_CODE || formats.is_empty() {
                continue;
            }
            let mut track = CaptionTrack::manual(code.as_str());
            track.name = first_name(formats);
            tracks.push(track);
        }
    }

    let Some(automatic_map) = &info.automatic_captions else {
        return tracks;
    };

    let mut automatic: Vec<(&String, &Vec<CaptionFormat>)> = Vec::new();
    for (code, formats) in automatic_map.iter().filter(|(_, formats)| !formats.is_empty()) {
        match tracks
            .iter_mut()
            .find(|track| is_translation_of(code, &track.code))
        {
            Some(manual) => {
                manual.translation_languages.push(code.clone());
                manual.is_translatable = true;
            }
            None => automatic.push((code, formats)),
        }
    }

    let originals: Vec<_> = automatic
        .iter()
        .filter(|(code, _)| code.ends_with(ORIGINAL_SUFFIX))
        .collect();

    if originals.is_empty() {
        for (code, formats) in &automatic {
            let targets = automatic
                .iter()
                .map(|(other, _)| (*other).clone())
                .filter(|other| other != *code)
                .collect();
            let mut track = CaptionTrack::generated(code.as_str(), targets);
            track.name = first_name(formats);
            tracks.push(track);
        }
        return tracks;
    }

    for (code, formats) in originals {
        let language = code.trim_end_matches(ORIGINAL_SUFFIX);
        let targets = automatic
            .iter()
            .map(|(other, _)| (*other).clone())
            .filter(|other| !other.ends_with(ORIGINAL_SUFFIX) && other != language)
            .collect();
        let mut track = CaptionTrack::generated(code.as_str(), targets);
        track.language_code = language.to_string();
        track.name = first_name(formats);
        tracks.push(track);
    }

    tracks
}

/// `vi-en` is a translation of the manual `en` track; `en` alone is not.
fn is_translation_of(automatic_code: &str, manual_code: &str) -> bool {
    automatic_code
        .strip_suffix(manual_code)
        .and_then(|rest| rest.strip_suffix('-'))
        .is_some_and(|target| !target.is_empty())
}

/// Lists the files yt-dlp left in a scratch directory.
async fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    })
    .await
    .map_err(|err| SourceError::Upstream(format!("scanning scratch directory: {err}")))
}
