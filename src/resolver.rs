#![forbid(unsafe_code)]

//! Caption resolution policy.
//!
//! Resolution walks a fixed, priority-ordered table of [`Strategy`] values.
//! Each strategy turns the track listing into zero or more [`TrackRequest`]s;
//! the first request whose text is non-empty wins and nothing after it is
//! consulted. Track-level misses move on to the next request, while
//! video-level failures (disabled captions, bot checks, timeouts) end the
//! resolution immediately.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{SourceError, TranscriptError};
use crate::source::{CaptionSegment, CaptionSource, CaptionTrack, TrackListing, TrackRequest};

pub const DEFAULT_PREFERRED_LANGUAGE: &str = "vi";
pub const DEFAULT_FALLBACK_LANGUAGE: &str = "en";

/// Generated tracks in these languages are tried, in order, as translation
/// sources for the preferred language.
pub const TRANSLATION_SOURCE_LANGUAGES: &[&str] =
    &["en", "ko", "ja", "zh-Hans", "zh-Hant", "es", "fr"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NativePreferred,
    TranslatedPreferred,
    NativeFallback,
    GeneratedFallback,
    AnyAvailable,
}

const DEFAULT_STRATEGIES: [Strategy; 5] = [
    Strategy::NativePreferred,
    Strategy::TranslatedPreferred,
    Strategy::NativeFallback,
    Strategy::GeneratedFallback,
    Strategy::AnyAvailable,
];

/// The fallback order used by [`resolve`].
pub fn default_strategies() -> &'static [Strategy] {
    &DEFAULT_STRATEGIES
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::NativePreferred => "native_preferred",
            Self::TranslatedPreferred => "translated_preferred",
            Self::NativeFallback => "native_fallback",
            Self::GeneratedFallback => "generated_fallback",
            Self::AnyAvailable => "any_available",
        }
    }

    /// Requests this strategy would issue for the given listing, best first.
    pub fn requests(self, listing: &TrackListing, languages: &Languages) -> Vec<TrackRequest> {
        match self {
            Self::NativePreferred => {
                let manual = matching(listing.manual(), &languages.preferred);
                let generated = matching(listing.generated(), &languages.preferred);
                manual
                    .into_iter()
                    .chain(generated)
                    .map(TrackRequest::for_track)
                    .collect()
            }
            Self::TranslatedPreferred => {
                let mut requests = Vec::new();
                for source_language in TRANSLATION_SOURCE_LANGUAGES {
                    if language_matches(source_language, &languages.preferred) {
                        continue;
                    }
                    for track in matching(listing.generated(), source_language) {
                        if !track.is_translatable {
                            continue;
                        }
                        if let Some(target) = track
                            .translation_languages
                            .iter()
                            .find(|code| language_matches(code, &languages.preferred))
                        {
                            requests.push(TrackRequest::translated(track, target));
                        }
                    }
                }
                requests
            }
            Self::NativeFallback => matching(listing.manual(), &languages.fallback)
                .into_iter()
                .map(TrackRequest::for_track)
                .collect(),
            Self::GeneratedFallback => matching(listing.generated(), &languages.fallback)
                .into_iter()
                .map(TrackRequest::for_track)
                .collect(),
            Self::AnyAvailable => listing
                .manual()
                .chain(listing.generated())
                .map(TrackRequest::for_track)
                .collect(),
        }
    }
}

/// Preferred and fallback language codes for one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Languages {
    pub preferred: String,
    pub fallback: String,
}

impl Languages {
    pub fn new(preferred: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            preferred: preferred.into(),
            fallback: fallback.into(),
        }
    }
}

impl Default for Languages {
    fn default() -> Self {
        Self::new(DEFAULT_PREFERRED_LANGUAGE, DEFAULT_FALLBACK_LANGUAGE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub text: String,
    pub language: String,
    pub method: Strategy,
}

/// JSON body returned for a resolved transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptPayload {
    pub video_id: String,
    pub transcript: String,
    pub language: String,
    pub method: Strategy,
    pub length: usize,
}

impl TranscriptPayload {
    pub fn new(video_id: impl Into<String>, result: ResolutionResult) -> Self {
        Self {
            video_id: video_id.into(),
            length: result.text.chars().count(),
            transcript: result.text,
            language: result.language,
            method: result.method,
        }
    }
}

/// `en` matches `en` and regional variants such as `en-US`; exact matches
/// come first.
fn matching<'a>(
    tracks: impl Iterator<Item = &'a CaptionTrack>,
    language: &str,
) -> Vec<&'a CaptionTrack> {
    let (mut exact, regional): (Vec<_>, Vec<_>) = tracks
        .filter(|track| language_matches(&track.language_code, language))
        .partition(|track| track.language_code.eq_ignore_ascii_case(language));
    exact.extend(regional);
    exact
}

fn language_matches(code: &str, language: &str) -> bool {
    if code.eq_ignore_ascii_case(language) {
        return true;
    }
    code.len() > language.len()
        && code.as_bytes()[language.len()] == b'-'
        && code[..language.len()].eq_ignore_ascii_case(language)
}

/// Joins segments with single spaces, turns every run of line breaks into one
/// space and trims the result.
pub fn assemble_text(segments: &[CaptionSegment]) -> String {
    let joined = segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut text = String::with_capacity(joined.len());
    let mut in_break = false;
    for c in joined.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                text.push(' ');
                in_break = true;
            }
        } else {
            text.push(c);
            in_break = false;
        }
    }
    text.trim().to_string()
}

pub async fn resolve<S: CaptionSource>(
    source: &S,
    video_id: &str,
    languages: &Languages,
) -> Result<ResolutionResult, TranscriptError> {
    resolve_with(source, video_id, languages, default_strategies()).await
}

/// Same as [`resolve`] with an explicit strategy table.
pub async fn resolve_with<S: CaptionSource>(
    source: &S,
    video_id: &str,
    languages: &Languages,
    strategies: &[Strategy],
) -> Result<ResolutionResult, TranscriptError> {
    let listing = source.list_tracks(video_id).await.map_err(|err| match err {
        SourceError::TrackMissing => TranscriptError::Disabled,
        other => other.into(),
    })?;
    if listing.tracks.is_empty() {
        info!(video_id, "video has no caption tracks");
        return Err(TranscriptError::Disabled);
    }

    let mut attempted = HashSet::new();
    let mut decode_failed = false;

    for &strategy in strategies {
        for request in strategy.requests(&listing, languages) {
            if !attempted.insert(request.clone()) {
                continue;
            }
            debug!(
                video_id,
                strategy = strategy.name(),
                code = %request.code,
                "trying caption track"
            );

            match source.fetch_track(video_id, &request).await {
                Ok(segments) => {
                    let text = assemble_text(&segments);
                    if text.is_empty() {
                        debug!(video_id, code = %request.code, "caption track was empty");
                        continue;
                    }
                    info!(
                        video_id,
                        strategy = strategy.name(),
                        language = %request.language,
                        chars = text.chars().count(),
                        "resolved transcript"
                    );
                    return Ok(ResolutionResult {
                        text,
                        language: request.language,
                        method: strategy,
                    });
                }
                Err(err) if err.is_recoverable() => {
                    if matches!(err, SourceError::Decode(_)) {
                        decode_failed = true;
                    }
                    debug!(video_id, code = %request.code, error = %err, "caption track skipped");
                }
                Err(err) => {
                    info!(video_id, strategy = strategy.name(), error = %err, "resolution aborted");
                    return Err(err.into());
                }
            }
        }
    }

    Err(if decode_failed {
        TranscriptError::UnrecognizedFormat
    } else {
        TranscriptError::NotAvailable
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::source::TrackKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory source keyed by `(code, automatic?)`.
    #[derive(Default)]
    struct MockSource {
        listing: Vec<CaptionTrack>,
        listing_error: Option<SourceError>,
        responses: HashMap<(String, bool), Result<Vec<CaptionSegment>, SourceError>>,
        calls: Mutex<Vec<TrackRequest>>,
    }

    impl MockSource {
        fn with_tracks(tracks: Vec<CaptionTrack>) -> Self {
            Self {
                listing: tracks,
                ..Self::default()
            }
        }

        fn respond(mut self, code: &str, automatic: bool, text: &str) -> Self {
            self.responses.insert(
                (code.to_string(), automatic),
                Ok(vec![CaptionSegment::new(text)]),
            );
            self
        }

        fn fail(mut self, code: &str, automatic: bool, err: SourceError) -> Self {
            self.responses
                .insert((code.to_string(), automatic), Err(err));
            self
        }

        fn calls(&self) -> Vec<TrackRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CaptionSource for MockSource {
        async fn list_tracks(&self, video_id: &str) -> Result<TrackListing, SourceError> {
            if let Some(err) = &self.listing_error {
                return Err(err.clone());
            }
            Ok(TrackListing {
                video_id: video_id.to_string(),
                tracks: self.listing.clone(),
            })
        }

        async fn fetch_track(
            &self,
            _video_id: &str,
            request: &TrackRequest,
        ) -> Result<Vec<CaptionSegment>, SourceError> {
            self.calls.lock().unwrap().push(request.clone());
            let automatic = !matches!(request.kind, TrackKind::Manual);
            self.responses
                .get(&(request.code.clone(), automatic))
                .cloned()
                .unwrap_or(Err(SourceError::TrackMissing))
        }
    }

    fn english_asr() -> CaptionTrack {
        let mut track = CaptionTrack::generated("en-orig", vec!["vi".into(), "fr".into()]);
        track.language_code = "en".into();
        track
    }

    #[tokio::test]
    async fn native_preferred_wins_and_stops() {
        let source = MockSource::with_tracks(vec![
            CaptionTrack::manual("en"),
            CaptionTrack::manual("vi"),
        ])
        .respond("vi", false, "xin chào")
        .respond("en", false, "hello");

        let result = resolve(&source, "abc", &Languages::default()).await.unwrap();
        assert_eq!(result.text, "xin chào");
        assert_eq!(result.language, "vi");
        assert_eq!(result.method, Strategy::NativePreferred);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn english_asr_is_translated_to_vietnamese() {
        let source = MockSource::with_tracks(vec![english_asr()])
            .respond("vi", true, "bản dịch")
            .respond("en-orig", true, "original");

        let result = resolve(&source, "abc", &Languages::default()).await.unwrap();
        assert_eq!(result.text, "bản dịch");
        assert_eq!(result.language, "vi");
        assert_eq!(result.method, Strategy::TranslatedPreferred);
        assert_eq!(
            source.calls(),
            vec![TrackRequest {
                code: "vi".into(),
                language: "vi".into(),
                kind: TrackKind::Translated { from: "en".into() },
            }]
        );
    }

    #[tokio::test]
    async fn falls_back_to_manual_then_generated_english() {
        let source = MockSource::with_tracks(vec![CaptionTrack::manual("en-US"), english_asr()])
            .respond("en-orig", true, "auto english");

        let result = resolve(&source, "abc", &Languages::default()).await.unwrap();
        assert_eq!(result.text, "auto english");
        assert_eq!(result.language, "en");
        assert_eq!(result.method, Strategy::GeneratedFallback);

        let codes: Vec<_> = source.calls().into_iter().map(|call| call.code).collect();
        assert_eq!(codes, vec!["vi", "en-US", "en-orig"]);
    }

    #[tokio::test]
    async fn any_available_skips_already_attempted_tracks() {
        let source = MockSource::with_tracks(vec![
            CaptionTrack::manual("en"),
            CaptionTrack::manual("de"),
        ])
        .respond("de", false, "hallo");

        let result = resolve(&source, "abc", &Languages::default()).await.unwrap();
        assert_eq!(result.method, Strategy::AnyAvailable);
        assert_eq!(result.language, "de");

        let codes: Vec<_> = source.calls().into_iter().map(|call| call.code).collect();
        assert_eq!(codes, vec!["en", "de"]);
    }

    #[tokio::test]
    async fn empty_text_is_not_success() {
        let source = MockSource::with_tracks(vec![CaptionTrack::manual("vi")])
            .respond("vi", false, " \n\n ");
        assert_eq!(
            resolve(&source, "abc", &Languages::default()).await,
            Err(TranscriptError::NotAvailable)
        );
    }

    #[tokio::test]
    async fn no_tracks_means_disabled_for_any_language() {
        for languages in [Languages::default(), Languages::new("fr", "de")] {
            let source = MockSource::default();
            assert_eq!(
                resolve(&source, "abc", &languages).await,
                Err(TranscriptError::Disabled)
            );
            assert!(source.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn fatal_errors_short_circuit() {
        let source = MockSource::with_tracks(vec![
            CaptionTrack::manual("vi"),
            CaptionTrack::manual("en"),
        ])
        .fail("vi", false, SourceError::Blocked)
        .respond("en", false, "hello");

        assert_eq!(
            resolve(&source, "abc", &Languages::default()).await,
            Err(TranscriptError::Blocked)
        );
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn timeout_surfaces_as_timeout() {
        let source = MockSource::with_tracks(vec![CaptionTrack::manual("vi")]).fail(
            "vi",
            false,
            SourceError::Timeout,
        );
        assert_eq!(
            resolve(&source, "abc", &Languages::default()).await,
            Err(TranscriptError::Timeout)
        );
    }

    #[tokio::test]
    async fn listing_failures_propagate() {
        let source = MockSource {
            listing_error: Some(SourceError::NotFound),
            ..MockSource::default()
        };
        assert_eq!(
            resolve(&source, "abc", &Languages::default()).await,
            Err(TranscriptError::NotFound)
        );
    }

    #[tokio::test]
    async fn undecodable_tracks_are_reported_when_nothing_else_works() {
        let source = MockSource::with_tracks(vec![CaptionTrack::manual("vi")]).fail(
            "vi",
            false,
            SourceError::Decode(DecodeError::UnrecognizedFormat),
        );
        assert_eq!(
            resolve(&source, "abc", &Languages::default()).await,
            Err(TranscriptError::UnrecognizedFormat)
        );
    }

    #[test]
    fn strategy_table_order() {
        let names: Vec<_> = default_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "native_preferred",
                "translated_preferred",
                "native_fallback",
                "generated_fallback",
                "any_available"
            ]
        );
    }

    #[test]
    fn translation_never_sources_from_the_preferred_language() {
        let mut korean_asr = CaptionTrack::generated("ko-orig", vec!["en".into()]);
        korean_asr.language_code = "ko".into();
        let mut english_asr = english_asr();
        english_asr.translation_languages.push("en-GB".into());
        let listing = TrackListing {
            video_id: "abc".into(),
            tracks: vec![english_asr, korean_asr],
        };

        let requests =
            Strategy::TranslatedPreferred.requests(&listing, &Languages::new("en", "vi"));
        assert_eq!(
            requests,
            vec![TrackRequest {
                code: "en".into(),
                language: "en".into(),
                kind: TrackKind::Translated { from: "ko".into() },
            }]
        );

        let english_only = TrackListing {
            video_id: "abc".into(),
            tracks: vec![listing.tracks[0].clone()],
        };
        assert!(
            Strategy::TranslatedPreferred
                .requests(&english_only, &Languages::new("en", "vi"))
                .is_empty()
        );
    }

    #[test]
    fn native_preferred_orders_manual_before_generated() {
        let mut vi_asr = CaptionTrack::generated("vi-orig", Vec::new());
        vi_asr.language_code = "vi".into();
        let listing = TrackListing {
            video_id: "abc".into(),
            tracks: vec![vi_asr, CaptionTrack::manual("vi-VN"), CaptionTrack::manual("vi")],
        };
        let codes: Vec<_> = Strategy::NativePreferred
            .requests(&listing, &Languages::default())
            .into_iter()
            .map(|request| request.code)
            .collect();
        assert_eq!(codes, vec!["vi", "vi-VN", "vi-orig"]);
    }

    #[test]
    fn language_matching_respects_region_boundaries() {
        assert!(language_matches("en", "en"));
        assert!(language_matches("en-GB", "en"));
        assert!(language_matches("EN", "en"));
        assert!(!language_matches("eng", "en"));
        assert!(!language_matches("zh-Hant", "zh-Hans"));
        assert!(language_matches("zh-Hans", "zh-Hans"));
    }

    #[test]
    fn assemble_text_normalizes_breaks() {
        let segments = vec![
            CaptionSegment::new("  first\nline"),
            CaptionSegment::new("second\r\n\nline "),
        ];
        assert_eq!(assemble_text(&segments), "first line second line");
        assert_eq!(assemble_text(&[]), "");
    }
}
