#![forbid(unsafe_code)]

//! Command-line helper that resolves one video the same way the backend does
//! and prints the JSON body `/transcript/{video_id}` would return.
//!
//! Handy for checking a yt-dlp upgrade or a cookies file without starting the
//! server.

use std::{env, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use tracing::error;
use transcript_api::config::{SettingsOverrides, resolve_settings};
use transcript_api::logging::init_tracing;
use transcript_api::resolver::{Languages, TranscriptPayload, resolve};
use transcript_api::security::{ensure_not_root, validate_video_id};
use transcript_api::source::YtDlpSource;

const USAGE: &str = "Usage: fetch_transcript [--lang <code>] [--fallback <code>] [--yt-dlp <path>] [--timeout <secs>] [--env-file <path>] <video_id>";

#[derive(Debug, Clone, Default)]
struct FetchArgs {
    video_id: String,
    lang: Option<String>,
    fallback: Option<String>,
    overrides: SettingsOverrides,
}

impl FetchArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = FetchArgs::default();
        let mut video_id: Option<String> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if arg == "--" {
                for value in args {
                    Self::set_video_id(&mut video_id, value)?;
                }
                break;
            }

            match arg.as_str() {
                "--lang" | "--fallback" | "--yt-dlp" | "--timeout" | "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{arg} requires a value"))?;
                    parsed.apply(&arg, value)?;
                }
                _ if arg.starts_with("--") && arg.contains('=') => {
                    let (flag, value) = arg.split_once('=').unwrap_or((arg.as_str(), ""));
                    parsed.apply(flag, value.to_string())?;
                }
                _ if arg.starts_with('-') => {
                    bail!("unknown argument: {arg}\n{USAGE}");
                }
                _ => Self::set_video_id(&mut video_id, arg)?,
            }
        }

        let Some(video_id) = video_id else {
            bail!(USAGE);
        };
        parsed.video_id = video_id;
        Ok(parsed)
    }

    fn apply(&mut self, flag: &str, value: String) -> Result<()> {
        match flag {
            "--lang" => self.lang = Some(value),
            "--fallback" => self.fallback = Some(value),
            "--yt-dlp" => self.overrides.yt_dlp_bin = Some(PathBuf::from(value)),
            "--timeout" => {
                self.overrides.timeout_secs = Some(
                    value
                        .parse::<u64>()
                        .context("expected the timeout in whole seconds")?,
                )
            }
            "--env-file" => self.overrides.env_path = Some(PathBuf::from(value)),
            _ => bail!("unknown argument: {flag}\n{USAGE}"),
        }
        Ok(())
    }

    fn set_video_id(target: &mut Option<String>, value: String) -> Result<()> {
        if target.is_some() {
            bail!("video id specified multiple times");
        }
        *target = Some(value);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("transcript_api=warn,fetch_transcript=info");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    ensure_not_root("fetch_transcript")?;

    let FetchArgs {
        video_id,
        lang,
        fallback,
        overrides,
    } = FetchArgs::parse()?;
    validate_video_id(&video_id)?;

    let settings = resolve_settings(overrides)?;
    let languages = Languages::new(
        lang.unwrap_or(settings.preferred_language),
        fallback.unwrap_or(settings.fallback_language),
    );
    let source = YtDlpSource::new(settings.yt_dlp_bin, settings.timeout)
        .with_cookies(settings.cookies)
        .with_scratch_root(settings.scratch_root)
        .with_fallback_language(languages.fallback.clone());

    let result = resolve(&source, &video_id, &languages)
        .await
        .with_context(|| format!("resolving transcript for {video_id}"))?;
    let payload = TranscriptPayload::new(video_id, result);
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("serializing transcript")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_video_id_and_languages() {
        let args = FetchArgs::from_slice(&["--lang", "ja", "--fallback=ko", "abc123"]).unwrap();
        assert_eq!(args.video_id, "abc123");
        assert_eq!(args.lang.as_deref(), Some("ja"));
        assert_eq!(args.fallback.as_deref(), Some("ko"));
    }

    #[test]
    fn parses_settings_overrides() {
        let args = FetchArgs::from_slice(&[
            "--yt-dlp",
            "/opt/yt-dlp",
            "--timeout=5",
            "--env-file",
            "/etc/transcript.env",
            "abc",
        ])
        .unwrap();
        assert_eq!(args.overrides.yt_dlp_bin, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(args.overrides.timeout_secs, Some(5));
        assert_eq!(
            args.overrides.env_path,
            Some(PathBuf::from("/etc/transcript.env"))
        );
    }

    #[test]
    fn double_dash_allows_dash_prefixed_values() {
        let args = FetchArgs::from_slice(&["--", "abc"]).unwrap();
        assert_eq!(args.video_id, "abc");
    }

    #[test]
    fn rejects_missing_duplicate_and_unknown() {
        assert!(FetchArgs::from_slice(&[]).unwrap_err().to_string().contains("Usage"));
        assert!(
            FetchArgs::from_slice(&["a", "b"])
                .unwrap_err()
                .to_string()
                .contains("multiple times")
        );
        assert!(
            FetchArgs::from_slice(&["--verbose", "abc"])
                .unwrap_err()
                .to_string()
                .contains("unknown argument")
        );
        assert!(FetchArgs::from_slice(&["--timeout", "soon", "abc"]).is_err());
    }
}
