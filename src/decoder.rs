#![forbid(unsafe_code)]

//! Subtitle file decoding and candidate file ranking.
//!
//! Two shapes are understood: yt-dlp's `json3` (an `events` list whose events
//! carry `segs` with `utf8` text) and a flat list of `{ "text": ... }`
//! objects. Anything else is reported as [`DecodeError::UnrecognizedFormat`].

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Extensions the decoder is able to read.
pub const DECODABLE_EXTENSIONS: &[&str] = &["json3", "json"];

/// Decodes raw subtitle content into plain text.
///
/// Event segments are appended without separators (json3 carries its own
/// spacing and line breaks); flat entries are joined with a single space.
/// Only objects count as events, segments or entries: arrays in their place
/// make the whole document unrecognized.
pub fn decode_subtitle(raw: &str) -> Result<String, DecodeError> {
    let document: Value =
        serde_json::from_str(raw).map_err(|_| DecodeError::UnrecognizedFormat)?;

    match document {
        Value::Object(mut root) => match root.remove("events") {
            Some(Value::Array(events)) => decode_events(&events),
            _ => Err(DecodeError::UnrecognizedFormat),
        },
        Value::Array(entries) => decode_flat(&entries),
        _ => Err(DecodeError::UnrecognizedFormat),
    }
}

fn decode_events(events: &[Value]) -> Result<String, DecodeError> {
    let mut buffer = String::new();
    for event in events {
        let event = as_object(event)?;
        let segs = match event.get("segs") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(segs)) => segs,
            Some(_) => return Err(DecodeError::UnrecognizedFormat),
        };
        for seg in segs {
            if let Some(text) = text_field(as_object(seg)?, "utf8")? {
                buffer.push_str(text);
            }
        }
    }
    Ok(buffer)
}

fn decode_flat(entries: &[Value]) -> Result<String, DecodeError> {
    let texts = entries
        .iter()
        .map(|entry| Ok(text_field(as_object(entry)?, "text")?.unwrap_or_default()))
        .collect::<Result<Vec<_>, DecodeError>>()?;
    Ok(texts.join(" "))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, DecodeError> {
    value.as_object().ok_or(DecodeError::UnrecognizedFormat)
}

/// Missing or null text is empty; any other non-string value is rejected.
fn text_field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(DecodeError::UnrecognizedFormat),
    }
}

/// Picks the file to decode among everything yt-dlp wrote for one request.
///
/// Files are ordered by: carries the preferred language marker, carries the
/// fallback language marker, then file name. Only decodable extensions are
/// considered.
pub fn select_subtitle_file(
    candidates: &[PathBuf],
    preferred_language: &str,
    fallback_language: &str,
) -> Option<PathBuf> {
    let preferred_marker = format!(".{preferred_language}.");
    let fallback_marker = format!(".{fallback_language}.");

    candidates
        .iter()
        .filter(|path| is_decodable(path))
        .min_by_key(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                !name.contains(&preferred_marker),
                !name.contains(&fallback_marker),
                name,
            )
        })
        .cloned()
}

fn is_decodable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            DECODABLE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
