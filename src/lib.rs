#![forbid(unsafe_code)]

//! Shared building blocks for the transcript binaries.
//!
//! `backend` serves transcripts over HTTP and `fetch_transcript` resolves a
//! single video from the command line; both go through [`resolver`] and the
//! yt-dlp backed [`source::YtDlpSource`].

pub mod classify;
pub mod config;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod security;
pub mod source;
