// src/error.rs
//! Error taxonomy. Only `ConfigError` and a startup `AuthError` end the
//! process; everything else is handled inside the poll cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::PostId;

/// Missing or invalid settings. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read {path}: {reason}")]
    File { path: PathBuf, reason: String },
    #[error("{path} must contain a non-empty list of handles")]
    NoHandles { path: PathBuf },
    #[error("invalid handle {0:?}: expected 1-15 letters, digits or underscores")]
    BadHandle(String),
    #[error("{path} must contain auth_token and ct0 cookies. Re-export from Cookie-Editor.")]
    MissingCookies { path: PathBuf },
}

/// Credentials rejected or expired.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cookie {0} missing from credential material")]
    MissingCookie(&'static str),
    #[error("failed to authenticate with X, cookies may be expired (re-export from Cookie-Editor): {0}")]
    Rejected(String),
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One fetch for one handle failed. Recovered locally.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source is not authenticated")]
    NotAuthenticated,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected provider payload: {0}")]
    Payload(String),
    #[error("unknown or suspended account @{0}")]
    UnknownUser(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// The notification sink rejected a message.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("discord request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("discord returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("channel {0} not found or is not a text channel")]
    BadChannel(String),
    #[error("channel {channel} belongs to guild {actual:?}, expected {expected}")]
    WrongGuild {
        channel: String,
        expected: String,
        actual: Option<String>,
    },
    #[error("{0}")]
    Rejected(String),
}

/// Persisted state could not be written.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure surfaced from one `poll_handle` call.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("delivery of post {post_id} for @{handle} failed after {delivered} delivered: {source}")]
    Delivery {
        handle: String,
        post_id: PostId,
        delivered: usize,
        #[source]
        source: SinkError,
    },
    #[error("persisting watermark for @{handle} failed: {source}")]
    Persist {
        handle: String,
        #[source]
        source: StateError,
    },
}
