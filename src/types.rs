// src/types.rs
//! Core data model shared by the source adapter, the poll engine and the sinks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Provider post identifier.
///
/// Ordered numerically: ids grow in digit count over time, so comparing the
/// decimal strings would be wrong. Persisted as a decimal string so that no
/// JSON consumer narrows it to a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostId(u64);

impl PostId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for PostId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePostIdError(String);

impl fmt::Display for ParsePostIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid post id: {:?}", self.0)
    }
}

impl std::error::Error for ParsePostIdError {}

impl FromStr for PostId {
    type Err = ParsePostIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParsePostIdError(s.to_string()));
        }
        t.parse::<u64>()
            .map(PostId)
            .map_err(|_| ParsePostIdError(s.to_string()))
    }
}

impl Serialize for PostId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older state files may carry bare numbers; accept both.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Num(n) => Ok(PostId(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub url: String,
    pub preview_url: Option<String>,
}

impl MediaItem {
    /// Image to show in an embed: the photo itself, or a video's preview frame.
    pub fn display_image(&self) -> Option<&str> {
        match self.kind {
            MediaKind::Photo => Some(self.url.as_str()),
            MediaKind::Video => self.preview_url.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub likes: u64,
    pub reshares: u64,
    pub replies: u64,
    pub views: u64,
}

/// A provider post normalized for delivery.
///
/// For a reshare, `id` and `permanent_url` belong to the reshare entry while
/// the display fields (text, author, media, metrics) belong to the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPost {
    pub id: PostId,
    pub text: String,
    pub author_handle: String,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub permanent_url: String,
    pub media: Vec<MediaItem>,
    pub metrics: PostMetrics,
    pub is_reshare: bool,
    pub is_reply: bool,
    pub quoted_post_url: Option<String>,
    pub reshared_by_handle: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NormalizedPost {
    pub fn has_extra_media(&self) -> bool {
        self.media.len() > 1
    }
}

/// Result of one fetch for one handle.
///
/// `Empty` and an empty `Posts` are both healthy outcomes; only `Error`
/// counts towards the failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Posts(Vec<NormalizedPost>),
    Empty,
    Error(String),
}

impl FetchOutcome {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Posts(_) => "posts",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Error(_) => "error",
        }
    }
}

impl<E: fmt::Display> From<Result<Vec<NormalizedPost>, E>> for FetchOutcome {
    fn from(res: Result<Vec<NormalizedPost>, E>) -> Self {
        match res {
            Ok(posts) if posts.is_empty() => FetchOutcome::Empty,
            Ok(posts) => FetchOutcome::Posts(posts),
            Err(e) => FetchOutcome::Error(e.to_string()),
        }
    }
}
