// src/source/normalize.rs
//! X web timeline JSON -> `NormalizedPost`.
//!
//! The payload shape drifts over time, so every field is optional and
//! entries that cannot be read are skipped rather than failing the fetch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SourceError;
use crate::types::{MediaItem, MediaKind, NormalizedPost, PostId, PostMetrics};

/// What the source knows about a tracked account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub user_id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub pinned_ids: Vec<PostId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserResult {
    #[serde(rename = "__typename")]
    pub typename: Option<String>,
    pub rest_id: Option<String>,
    pub legacy: Option<UserLegacy>,
    pub core: Option<UserCore>,
    pub avatar: Option<UserAvatar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserLegacy {
    pub screen_name: Option<String>,
    pub name: Option<String>,
    pub profile_image_url_https: Option<String>,
    pub pinned_tweet_ids_str: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserCore {
    pub screen_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserAvatar {
    pub image_url: Option<String>,
}

impl UserResult {
    fn screen_name(&self) -> Option<&str> {
        self.core
            .as_ref()
            .and_then(|c| c.screen_name.as_deref())
            .or_else(|| self.legacy.as_ref().and_then(|l| l.screen_name.as_deref()))
    }

    fn display_name(&self) -> Option<&str> {
        self.core
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .or_else(|| self.legacy.as_ref().and_then(|l| l.name.as_deref()))
    }

    fn avatar_url(&self) -> Option<&str> {
        self.avatar
            .as_ref()
            .and_then(|a| a.image_url.as_deref())
            .or_else(|| {
                self.legacy
                    .as_ref()
                    .and_then(|l| l.profile_image_url_https.as_deref())
            })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetResult {
    rest_id: Option<String>,
    tweet: Option<Box<TweetResult>>,
    core: Option<TweetCore>,
    legacy: Option<TweetLegacy>,
    views: Option<Views>,
    note_tweet: Option<NoteTweet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetCore {
    user_results: Option<UserResultWrap>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserResultWrap {
    result: Option<UserResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetResultWrap {
    result: Option<Box<TweetResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetLegacy {
    full_text: Option<String>,
    created_at: Option<String>,
    favorite_count: u64,
    retweet_count: u64,
    reply_count: u64,
    in_reply_to_status_id_str: Option<String>,
    quoted_status_id_str: Option<String>,
    retweeted_status_result: Option<TweetResultWrap>,
    extended_entities: Option<Entities>,
    entities: Option<Entities>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entities {
    media: Vec<RawMedia>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMedia {
    #[serde(rename = "type")]
    kind: String,
    media_url_https: Option<String>,
    video_info: Option<VideoInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoInfo {
    variants: Vec<VideoVariant>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoVariant {
    bitrate: Option<u64>,
    content_type: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Views {
    count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteTweet {
    note_tweet_results: Option<NoteTweetResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteTweetResults {
    result: Option<NoteTweetText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteTweetText {
    text: Option<String>,
}

impl TweetResult {
    /// `TweetWithVisibilityResults` wraps the real tweet one level down.
    fn unwrap_visibility(mut self) -> TweetResult {
        if self.legacy.is_none() {
            if let Some(inner) = self.tweet.take() {
                return *inner;
            }
        }
        self
    }

    fn user(&self) -> Option<&UserResult> {
        self.core
            .as_ref()
            .and_then(|c| c.user_results.as_ref())
            .and_then(|u| u.result.as_ref())
    }

    fn text(&self) -> String {
        let long = self
            .note_tweet
            .as_ref()
            .and_then(|n| n.note_tweet_results.as_ref())
            .and_then(|r| r.result.as_ref())
            .and_then(|t| t.text.clone());
        let raw = long
            .or_else(|| self.legacy.as_ref().and_then(|l| l.full_text.clone()))
            .unwrap_or_default();
        html_escape::decode_html_entities(&raw).to_string()
    }

    fn media(&self) -> Vec<MediaItem> {
        let Some(legacy) = self.legacy.as_ref() else {
            return Vec::new();
        };
        let raw = legacy
            .extended_entities
            .as_ref()
            .filter(|e| !e.media.is_empty())
            .or(legacy.entities.as_ref())
            .map(|e| e.media.as_slice())
            .unwrap_or_default();
        raw.iter().filter_map(to_media).collect()
    }

    fn metrics(&self) -> PostMetrics {
        let views = self
            .views
            .as_ref()
            .and_then(|v| v.count.as_deref())
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        match self.legacy.as_ref() {
            Some(l) => PostMetrics {
                likes: l.favorite_count,
                reshares: l.retweet_count,
                replies: l.reply_count,
                views,
            },
            None => PostMetrics {
                views,
                ..PostMetrics::default()
            },
        }
    }
}

fn to_media(m: &RawMedia) -> Option<MediaItem> {
    match m.kind.as_str() {
        "photo" => Some(MediaItem {
            kind: MediaKind::Photo,
            url: m.media_url_https.clone()?,
            preview_url: None,
        }),
        "video" | "animated_gif" => {
            let best = m
                .video_info
                .as_ref()?
                .variants
                .iter()
                .filter(|v| v.content_type.as_deref() == Some("video/mp4"))
                .max_by_key(|v| v.bitrate.unwrap_or(0))?;
            Some(MediaItem {
                kind: MediaKind::Video,
                url: best.url.clone()?,
                preview_url: m.media_url_https.clone(),
            })
        }
        _ => None,
    }
}

/// Parse the provider's `created_at`, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
pub fn parse_created_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Profile info from a `UserByScreenName` response.
pub fn parse_profile(body: &Value, handle: &str) -> Result<ProfileInfo, SourceError> {
    let result = body
        .pointer("/data/user/result")
        .ok_or_else(|| SourceError::UnknownUser(handle.to_string()))?;
    let user: UserResult = serde_json::from_value(result.clone())
        .map_err(|e| SourceError::Payload(format!("user result: {e}")))?;
    if user.typename.as_deref() == Some("UserUnavailable") {
        return Err(SourceError::UnknownUser(handle.to_string()));
    }
    let user_id = user
        .rest_id
        .clone()
        .ok_or_else(|| SourceError::UnknownUser(handle.to_string()))?;
    let pinned_ids = user
        .legacy
        .as_ref()
        .map(|l| {
            l.pinned_tweet_ids_str
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    Ok(ProfileInfo {
        user_id,
        name: user.display_name().map(str::to_string),
        avatar_url: user.avatar_url().map(str::to_string),
        pinned_ids,
    })
}

/// Posts from a `UserTweets` response, pinned and promoted entries removed,
/// oldest first.
pub fn parse_user_tweets(
    body: &Value,
    handle: &str,
    profile: &ProfileInfo,
) -> Result<Vec<NormalizedPost>, SourceError> {
    let instructions = body
        .pointer("/data/user/result/timeline_v2/timeline/instructions")
        .or_else(|| body.pointer("/data/user/result/timeline/timeline/instructions"))
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Payload("timeline instructions missing".into()))?;

    let mut pinned: HashSet<PostId> = profile.pinned_ids.iter().copied().collect();
    let mut raw_tweets: Vec<&Value> = Vec::new();

    for ins in instructions {
        match ins.get("type").and_then(Value::as_str) {
            Some("TimelinePinEntry") => {
                if let Some(id) = ins
                    .pointer("/entry/content/itemContent/tweet_results/result")
                    .and_then(result_id)
                {
                    pinned.insert(id);
                }
            }
            Some("TimelineAddEntries") => {
                let entries = ins.get("entries").and_then(Value::as_array);
                for entry in entries.into_iter().flatten() {
                    collect_entry(entry, &mut raw_tweets);
                }
            }
            _ => {}
        }
    }

    let mut posts: Vec<NormalizedPost> = raw_tweets
        .into_iter()
        .filter_map(|v| serde_json::from_value::<TweetResult>(v.clone()).ok())
        .filter_map(|t| normalize_tweet(t, handle, profile))
        .filter(|p| !pinned.contains(&p.id))
        .collect();

    posts.sort_by_key(|p| p.id);
    posts.dedup_by_key(|p| p.id);
    Ok(posts)
}

fn collect_entry<'a>(entry: &'a Value, out: &mut Vec<&'a Value>) {
    let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");
    if entry_id.starts_with("promoted-") {
        return;
    }
    let Some(content) = entry.get("content") else {
        return;
    };
    if content.pointer("/itemContent/promotedMetadata").is_some() {
        return;
    }
    if let Some(t) = content.pointer("/itemContent/tweet_results/result") {
        out.push(t);
    }
    // Conversation modules (self-threads) nest their tweets one level down.
    if let Some(items) = content.get("items").and_then(Value::as_array) {
        for it in items {
            if let Some(t) = it.pointer("/item/itemContent/tweet_results/result") {
                out.push(t);
            }
        }
    }
}

fn result_id(v: &Value) -> Option<PostId> {
    v.get("rest_id")
        .or_else(|| v.pointer("/tweet/rest_id"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn normalize_tweet(raw: TweetResult, handle: &str, profile: &ProfileInfo) -> Option<NormalizedPost> {
    let tweet = raw.unwrap_visibility();
    let id: PostId = tweet.rest_id.as_deref()?.parse().ok()?;
    let legacy = tweet.legacy.as_ref()?;

    let reshared = legacy
        .retweeted_status_result
        .as_ref()
        .and_then(|w| w.result.as_ref())
        .map(|r| {
            // Borrowed view is enough except for the visibility wrapper.
            match (&r.legacy, &r.tweet) {
                (None, Some(inner)) => inner.as_ref(),
                _ => r.as_ref(),
            }
        });
    let is_reshare = reshared.is_some();
    let actual: &TweetResult = reshared.unwrap_or(&tweet);

    let author = actual.user();
    let author_handle = author
        .and_then(UserResult::screen_name)
        .unwrap_or(handle)
        .to_string();
    let author_display_name = author
        .and_then(UserResult::display_name)
        .or(profile.name.as_deref())
        .unwrap_or(handle)
        .to_string();
    let author_avatar_url = author
        .and_then(UserResult::avatar_url)
        .map(str::to_string)
        .or_else(|| profile.avatar_url.clone());

    let created_at = legacy
        .created_at
        .as_deref()
        .and_then(parse_created_at)
        .unwrap_or_else(Utc::now);

    Some(NormalizedPost {
        id,
        text: actual.text(),
        author_handle,
        author_display_name,
        author_avatar_url,
        permanent_url: format!("https://x.com/{handle}/status/{id}"),
        media: actual.media(),
        metrics: actual.metrics(),
        is_reshare,
        is_reply: legacy.in_reply_to_status_id_str.is_some(),
        quoted_post_url: legacy
            .quoted_status_id_str
            .as_ref()
            .map(|q| format!("https://x.com/i/status/{q}")),
        reshared_by_handle: is_reshare.then(|| handle.to_string()),
        created_at,
    })
}
