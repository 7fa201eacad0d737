// src/source/x.rs
//! X web GraphQL adapter authenticated with browser session cookies.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use super::normalize::{parse_profile, parse_user_tweets, ProfileInfo};
use super::SourceAdapter;
use crate::config::Credentials;
use crate::error::{AuthError, SourceError};
use crate::types::{NormalizedPost, PostId};

pub const X_GRAPHQL: &str = "https://x.com/i/api/graphql";
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

// Public bearer token shipped with the x.com web client.
const WEB_BEARER: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

// X rotates these; override with X_USER_BY_SCREEN_NAME_QID / X_USER_TWEETS_QID.
const DEFAULT_USER_BY_SCREEN_NAME_QID: &str = "xmU6X_CKVnQ5lSrCbAmJsg";
const DEFAULT_USER_TWEETS_QID: &str = "E3opETHurmVJflFsUBVuUQ";

// Account used for the auth probe.
const PROBE_HANDLE: &str = "x";

// Error pages can be large HTML documents; keep the head for logs.
const ERROR_BODY_CHARS: usize = 300;

/// First `max` characters of `s`, cut on a char boundary.
fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn features() -> Value {
    json!({
        "hidden_profile_subscriptions_enabled": true,
        "rweb_tipjar_consumption_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "subscriptions_verification_info_is_identity_verified_enabled": true,
        "subscriptions_verification_info_verified_since_enabled": true,
        "highlights_tweets_tab_ui_enabled": true,
        "responsive_web_twitter_article_notes_tab_enabled": true,
        "subscriptions_feature_can_gift_premium": true,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "articles_preview_enabled": true,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "rweb_video_timestamps_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_enhance_cards_enabled": false
    })
}

#[derive(Clone)]
struct Session {
    cookie_header: String,
    csrf_token: String,
}

struct CachedProfile {
    info: ProfileInfo,
    expires_at: Instant,
}

pub struct XSource {
    http: Client,
    api_base: String,
    user_by_screen_name_qid: String,
    user_tweets_qid: String,
    fetch_count: u32,
    session: RwLock<Option<Session>>,
    profiles: Mutex<HashMap<String, CachedProfile>>,
}

impl XSource {
    pub fn new(fetch_count: u32) -> Result<Self, SourceError> {
        let http = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: X_GRAPHQL.to_string(),
            user_by_screen_name_qid: std::env::var("X_USER_BY_SCREEN_NAME_QID")
                .unwrap_or_else(|_| DEFAULT_USER_BY_SCREEN_NAME_QID.to_string()),
            user_tweets_qid: std::env::var("X_USER_TWEETS_QID")
                .unwrap_or_else(|_| DEFAULT_USER_TWEETS_QID.to_string()),
            fetch_count: fetch_count.clamp(1, 100),
            session: RwLock::new(None),
            profiles: Mutex::new(HashMap::new()),
        })
    }

    /// Point at a different GraphQL root (tests use a local fake).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn graphql(&self, qid: &str, operation: &str, variables: Value) -> Result<Value, SourceError> {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(SourceError::NotAuthenticated)?;

        let url = format!("{}/{}/{}", self.api_base, qid, operation);
        let rsp = self
            .http
            .get(url)
            .query(&[
                ("variables", variables.to_string()),
                ("features", features().to_string()),
            ])
            .bearer_auth(WEB_BEARER)
            .header("cookie", &session.cookie_header)
            .header("x-csrf-token", &session.csrf_token)
            .header("x-twitter-auth-type", "OAuth2Session")
            .header("x-twitter-active-user", "yes")
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: clip(&body, ERROR_BODY_CHARS),
            });
        }
        Ok(rsp.json::<Value>().await?)
    }

    async fn lookup_profile(&self, handle: &str) -> Result<ProfileInfo, SourceError> {
        let vars = json!({ "screen_name": handle, "withSafetyModeUserFields": true });
        let body = self
            .graphql(&self.user_by_screen_name_qid, "UserByScreenName", vars)
            .await?;
        parse_profile(&body, handle)
    }

    /// Profile lookups are cached per handle for `PROFILE_CACHE_TTL`.
    async fn profile(&self, handle: &str) -> Result<ProfileInfo, SourceError> {
        {
            let cache = self.profiles.lock().await;
            if let Some(c) = cache.get(handle) {
                if Instant::now() < c.expires_at {
                    return Ok(c.info.clone());
                }
            }
        }
        let info = self.lookup_profile(handle).await?;
        self.profiles.lock().await.insert(
            handle.to_string(),
            CachedProfile {
                info: info.clone(),
                expires_at: Instant::now() + PROFILE_CACHE_TTL,
            },
        );
        Ok(info)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for XSource {
    fn name(&self) -> &'static str {
        "x"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if credentials.get("auth_token").is_none() {
            return Err(AuthError::MissingCookie("auth_token"));
        }
        let csrf = credentials
            .get("ct0")
            .ok_or(AuthError::MissingCookie("ct0"))?;

        *self.session.write().await = Some(Session {
            cookie_header: credentials.cookie_header(),
            csrf_token: csrf.to_string(),
        });

        match self.lookup_profile(PROBE_HANDLE).await {
            Ok(_) => {
                tracing::info!("authenticated with x via cookies");
                Ok(())
            }
            Err(e) => {
                *self.session.write().await = None;
                Err(AuthError::Rejected(e.to_string()))
            }
        }
    }

    async fn fetch_recent(
        &self,
        handle: &str,
        since: Option<PostId>,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        let profile = self.profile(handle).await?;
        let vars = json!({
            "userId": profile.user_id,
            "count": self.fetch_count,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": false,
            "withVoice": true,
            "withV2Timeline": true,
        });
        let body = self.graphql(&self.user_tweets_qid, "UserTweets", vars).await?;

        let mut posts = parse_user_tweets(&body, handle, &profile)?;
        if let Some(since) = since {
            posts.retain(|p| p.id > since);
        }
        tracing::debug!(%handle, count = posts.len(), "fetched posts");
        Ok(posts)
    }

    async fn check_auth_still_valid(&self) -> bool {
        match self.lookup_profile(PROBE_HANDLE).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "x auth probe failed");
                false
            }
        }
    }
}
