// src/testing.rs
//! Test doubles for the source and sink boundaries.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use crate::config::Credentials;
use crate::error::{AuthError, SinkError, SourceError};
use crate::notify::NotificationSink;
use crate::source::SourceAdapter;
use crate::types::{NormalizedPost, PostId, PostMetrics};

/// Minimal post with the given id.
pub fn post(id: u64) -> NormalizedPost {
    NormalizedPost {
        id: PostId::new(id),
        text: format!("post {id}"),
        author_handle: "tracked".into(),
        author_display_name: "Tracked".into(),
        author_avatar_url: None,
        permanent_url: format!("https://x.com/tracked/status/{id}"),
        media: Vec::new(),
        metrics: PostMetrics::default(),
        is_reshare: false,
        is_reply: false,
        quoted_post_url: None,
        reshared_by_handle: None,
        created_at: Utc
            .timestamp_opt(1_700_000_000 + id as i64, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

pub fn posts(ids: &[u64]) -> Vec<NormalizedPost> {
    ids.iter().copied().map(post).collect()
}

/// Scripted fetch result for one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Posts(Vec<NormalizedPost>),
    Fail(String),
    /// Never completes; exercises the fetch timeout.
    Hang,
}

/// Source that replays scripted results per handle, in order.
/// An exhausted script yields an empty list.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    auth_ok: Mutex<bool>,
    calls: Mutex<Vec<(String, Option<PostId>)>>,
    auth_checks: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            auth_ok: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn push(&self, handle: &str, step: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(handle.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn push_posts(&self, handle: &str, ids: &[u64]) {
        self.push(handle, Scripted::Posts(posts(ids)));
    }

    pub fn push_error(&self, handle: &str, msg: &str) {
        self.push(handle, Scripted::Fail(msg.to_string()));
    }

    pub fn set_auth_ok(&self, ok: bool) {
        *self.auth_ok.lock().unwrap() = ok;
    }

    /// `(handle, since)` for every fetch, in call order.
    pub fn calls(&self) -> Vec<(String, Option<PostId>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn auth_checks(&self) -> usize {
        *self.auth_checks.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn authenticate(&self, _credentials: &Credentials) -> Result<(), AuthError> {
        if *self.auth_ok.lock().unwrap() {
            Ok(())
        } else {
            Err(AuthError::Rejected("scripted rejection".into()))
        }
    }

    async fn fetch_recent(
        &self,
        handle: &str,
        since: Option<PostId>,
    ) -> Result<Vec<NormalizedPost>, SourceError> {
        self.calls.lock().unwrap().push((handle.to_string(), since));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(handle)
            .and_then(VecDeque::pop_front);
        match step {
            None => Ok(Vec::new()),
            Some(Scripted::Posts(p)) => Ok(p),
            Some(Scripted::Fail(msg)) => Err(SourceError::Payload(msg)),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }

    async fn check_auth_still_valid(&self) -> bool {
        *self.auth_checks.lock().unwrap() += 1;
        *self.auth_ok.lock().unwrap()
    }
}

/// What the recording sink saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Post(PostId),
    ExtraMedia(PostId),
    Alert { title: String, body: String },
}

/// Sink that records every call and can be told to reject specific posts.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    fail_posts: Mutex<HashSet<PostId>>,
    fail_extra_media: Mutex<HashSet<PostId>>,
    fail_alerts: Mutex<bool>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_post(&self, id: u64) {
        self.fail_posts.lock().unwrap().insert(PostId::new(id));
    }

    pub fn fail_extra_media(&self, id: u64) {
        self.fail_extra_media.lock().unwrap().insert(PostId::new(id));
    }

    pub fn heal(&self) {
        self.fail_posts.lock().unwrap().clear();
        self.fail_extra_media.lock().unwrap().clear();
    }

    pub fn fail_alerts(&self, fail: bool) {
        *self.fail_alerts.lock().unwrap() = fail;
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Ids of successfully delivered primary cards, in order.
    pub fn delivered(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Post(id) => Some(id.get()),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Alert { title, body } => Some((title, body)),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver_post(&self, post: &NormalizedPost) -> Result<(), SinkError> {
        if self.fail_posts.lock().unwrap().contains(&post.id) {
            return Err(SinkError::Rejected(format!("scripted failure for {}", post.id)));
        }
        self.events.lock().unwrap().push(SinkEvent::Post(post.id));
        Ok(())
    }

    async fn deliver_extra_media(&self, post: &NormalizedPost) -> Result<(), SinkError> {
        if self.fail_extra_media.lock().unwrap().contains(&post.id) {
            return Err(SinkError::Rejected(format!("scripted media failure for {}", post.id)));
        }
        self.events.lock().unwrap().push(SinkEvent::ExtraMedia(post.id));
        Ok(())
    }

    async fn send_alert(&self, title: &str, body: &str) -> Result<(), SinkError> {
        if *self.fail_alerts.lock().unwrap() {
            return Err(SinkError::Rejected("scripted alert failure".into()));
        }
        self.events.lock().unwrap().push(SinkEvent::Alert {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}
