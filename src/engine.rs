//! # Poll Engine
//! Turns "what is new for this handle since last time" into "what was
//! delivered and recorded".
//!
//! Policy: on first sight of a handle only its newest post is delivered (no
//! backlog flood). Afterwards every post strictly newer than the watermark is
//! delivered oldest-first. The watermark moves only past posts the sink
//! accepted, and the first rejection stops the handle for this cycle so
//! nothing is skipped or delivered out of order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::config::PollPolicy;
use crate::error::{PollError, SinkError, SourceError, StateError};
use crate::notify::NotificationSink;
use crate::source::SourceAdapter;
use crate::state::WatermarkStore;
use crate::supervisor::Supervisor;
use crate::types::{FetchOutcome, NormalizedPost, PostId};

/// Posts to deliver, oldest first.
///
/// `watermark == None` selects only the post with the greatest id.
/// Otherwise ids `<= watermark` are dropped and duplicates collapse.
pub fn select_unseen(mut posts: Vec<NormalizedPost>, watermark: Option<PostId>) -> Vec<NormalizedPost> {
    match watermark {
        None => posts
            .into_iter()
            .max_by_key(|p| p.id)
            .into_iter()
            .collect(),
        Some(w) => {
            posts.retain(|p| p.id > w);
            posts.sort_by_key(|p| p.id);
            posts.dedup_by_key(|p| p.id);
            posts
        }
    }
}

/// What one `poll_handle` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub handle: String,
    pub outcome: &'static str,
    pub delivered: Vec<PostId>,
    pub watermark: Option<PostId>,
}

pub struct PollEngine {
    source: Arc<dyn SourceAdapter>,
    sink: Arc<dyn NotificationSink>,
    store: WatermarkStore,
    supervisor: Supervisor,
    fetch_timeout: Duration,
}

impl PollEngine {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn NotificationSink>,
        store: WatermarkStore,
        policy: &PollPolicy,
    ) -> Self {
        let supervisor = Supervisor::new(source.clone(), sink.clone(), policy);
        Self {
            source,
            sink,
            store,
            supervisor,
            fetch_timeout: policy.fetch_timeout,
        }
    }

    pub fn store(&self) -> &WatermarkStore {
        &self.store
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// One fetch bounded by the configured timeout.
    pub async fn fetch(&self, handle: &str, since: Option<PostId>) -> FetchOutcome {
        let t0 = Instant::now();
        let res = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_recent(handle, since)).await {
            Ok(res) => res,
            Err(_) => Err(SourceError::Timeout(self.fetch_timeout)),
        };
        histogram!("relay_fetch_ms", "handle" => handle.to_string())
            .record(t0.elapsed().as_secs_f64() * 1000.0);

        let outcome = FetchOutcome::from(res);
        counter!("relay_fetch_total", "handle" => handle.to_string(), "outcome" => outcome.label())
            .increment(1);
        outcome
    }

    pub async fn poll_handle(&mut self, handle: &str) -> Result<PollSummary, PollError> {
        tracing::info!(%handle, "polling");
        let since = self.store.get(handle);
        let outcome = self.fetch(handle, since).await;
        self.supervisor.record_outcome(handle, &outcome).await;

        let mut summary = PollSummary {
            handle: handle.to_string(),
            outcome: outcome.label(),
            delivered: Vec::new(),
            watermark: since,
        };

        let fetched = match outcome {
            FetchOutcome::Posts(p) => p,
            FetchOutcome::Empty => {
                tracing::info!(%handle, "no posts found");
                return Ok(summary);
            }
            FetchOutcome::Error(reason) => {
                tracing::warn!(
                    %handle,
                    error = %reason,
                    consecutive = self.supervisor.consecutive_failures(handle),
                    "fetch failed"
                );
                return Ok(summary);
            }
        };

        let pending = select_unseen(fetched, since);
        if since.is_none() {
            if let Some(p) = pending.first() {
                tracing::info!(%handle, post_id = %p.id, "first run, sending latest post only");
            }
        }

        let mut failure: Option<(PostId, SinkError)> = None;
        for post in &pending {
            match self.deliver(post).await {
                Ok(()) => {
                    self.store.advance(handle, post.id);
                    summary.delivered.push(post.id);
                    counter!("relay_posts_delivered_total", "handle" => handle.to_string()).increment(1);
                    tracing::info!(%handle, post_id = %post.id, author = %post.author_handle, "post delivered");
                }
                Err(e) => {
                    counter!("relay_delivery_errors_total", "handle" => handle.to_string()).increment(1);
                    tracing::warn!(%handle, post_id = %post.id, error = %e, "delivery failed, holding remaining posts");
                    failure = Some((post.id, e));
                    break;
                }
            }
        }
        summary.watermark = self.store.get(handle);

        let persisted = if summary.delivered.is_empty() {
            Ok(())
        } else {
            self.persist()
        };

        if let Some((post_id, source)) = failure {
            return Err(PollError::Delivery {
                handle: handle.to_string(),
                post_id,
                delivered: summary.delivered.len(),
                source,
            });
        }
        persisted.map_err(|source| PollError::Persist {
            handle: handle.to_string(),
            source,
        })?;
        Ok(summary)
    }

    /// Primary card, then the extra media message when there is one. Both
    /// must succeed for the post to count as delivered.
    async fn deliver(&self, post: &NormalizedPost) -> Result<(), SinkError> {
        self.sink.deliver_post(post).await?;
        if post.has_extra_media() {
            self.sink.deliver_extra_media(post).await?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), StateError> {
        self.store.persist().inspect_err(|e| {
            counter!("relay_state_persist_errors_total").increment(1);
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist watermark, posts may be re-delivered after restart"
            );
        })
    }

    /// End of a poll cycle; runs the periodic auth probe when due.
    pub async fn finish_cycle(&mut self) -> Option<bool> {
        self.supervisor.finish_cycle().await
    }

    /// Best-effort final write.
    pub fn flush(&self) -> Result<(), StateError> {
        self.persist()
    }

    pub async fn close(&self) {
        self.sink.close().await;
    }
}
