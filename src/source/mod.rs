// src/source/mod.rs
//! Source adapter boundary.
//!
//! An adapter authenticates once, then yields normalized posts for a handle.
//! Pinned entries never reach the caller. Posts come back oldest-first, but
//! the poll engine re-sorts anyway and must not rely on it.

pub mod normalize;
pub mod x;

use crate::config::Credentials;
use crate::error::{AuthError, SourceError};
use crate::types::{NormalizedPost, PostId};

pub use x::XSource;

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn authenticate(&self, credentials: &Credentials) -> Result<(), AuthError>;

    /// Recent posts for `handle`. Adapters may drop posts `<= since` early.
    async fn fetch_recent(
        &self,
        handle: &str,
        since: Option<PostId>,
    ) -> Result<Vec<NormalizedPost>, SourceError>;

    /// Cheap probe of the session established by `authenticate`.
    async fn check_auth_still_valid(&self) -> bool;
}
