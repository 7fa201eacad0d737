// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod supervisor;
pub mod types;

// Scripted source and recording sink; unit tests and the `testing` feature only.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, PollPolicy};
pub use crate::engine::{PollEngine, PollSummary};
pub use crate::notify::{DiscordNotifier, NotificationSink};
pub use crate::scheduler::{shutdown_signal, Runner};
pub use crate::source::{SourceAdapter, XSource};
pub use crate::state::{StoreScope, WatermarkStore};
pub use crate::supervisor::Supervisor;
pub use crate::types::{FetchOutcome, NormalizedPost, PostId};
