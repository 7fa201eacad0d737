// src/scheduler.rs
//! Drives the poll engine: optional startup offset, then cycles over the
//! handle list with a stagger between handles and a fixed sleep between
//! cycles. Cycles never overlap. Cancellation is honoured at every await
//! point; on the way out the store is flushed and the sink closed.

use std::time::Duration;

use metrics::gauge;
use tokio_util::sync::CancellationToken;

use crate::config::PollPolicy;
use crate::engine::PollEngine;

pub struct Runner {
    engine: PollEngine,
    handles: Vec<String>,
    interval: Duration,
    startup_offset: Duration,
    stagger: Duration,
}

impl Runner {
    pub fn new(engine: PollEngine, handles: Vec<String>, policy: &PollPolicy) -> Self {
        Self {
            engine,
            handles,
            interval: policy.interval,
            startup_offset: policy.startup_offset,
            stagger: policy.stagger,
        }
    }

    pub fn engine(&self) -> &PollEngine {
        &self.engine
    }

    /// Run until `shutdown` fires, then flush and close. Hands the engine
    /// back so callers can inspect final state.
    pub async fn run(mut self, shutdown: CancellationToken) -> PollEngine {
        tracing::info!(
            handles = ?self.handles,
            interval_ms = self.interval.as_millis() as u64,
            "starting poll loop"
        );

        if !self.startup_offset.is_zero() {
            tracing::info!(
                offset_ms = self.startup_offset.as_millis() as u64,
                "delaying first poll"
            );
            if !sleep_or_cancel(self.startup_offset, &shutdown).await {
                return self.stop().await;
            }
        }

        loop {
            if !self.run_cycle(&shutdown).await {
                break;
            }
            if !sleep_or_cancel(self.interval, &shutdown).await {
                break;
            }
        }
        self.stop().await
    }

    /// One pass over every handle in list order. Returns `false` when the
    /// pass was cut short by cancellation.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> bool {
        let last = self.handles.len().saturating_sub(1);
        for (i, handle) in self.handles.iter().enumerate() {
            let res = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                res = self.engine.poll_handle(handle) => res,
            };
            match res {
                Ok(summary) => tracing::debug!(
                    %handle,
                    outcome = summary.outcome,
                    delivered = summary.delivered.len(),
                    "handle polled"
                ),
                Err(e) => tracing::warn!(%handle, error = %e, "poll incomplete"),
            }

            if i < last && !sleep_or_cancel(self.stagger, shutdown).await {
                return false;
            }
        }

        let probe = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return false,
            probe = self.engine.finish_cycle() => probe,
        };
        if let Some(valid) = probe {
            tracing::info!(auth_valid = valid, "periodic auth check");
        }
        gauge!("relay_last_cycle_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        true
    }

    async fn stop(self) -> PollEngine {
        tracing::info!("shutting down, flushing state");
        if let Err(e) = self.engine.flush() {
            tracing::error!(error = %e, "final state flush failed");
        }
        self.engine.close().await;
        self.engine
    }
}

/// Sleep for `d` unless cancelled first. Returns `false` on cancellation.
async fn sleep_or_cancel(d: Duration, shutdown: &CancellationToken) -> bool {
    if d.is_zero() {
        return !shutdown.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

/// Wait for SIGINT or SIGTERM (Ctrl-C elsewhere).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(i), Ok(t)) => (i, t),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "unix signal handlers unavailable, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!(signal = "SIGINT", "signal received"),
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "signal received"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!(signal = "ctrl-c", "signal received");
    }
}
