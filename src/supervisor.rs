// src/supervisor.rs
//! Per-handle failure counting, alert escalation and periodic auth probes.
//!
//! Counters live in memory only and start at zero on every process start.
//! Alerts are best-effort: a failed alert is logged and never propagated.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};

use crate::config::PollPolicy;
use crate::notify::NotificationSink;
use crate::source::SourceAdapter;
use crate::types::FetchOutcome;

/// Alert when the counter first reaches `threshold`, then again on every
/// exact multiple of `realert_every` past it (`0` disables re-alerts).
pub fn should_alert(consecutive: u32, threshold: u32, realert_every: u32) -> bool {
    if consecutive == threshold {
        return true;
    }
    consecutive > threshold && realert_every > 0 && consecutive % realert_every == 0
}

pub struct Supervisor {
    source: Arc<dyn SourceAdapter>,
    sink: Arc<dyn NotificationSink>,
    alert_threshold: u32,
    realert_every: u32,
    auth_check_every: u64,
    failures: HashMap<String, u32>,
    cycles: u64,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn NotificationSink>,
        policy: &PollPolicy,
    ) -> Self {
        Self {
            source,
            sink,
            alert_threshold: policy.alert_threshold,
            realert_every: policy.realert_every,
            auth_check_every: policy.auth_check_every,
            failures: HashMap::new(),
            cycles: 0,
        }
    }

    pub fn consecutive_failures(&self, handle: &str) -> u32 {
        self.failures.get(handle).copied().unwrap_or(0)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Count an `Error`, reset on anything else. Returns whether an alert
    /// was attempted.
    pub async fn record_outcome(&mut self, handle: &str, outcome: &FetchOutcome) -> bool {
        let reason = match outcome {
            FetchOutcome::Error(msg) => msg,
            FetchOutcome::Posts(_) | FetchOutcome::Empty => {
                if self.failures.insert(handle.to_string(), 0).unwrap_or(0) > 0 {
                    tracing::info!(%handle, "fetching recovered");
                }
                gauge!("relay_consecutive_failures", "handle" => handle.to_string()).set(0.0);
                return false;
            }
        };

        let count = {
            let c = self.failures.entry(handle.to_string()).or_insert(0);
            *c = c.saturating_add(1);
            *c
        };
        gauge!("relay_consecutive_failures", "handle" => handle.to_string()).set(count as f64);

        if !should_alert(count, self.alert_threshold, self.realert_every) {
            return false;
        }

        let title = format!("Polling failing for @{handle}");
        let body = format!("{count} consecutive fetch failures. Last error: {reason}");
        self.alert("fetch_failures", &title, &body).await;
        true
    }

    /// Close a poll cycle; every `auth_check_every` cycles probe the source
    /// session. Returns the probe result when one ran.
    pub async fn finish_cycle(&mut self) -> Option<bool> {
        self.cycles += 1;
        if self.auth_check_every == 0 || self.cycles % self.auth_check_every != 0 {
            return None;
        }

        let valid = self.source.check_auth_still_valid().await;
        if valid {
            tracing::debug!(cycle = self.cycles, source = self.source.name(), "auth check passed");
        } else {
            tracing::warn!(cycle = self.cycles, source = self.source.name(), "auth check failed");
            self.alert(
                "auth_degraded",
                "X authentication degraded",
                "The session was rejected during a periodic check. Re-export cookies from \
                 Cookie-Editor; polling keeps retrying and recovers once credentials are fixed.",
            )
            .await;
        }
        Some(valid)
    }

    async fn alert(&self, kind: &'static str, title: &str, body: &str) {
        counter!("relay_alerts_total", "kind" => kind).increment(1);
        match self.sink.send_alert(title, body).await {
            Ok(()) => tracing::warn!(kind, %title, "alert sent"),
            Err(e) => tracing::error!(kind, %title, error = %e, "failed to send alert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_schedule_threshold_then_multiples() {
        let fired: Vec<u32> = (1..=60).filter(|c| should_alert(*c, 5, 20)).collect();
        assert_eq!(fired, vec![5, 20, 40, 60]);
    }

    #[test]
    fn realert_disabled_fires_once() {
        let fired: Vec<u32> = (1..=100).filter(|c| should_alert(*c, 3, 0)).collect();
        assert_eq!(fired, vec![3]);
    }

    #[test]
    fn multiples_below_threshold_do_not_fire() {
        assert!(!should_alert(2, 5, 2));
        assert!(!should_alert(4, 5, 2));
        assert!(should_alert(6, 5, 2));
    }
}
