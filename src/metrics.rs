//! Engine counters with Prometheus text export

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::games::types::GameOutcome;

/// Process-wide counters. Clones share the same atomics.
#[derive(Clone)]
pub struct MetricsRegistry {
    started: Instant,

    pub sessions_started: Arc<AtomicU64>,
    pub wins_total: Arc<AtomicU64>,
    pub losses_total: Arc<AtomicU64>,

    pub crash_rounds_started: Arc<AtomicU64>,
    pub crash_ticks_total: Arc<AtomicU64>,
    pub crash_grace_rejects: Arc<AtomicU64>,
    pub settlement_retries: Arc<AtomicU64>,

    pub bonuses_claimed: Arc<AtomicU64>,
    pub rollbacks_total: Arc<AtomicU64>,
    pub resets_total: Arc<AtomicU64>,

    pub http_requests_total: Arc<AtomicU64>,
    pub http_errors_total: Arc<AtomicU64>,
    pub websocket_connections_active: Arc<AtomicU64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sessions_started: Arc::new(AtomicU64::new(0)),
            wins_total: Arc::new(AtomicU64::new(0)),
            losses_total: Arc::new(AtomicU64::new(0)),
            crash_rounds_started: Arc::new(AtomicU64::new(0)),
            crash_ticks_total: Arc::new(AtomicU64::new(0)),
            crash_grace_rejects: Arc::new(AtomicU64::new(0)),
            settlement_retries: Arc::new(AtomicU64::new(0)),
            bonuses_claimed: Arc::new(AtomicU64::new(0)),
            rollbacks_total: Arc::new(AtomicU64::new(0)),
            resets_total: Arc::new(AtomicU64::new(0)),
            http_requests_total: Arc::new(AtomicU64::new(0)),
            http_errors_total: Arc::new(AtomicU64::new(0)),
            websocket_connections_active: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution(&self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Win => Self::incr(&self.wins_total),
            GameOutcome::Loss => Self::incr(&self.losses_total),
        }
    }

    pub fn record_http_request(&self, success: bool) {
        Self::incr(&self.http_requests_total);
        if !success {
            Self::incr(&self.http_errors_total);
        }
    }

    pub fn websocket_opened(&self) {
        Self::incr(&self.websocket_connections_active);
    }

    pub fn websocket_closed(&self) {
        let _ = self
            .websocket_connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn to_prometheus_format(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 12] = [
            ("stakehouse_sessions_started_total", "Turn-based sessions started", &self.sessions_started),
            ("stakehouse_wins_total", "Rounds resolved as a win", &self.wins_total),
            ("stakehouse_losses_total", "Rounds resolved as a loss", &self.losses_total),
            ("stakehouse_crash_rounds_started_total", "Crash rounds started", &self.crash_rounds_started),
            ("stakehouse_crash_ticks_total", "Crash ticks processed", &self.crash_ticks_total),
            ("stakehouse_crash_grace_rejects_total", "Cash-outs rejected inside the grace window", &self.crash_grace_rejects),
            ("stakehouse_settlement_retries_total", "Crash settlements retried after a store failure", &self.settlement_retries),
            ("stakehouse_bonuses_claimed_total", "Hourly, wheel and promo claims credited", &self.bonuses_claimed),
            ("stakehouse_rollbacks_total", "Rollback toggles applied", &self.rollbacks_total),
            ("stakehouse_account_resets_total", "Accounts reset", &self.resets_total),
            ("stakehouse_http_requests_total", "HTTP requests served", &self.http_requests_total),
            ("stakehouse_http_errors_total", "HTTP requests answered with an error", &self.http_errors_total),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "# HELP stakehouse_websocket_connections_active Open crash event streams\n\
             # TYPE stakehouse_websocket_connections_active gauge\n\
             stakehouse_websocket_connections_active {}\n\n",
            self.websocket_connections_active.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "# HELP stakehouse_uptime_seconds Seconds since the engine started\n\
             # TYPE stakehouse_uptime_seconds gauge\n\
             stakehouse_uptime_seconds {:.0}\n",
            self.started.elapsed().as_secs_f64()
        ));
        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
