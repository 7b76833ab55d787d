//! Inactivity maintenance: the auto-close sweep.
//!
//! A periodic job enumerates every running ticket conductor, queries its
//! state snapshot, and closes tickets that have sat idle in the `open`
//! state past the configured window. Closure goes through the public signal
//! surface (a system message, then a status update), so a swept ticket is
//! indistinguishable from one an operator closed by hand. Overlapping runs
//! are skipped, not queued.

use crate::supportflow::model::{ChatMessage, TicketStatus};
use crate::supportflow::runtime::SupportRuntime;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Outcome of one sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub closed: usize,
    pub closed_ticket_ids: Vec<String>,
    pub inactivity_minutes: u64,
}

/// The auto-close job. Construct once, then either call
/// [`AutoCloseSweeper::run_once`] on your own schedule or let
/// [`AutoCloseSweeper::spawn_periodic`] drive it.
pub struct AutoCloseSweeper {
    runtime: Arc<SupportRuntime>,
    inactivity_minutes: u64,
    closure_message: String,
    overlap_gate: Mutex<()>,
}

impl AutoCloseSweeper {
    /// Build a sweeper from the runtime's configuration.
    pub fn new(runtime: Arc<SupportRuntime>) -> Self {
        let inactivity_minutes = runtime.config().auto_close_inactivity_minutes;
        let closure_message = runtime.config().auto_close_message.clone();
        Self {
            runtime,
            inactivity_minutes,
            closure_message,
            overlap_gate: Mutex::new(()),
        }
    }

    /// Override the inactivity window (builder pattern).
    pub fn with_inactivity_minutes(mut self, minutes: u64) -> Self {
        self.inactivity_minutes = minutes;
        self
    }

    /// Override the closure message (builder pattern).
    pub fn with_closure_message(mut self, message: impl Into<String>) -> Self {
        self.closure_message = message.into();
        self
    }

    /// Evaluate every running ticket once and close the idle ones.
    pub async fn run_once(&self) -> SweepReport {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.inactivity_minutes as i64);
        let mut evaluated = 0usize;
        let mut closed_ticket_ids = Vec::new();

        for handle in self.runtime.running_tickets() {
            evaluated += 1;
            let state = handle.state();

            if state.status != TicketStatus::Open {
                continue;
            }
            if state.last_activity() > cutoff {
                continue;
            }

            log::info!(
                "auto-closing ticket {} (idle since {})",
                state.ticket_id,
                state.last_activity()
            );

            let closed_at = Utc::now();
            let message = ChatMessage::system(&state.ticket_id, &self.closure_message)
                .with_metadata("source", json!("ticket_auto_close"))
                .with_metadata("closed_at", json!(closed_at.to_rfc3339()));
            if let Err(e) = handle.add_message(message) {
                log::warn!("auto-close message for {} not delivered: {}", state.ticket_id, e);
                continue;
            }
            if let Err(e) = handle.update_ticket_status(TicketStatus::Closed.as_str()) {
                log::warn!("auto-close status for {} not delivered: {}", state.ticket_id, e);
                continue;
            }
            closed_ticket_ids.push(state.ticket_id);
        }

        let report = SweepReport {
            evaluated,
            closed: closed_ticket_ids.len(),
            closed_ticket_ids,
            inactivity_minutes: self.inactivity_minutes,
        };
        log::info!(
            "auto-close sweep: evaluated={} closed={}",
            report.evaluated,
            report.closed
        );
        report
    }

    /// Run the sweep on the runtime's configured cadence until the task is
    /// aborted. A tick that fires while the previous sweep is still running
    /// is skipped.
    pub fn spawn_periodic(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.runtime.config().auto_close_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.overlap_gate.try_lock() {
                    Ok(_guard) => {
                        self.run_once().await;
                    }
                    Err(_) => log::warn!("auto-close sweep still running; skipping this tick"),
                }
            }
        })
    }
}
