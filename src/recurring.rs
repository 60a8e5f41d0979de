//! Recurring-order processing: turns due subscriptions into real orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::models::*;
use crate::orders::{place_order, PlaceOrder};
use crate::pricing::PricingConfig;
use crate::repo::{RecurringRepo, RecurringRun, Repo, RepoError, UserRepo};

/// Consecutive failed runs after which a subscription is paused.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub fn next_occurrence(freq: Frequency, from: DateTime<Utc>) -> DateTime<Utc> {
    match freq {
        Frequency::Weekly => from + chrono::Duration::days(7),
        Frequency::Biweekly => from + chrono::Duration::days(14),
        // clamps to the last day of shorter months
        Frequency::Monthly => from.checked_add_months(Months::new(1)).unwrap_or(from + chrono::Duration::days(30)),
    }
}

/// First occurrence strictly after `now`; missed periods are skipped.
pub fn advance_past(freq: Frequency, mut at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    while at <= now {
        at = next_occurrence(freq, at);
    }
    at
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecurringFailure {
    pub recurring_order_id: Id,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RecurringReport {
    pub processed: usize,
    /// Ids of the orders created in this run.
    pub created: Vec<Id>,
    pub failed: Vec<RecurringFailure>,
}

async fn run_one(repo: &dyn Repo, pricing: &PricingConfig, rec: &RecurringOrder) -> Result<Order, String> {
    match repo.get_user(rec.user_id).await {
        Ok(u) if u.active => {}
        Ok(_) => return Err("customer account is inactive".into()),
        Err(RepoError::NotFound) => return Err("customer no longer exists".into()),
        Err(e) => return Err(e.to_string()),
    }
    let req = PlaceOrder {
        user_id: rec.user_id,
        items: rec.items.clone(),
        shipping_address: rec.shipping_address.clone(),
        payment_method: rec.payment_method,
        notes: Some(format!("recurring order #{}", rec.id)),
        recurring_order_id: Some(rec.id),
    };
    place_order(repo, pricing, req).await.map_err(|e| e.to_string())
}

/// Processes every active subscription due at `now`. Each one is claimed
/// before its order is placed, so a concurrent batch or a customer change
/// in between skips it instead of ordering twice. A failure is recorded on
/// that subscription and never stops the rest of the batch.
pub async fn process_due(repo: &dyn Repo, pricing: &PricingConfig, now: DateTime<Utc>) -> Result<RecurringReport, RepoError> {
    let due = repo.list_due_recurring(now).await?;
    let mut report = RecurringReport::default();
    for listed in due {
        let next_run_at = advance_past(listed.frequency, listed.next_run_at, now);
        let rec = match repo.claim_recurring(listed.id, listed.next_run_at, next_run_at).await {
            Ok(Some(rec)) => rec,
            Ok(None) | Err(RepoError::NotFound) => {
                debug!(recurring_order_id = listed.id, "no longer due; skipped");
                continue;
            }
            Err(e) => {
                error!(recurring_order_id = listed.id, "failed to claim recurring order: {e}");
                continue;
            }
        };
        report.processed += 1;
        let result = match run_one(repo, pricing, &rec).await {
            Ok(order) => {
                report.created.push(order.id);
                Ok(order.id)
            }
            Err(error) => {
                warn!(recurring_order_id = rec.id, "recurring order failed: {error}");
                report.failed.push(RecurringFailure { recurring_order_id: rec.id, error: error.clone() });
                Err(error)
            }
        };
        let run = RecurringRun { ran_at: now, result, pause_after: MAX_CONSECUTIVE_FAILURES };
        match repo.record_recurring_run(rec.id, run).await {
            Ok(updated) if updated.status == RecurringStatus::Paused && updated.failure_count >= MAX_CONSECUTIVE_FAILURES => {
                warn!(recurring_order_id = rec.id, "paused after {} consecutive failures", updated.failure_count);
            }
            Ok(_) => {}
            // the schedule already moved on; only the run bookkeeping is lost
            Err(e) => error!(recurring_order_id = rec.id, "failed to record recurring run: {e}"),
        }
    }
    metrics::counter!("freshpick_recurring_runs_total", report.processed as u64);
    if report.processed > 0 {
        info!(processed = report.processed, created = report.created.len(), failed = report.failed.len(), "recurring batch finished");
    }
    Ok(report)
}

/// Runs [`process_due`] on a fixed interval for the lifetime of the server.
pub fn spawn_worker(repo: Arc<dyn Repo>, pricing: PricingConfig, every: Duration) {
    if every.is_zero() {
        info!("recurring order worker disabled");
        return;
    }
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = process_due(repo.as_ref(), &pricing, Utc::now()).await {
                error!("recurring batch aborted: {e}");
            }
        }
    });
}
