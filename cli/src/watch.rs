//! Polling agent: re-probes the rule on a fixed cadence and reports the
//! first status plus every transition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use familyshare_firewall::{CommandRunner, RuleManager, RuleStatus};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Stop after this many probes. `None` runs until shutdown.
    pub max_polls: Option<u64>,
}

/// A status observation that differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub previous: Option<RuleStatus>,
    pub status: RuleStatus,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub polls: u64,
    pub changes: u64,
    pub errors: u64,
}

/// Poll `manager` until `shutdown` resolves or `max_polls` is reached.
///
/// Each probe runs on the blocking pool so a slow `netsh` never stalls the
/// timer. Probe failures are logged and the loop carries on.
pub async fn watch<R, F, S>(
    manager: Arc<RuleManager<R>>,
    options: WatchOptions,
    shutdown: F,
    mut on_change: S,
) -> Result<WatchSummary>
where
    R: CommandRunner + Send + Sync + 'static,
    F: Future<Output = ()>,
    S: FnMut(&StatusChange),
{
    let mut interval = tokio::time::interval(options.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut summary = WatchSummary::default();
    let mut last: Option<RuleStatus> = None;

    info!(
        rule = %manager.rule().name,
        backend = %manager.backend(),
        interval_ms = u64::try_from(options.interval.as_millis()).unwrap_or(u64::MAX),
        "watching firewall rule"
    );

    loop {
        if options.max_polls.is_some_and(|max| summary.polls >= max) {
            debug!("poll limit reached");
            break;
        }

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("shutdown requested, stopping watch");
                break;
            }
            _ = interval.tick() => {}
        }

        let mgr = Arc::clone(&manager);
        let probed = tokio::task::spawn_blocking(move || mgr.status())
            .await
            .context("status probe task failed")?;
        summary.polls += 1;

        match probed {
            Ok(status) if last != Some(status) => {
                let change = StatusChange {
                    previous: last,
                    status,
                    checked_at: Utc::now(),
                };
                on_change(&change);
                summary.changes += 1;
                last = Some(status);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Error checking rule status: {e}");
                summary.errors += 1;
            }
        }
    }

    Ok(summary)
}
