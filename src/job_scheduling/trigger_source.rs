//! Trigger sources: what decides when a scheduled entry ticks
//!
//! The coordinator does not care where ticks come from. [`CronTrigger`]
//! drives them from cron patterns on the tokio timer; [`ManualTrigger`]
//! leaves them to whoever holds it.

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{BoxFuture, join_all};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{CronSyncError, CronSyncResult};

pub type TickFuture = BoxFuture<'static, CronSyncResult<()>>;

/// Invoked once per tick of a subscription
pub type TickCallback = Arc<dyn Fn() -> TickFuture + Send + Sync>;

pub trait TriggerSource: Send + Sync {
    /// Check a pattern without subscribing anything
    fn validate(&self, pattern: &str) -> CronSyncResult<()>;

    /// Create a stopped subscription for `pattern`
    fn subscribe(
        &self,
        pattern: &str,
        callback: TickCallback,
    ) -> CronSyncResult<Arc<dyn Subscription>>;
}

pub trait Subscription: Send + Sync {
    fn start(&self);

    /// Cancel future ticks. Ticks already running are left to finish.
    fn stop(&self);

    fn is_running(&self) -> bool;
}

/// Parse a cron pattern.
///
/// Five fields are read as minute-granularity cron with seconds at zero; six
/// or seven fields start with seconds (and may end with a year).
pub fn parse_schedule(pattern: &str) -> CronSyncResult<Schedule> {
    let trimmed = pattern.trim();
    let normalized = match trimmed.split_whitespace().count() {
        0 => return Err(CronSyncError::invalid_pattern(pattern, "pattern is empty")),
        5 => format!("0 {trimmed}"),
        _ => trimmed.to_string(),
    };

    Schedule::from_str(&normalized)
        .map_err(|e| CronSyncError::invalid_pattern(pattern, e.to_string()))
}

/// Fires subscriptions at the instants matching their cron pattern (UTC)
#[derive(Debug, Clone, Default)]
pub struct CronTrigger;

impl CronTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl TriggerSource for CronTrigger {
    fn validate(&self, pattern: &str) -> CronSyncResult<()> {
        parse_schedule(pattern).map(|_| ())
    }

    fn subscribe(
        &self,
        pattern: &str,
        callback: TickCallback,
    ) -> CronSyncResult<Arc<dyn Subscription>> {
        let schedule = parse_schedule(pattern)?;
        Ok(Arc::new(CronSubscription {
            pattern: pattern.to_string(),
            schedule,
            callback,
            cancel: Mutex::new(None),
        }))
    }
}

struct CronSubscription {
    pattern: String,
    schedule: Schedule,
    callback: TickCallback,
    cancel: Mutex<Option<CancellationToken>>,
}

impl CronSubscription {
    fn cancel_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Subscription for CronSubscription {
    fn start(&self) {
        let mut slot = self.cancel_slot();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "Cannot start cron subscription '{}' outside a tokio runtime",
                    self.pattern
                );
                return;
            }
        };

        let token = CancellationToken::new();
        handle.spawn(run_schedule(
            self.pattern.clone(),
            self.schedule.clone(),
            self.callback.clone(),
            token.clone(),
        ));
        *slot = Some(token);
    }

    fn stop(&self) {
        if let Some(token) = self.cancel_slot().take() {
            token.cancel();
        }
    }

    fn is_running(&self) -> bool {
        self.cancel_slot()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for CronSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule(
    pattern: String,
    schedule: Schedule,
    callback: TickCallback,
    cancellation_token: CancellationToken,
) {
    debug!("Cron subscription '{}' started", pattern);
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        // Never fire the same instant twice, even if the timer wakes early
        let from = last_fired.map_or(now, |fired| fired.max(now));
        let Some(next) = schedule.after(&from).next() else {
            info!("Cron pattern '{}' has no upcoming instants", pattern);
            // Marks the subscription as no longer running
            cancellation_token.cancel();
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancellation_token.cancelled() => break,
        }

        last_fired = Some(next);
        let tick = callback.clone();
        let tick_pattern = pattern.clone();
        tokio::spawn(async move {
            if let Err(e) = tick().await {
                error!("Tick for cron pattern '{}' failed: {}", tick_pattern, e);
            }
        });
    }

    debug!("Cron subscription '{}' stopped", pattern);
}

/// Trigger source whose ticks are fired by hand through [`ManualTrigger::fire_all`].
///
/// Patterns are still validated as cron patterns so that a schedule accepted
/// here would also be accepted by [`CronTrigger`].
#[derive(Default)]
pub struct ManualTrigger {
    subscriptions: Mutex<Vec<Weak<ManualSubscription>>>,
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Weak<ManualSubscription>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one tick of every running subscription and collect the results
    pub async fn fire_all(&self) -> Vec<CronSyncResult<()>> {
        let ticks: Vec<TickFuture> = {
            let mut slots = self.slots();
            slots.retain(|weak| weak.strong_count() > 0);
            slots
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|subscription| subscription.is_running())
                .map(|subscription| (subscription.callback)())
                .collect()
        };
        join_all(ticks).await
    }

    /// Subscriptions that are still alive, running or not
    pub fn subscription_count(&self) -> usize {
        let mut slots = self.slots();
        slots.retain(|weak| weak.strong_count() > 0);
        slots.len()
    }
}

impl TriggerSource for ManualTrigger {
    fn validate(&self, pattern: &str) -> CronSyncResult<()> {
        parse_schedule(pattern).map(|_| ())
    }

    fn subscribe(
        &self,
        pattern: &str,
        callback: TickCallback,
    ) -> CronSyncResult<Arc<dyn Subscription>> {
        self.validate(pattern)?;
        let subscription = Arc::new(ManualSubscription {
            callback,
            running: AtomicBool::new(false),
        });
        self.slots().push(Arc::downgrade(&subscription));
        Ok(subscription)
    }
}

struct ManualSubscription {
    callback: TickCallback,
    running: AtomicBool,
}

impl Subscription for ManualSubscription {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
