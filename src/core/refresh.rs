//! Auto-refresh scheduler
//!
//! One periodic task per widget id. Scheduling again for the same widget
//! replaces the previous schedule.

use dashkit_core::Result;
use log::{debug, error, info, trace};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

struct Schedule {
    interval: Duration,
    /// Cleared on cancel. Held while the callback is invoked.
    active: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl Schedule {
    fn stop(self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.handle.abort();
    }
}

/// Periodic refresh timers keyed by widget id
#[derive(Default)]
pub struct RefreshScheduler {
    schedules: Mutex<HashMap<String, Schedule>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Schedule>> {
        self.schedules.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `callback` every `interval`, first one interval from now.
    ///
    /// A zero interval only cancels. Ticks missed while a callback runs long
    /// are skipped. A failing callback is logged and the schedule keeps going.
    /// `callback` is invoked under the schedule's gate, so it must not cancel
    /// its own schedule before returning its future.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, widget_id: &str, interval: Duration, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.cancel(widget_id);
        if interval.is_zero() {
            debug!("Auto-refresh disabled for widget {}", widget_id);
            return;
        }

        let active = Arc::new(Mutex::new(true));
        let task_active = Arc::clone(&active);
        let task_widget = widget_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let tick = {
                    let active = task_active.lock().unwrap_or_else(|e| e.into_inner());
                    if !*active {
                        break;
                    }
                    callback()
                };
                trace!("Auto-refresh tick for widget {}", task_widget);
                if let Err(e) = tick.await {
                    error!("Auto-refresh failed for widget {}: {}", task_widget, e);
                }
            }
        });

        let mut schedules = self.lock();
        // A concurrent schedule() for the same widget may have won the race
        if let Some(previous) = schedules.insert(
            widget_id.to_string(),
            Schedule {
                interval,
                active,
                handle,
            },
        ) {
            previous.stop();
        }
        info!("Auto-refresh every {:?} for widget {}", interval, widget_id);
    }

    /// Cancel a widget's schedule. `callback` is not invoked again after this
    /// returns; a future it already returned is aborted at its next await.
    pub fn cancel(&self, widget_id: &str) -> bool {
        let removed = self.lock().remove(widget_id);
        match removed {
            Some(schedule) => {
                schedule.stop();
                debug!("Auto-refresh cancelled for widget {}", widget_id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, schedule) in drained {
            schedule.stop();
        }
    }

    pub fn is_scheduled(&self, widget_id: &str) -> bool {
        self.lock().contains_key(widget_id)
    }

    pub fn interval_of(&self, widget_id: &str) -> Option<Duration> {
        self.lock().get(widget_id).map(|s| s.interval)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
