use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::agent_client::AgentApi;
use crate::preferences::Preferences;
use crate::surface::ShellSurface;
use crate::types::{AlertEvent, AlertKey, AlertNotification, ClickAction};

/// Human-readable label for an agent alert type.
pub fn alert_label(alert_type: &str) -> &str {
    match alert_type {
        "cpu_high" => "High CPU",
        "memory_high" => "High Memory",
        "collect_slow" => "Slow Collection",
        other => other,
    }
}

/// Which alert occurrences have already been notified.
///
/// Once the set grows past `capacity` it is emptied rather than trimmed, so a
/// still-active alert may be notified again after a reset.
#[derive(Debug)]
pub struct SeenAlertCache {
    keys: HashSet<AlertKey>,
    capacity: usize,
}

impl SeenAlertCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            capacity,
        }
    }

    /// Returns `true` when `key` had not been seen in this cache lifetime.
    pub fn insert(&mut self, key: AlertKey) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        if self.keys.len() > self.capacity {
            debug!(capacity = self.capacity, "seen-alert cache full, resetting");
            self.keys.clear();
        }
        true
    }

    pub fn remove(&mut self, key: &AlertKey) -> bool {
        self.keys.remove(key)
    }

    pub fn contains(&self, key: &AlertKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub fn notification_for(alert: &AlertEvent) -> AlertNotification {
    AlertNotification {
        title: alert_label(&alert.alert_type).to_string(),
        body: alert.message.clone(),
        alert_type: alert.alert_type.clone(),
        action: ClickAction::FocusMainWindow,
    }
}

/// Polls the agent's active alerts and notifies once per (type, timestamp).
pub struct AlertNotifier {
    api: Arc<dyn AgentApi>,
    surface: Arc<dyn ShellSurface>,
    preferences: Arc<Preferences>,
    seen: Mutex<SeenAlertCache>,
    period: Duration,
    request_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every start and stop; a poll only dispatches for the epoch it began in.
    epoch: AtomicU64,
}

impl AlertNotifier {
    pub fn new(
        api: Arc<dyn AgentApi>,
        surface: Arc<dyn ShellSurface>,
        preferences: Arc<Preferences>,
        capacity: usize,
        period: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api,
            surface,
            preferences,
            seen: Mutex::new(SeenAlertCache::new(capacity)),
            period,
            request_timeout,
            task: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Starts the interval. A second call while running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(period = ?self.period, "alert notifier started");

        let notifier = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(notifier.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Dropping the set with the aborted loop cancels in-flight polls.
            let mut ticks = JoinSet::new();
            loop {
                ticker.tick().await;
                while ticks.try_join_next().is_some() {}
                // Each tick runs on its own so a slow agent cannot delay the cadence.
                let tick = Arc::clone(&notifier);
                ticks.spawn(async move {
                    tick.poll(epoch).await;
                });
            }
        }));
    }

    /// Cancels the interval and every poll still in flight. No notification is
    /// emitted once this returns.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = task.take() else {
            return;
        };
        {
            let _seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        handle.abort();
        info!("alert notifier stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// One poll cycle; returns how many notifications were delivered.
    pub async fn poll_once(&self) -> usize {
        self.poll(self.epoch.load(Ordering::SeqCst)).await
    }

    async fn poll(&self, epoch: u64) -> usize {
        if !self.preferences.notifications_enabled() {
            return 0;
        }

        let alerts = match self.api.active_alerts(self.request_timeout).await {
            Ok(alerts) => alerts,
            Err(e) => {
                debug!("alert poll failed: {}", e);
                return 0;
            }
        };

        self.dispatch(epoch, &alerts)
    }

    fn dispatch(&self, epoch: u64, alerts: &[AlertEvent]) -> usize {
        // Notifying under the lock keeps `stop` from interleaving with delivery.
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(count = alerts.len(), "alert poll finished after stop, dropped");
            return 0;
        }

        let mut delivered = 0;
        for alert in alerts {
            let key = alert.key();
            if !seen.insert(key.clone()) {
                continue;
            }
            debug!(alert_type = %alert.alert_type, timestamp = %alert.timestamp, "notifying alert");
            if self.surface.notify(&notification_for(alert)) {
                delivered += 1;
            } else {
                // Retried on the next tick.
                seen.remove(&key);
            }
        }
        delivered
    }

    pub fn seen_len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
