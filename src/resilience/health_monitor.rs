use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::storage::QuotaStore;

/// Shared "quota store is alive" bit.
///
/// Cloning yields another handle to the same flag. Read on every admission
/// decision, written only when the store fails or recovers.
#[derive(Debug, Clone)]
pub struct HealthFlag(Arc<AtomicBool>);

impl HealthFlag {
    /// A new flag, initially alive
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub(crate) fn mark_down(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn mark_alive(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Background prober for a quota store that has failed.
///
/// Idle while the store is trusted. The first reported failure flips the
/// [`HealthFlag`] to down and spawns exactly one probe task, which pings the
/// store every `probe_interval` until a probe succeeds, then flips the flag
/// back and exits. There is no retry cap; only [`HealthMonitor::shutdown`]
/// stops a probe task early.
#[derive(Debug)]
pub struct HealthMonitor<S: QuotaStore> {
    store: Arc<S>,
    flag: HealthFlag,
    config: MonitorConfig,
    /// True exactly while a probe task is in flight
    started: Mutex<bool>,
    shutdown: watch::Sender<bool>,
    /// Probe tasks spawned over the monitor's lifetime
    runs: AtomicUsize,
}

impl<S: QuotaStore> HealthMonitor<S> {
    pub fn new(store: Arc<S>, flag: HealthFlag, config: MonitorConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            flag,
            config,
            started: Mutex::new(false),
            shutdown,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn flag(&self) -> &HealthFlag {
        &self.flag
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        *self.lock_started()
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Marks the store down and starts probing, unless a probe task already runs.
    ///
    /// Safe to call from many failing callers at once; the marker and the
    /// transition share one lock, so at most one task exists.
    pub fn start(self: &Arc<Self>) {
        let mut started = self.lock_started();
        if *started {
            return;
        }

        let was_alive = self.flag.mark_down();

        if self.is_shut_down() {
            debug!("Health monitor is shut down; quota store stays marked unavailable");
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                *started = true;
                self.runs.fetch_add(1, Ordering::Relaxed);
                let receiver = self.shutdown.subscribe();
                handle.spawn(Arc::clone(self).probe_until_alive(receiver));

                if was_alive {
                    warn!(
                        probe_interval_ms = self.config.probe_interval.as_millis() as u64,
                        "Quota store unavailable, using in-process limiters until it answers"
                    );
                }
            }
            Err(e) => {
                error!("Cannot start health monitor outside a tokio runtime: {}", e);
            }
        }
    }

    /// One liveness probe, bounded by `probe_timeout`
    pub async fn probe(&self) -> bool {
        match time::timeout(self.config.probe_timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Quota store probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!(
                    "Quota store probe timed out after {:?}",
                    self.config.probe_timeout
                );
                false
            }
        }
    }

    /// Stops a running probe task; later failures still mark the store down
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn probe_until_alive(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately; probe one interval after the failure
        ticker.tick().await;

        loop {
            // a shutdown sent before subscribing is only visible through the value
            if *shutdown.borrow_and_update() {
                *self.lock_started() = false;
                debug!("Health monitor stopped before the quota store recovered");
                return;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        *self.lock_started() = false;
                        return;
                    }
                    continue;
                }
            }

            if self.probe().await {
                let mut started = self.lock_started();
                self.flag.mark_alive();
                *started = false;
                info!("Quota store is reachable again, resuming shared rate limiting");
                return;
            }
        }
    }

    fn lock_started(&self) -> std::sync::MutexGuard<'_, bool> {
        // a bool cannot be left half-written
        self.started.lock().unwrap_or_else(|e| e.into_inner())
    }
}
