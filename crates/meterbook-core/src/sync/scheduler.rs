//! Periodic and on-demand sync runs.
//!
//! A run pulls the group snapshot, merges it into the local store, persists
//! the result and pushes it back. Runs never overlap: a request made while a
//! run is in flight is coalesced into it. Failures are logged and published,
//! and the next tick retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::codec::DecodedSnapshot;
use super::transport::Transport;
use crate::merge::MergeAnomaly;
use crate::models::{DeviceId, Snapshot, SyncState};
use crate::services::StoreHandle;
use crate::state::{SyncOutcome, SyncPhase, SyncStatus};
use crate::{Error, Result};

/// Default time between periodic runs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// Default quiet period after a local change before syncing it.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Whether the group already had a remote snapshot
    pub remote_found: bool,
    /// Readings in the merged snapshot, tombstones included
    pub entries: usize,
    pub anomalies: Vec<MergeAnomaly>,
    pub finished_at: i64,
}

/// What a call to [`SyncScheduler::sync_now`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRun {
    Completed(SyncReport),
    /// Another run was already in flight; this request rides along with it.
    Coalesced,
}

/// Drives sync for one device.
pub struct SyncScheduler<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for SyncScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    store: StoreHandle,
    transport: T,
    config: SchedulerConfig,
    status: watch::Sender<SyncStatus>,
    in_flight: AtomicBool,
    requested: Notify,
}

/// Clears the in-flight flag when a run ends, including by cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Transport> SyncScheduler<T> {
    pub fn new(store: StoreHandle, transport: T, config: SchedulerConfig) -> Self {
        let phase = if store
            .sync_state()
            .is_ok_and(|state| state.is_configured())
        {
            SyncPhase::Idle
        } else {
            SyncPhase::Disabled
        };
        let (status, _) = watch::channel(SyncStatus::new(phase));

        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                config,
                status,
                in_flight: AtomicBool::new(false),
                requested: Notify::new(),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Enable sync for `group_id` and persist the choice.
    pub fn join_group(&self, group_id: &str) -> Result<()> {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(Error::InvalidArgument(
                "group id must not be empty".to_string(),
            ));
        }

        self.inner.store.update_sync_state(|state| {
            state.enabled = true;
            state.group_id = Some(group_id.to_string());
        })?;
        self.set_phase_if(SyncPhase::Disabled, SyncPhase::Idle);
        tracing::info!("Joined sync group {}", group_id);
        Ok(())
    }

    /// Disable sync. Local data and the group id are kept.
    pub fn disable(&self) -> Result<()> {
        self.inner.store.disable_sync()?;
        self.inner
            .status
            .send_modify(|status| status.phase = SyncPhase::Disabled);
        Ok(())
    }

    /// Run one sync round now.
    pub async fn sync_now(&self) -> Result<SyncRun> {
        let state = self.inner.store.sync_state()?;
        let Some(group_id) = state.group_id.clone().filter(|_| state.enabled) else {
            self.inner
                .status
                .send_modify(|status| status.phase = SyncPhase::Disabled);
            return Err(Error::SyncDisabled);
        };

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync already in flight; coalescing request");
            return Ok(SyncRun::Coalesced);
        }
        let _in_flight = InFlight(&self.inner.in_flight);

        self.inner
            .status
            .send_modify(|status| status.phase = SyncPhase::Syncing);

        let result = self.run_once(&group_id).await;
        let at = self.inner.store.now_millis();

        let outcome = match &result {
            Ok(report) => {
                tracing::info!(
                    "Synced group {}: {} entries, {} anomalies",
                    group_id,
                    report.entries,
                    report.anomalies.len()
                );
                SyncOutcome::Synced {
                    at,
                    entries: report.entries,
                    anomalies: report.anomalies.len(),
                }
            }
            Err(error) => {
                tracing::warn!("Sync of group {} failed: {}", group_id, error);
                SyncOutcome::Failed {
                    at,
                    message: error.to_string(),
                }
            }
        };

        // Read inside the update; a concurrent disable() must not be overwritten.
        let store = &self.inner.store;
        self.inner.status.send_modify(|status| {
            status.phase = if store.sync_state().is_ok_and(|state| state.is_configured()) {
                SyncPhase::Idle
            } else {
                SyncPhase::Disabled
            };
            status.last_outcome = Some(outcome);
        });

        result.map(SyncRun::Completed)
    }

    async fn run_once(&self, group_id: &str) -> Result<SyncReport> {
        let remote = self.inner.transport.pull(group_id).await?;
        let remote_found = remote.is_some();
        let DecodedSnapshot {
            snapshot: remote,
            anomalies: skipped,
        } = remote.unwrap_or_default();

        let outcome = self.inner.store.apply_remote(&remote, skipped).await?;
        self.inner
            .transport
            .push(group_id, &outcome.snapshot)
            .await?;

        let finished_at = self.inner.store.now_millis();
        let local = self.inner.store.device_id();
        self.inner.store.update_sync_state(|state| {
            state.last_sync_timestamp = finished_at;
            record_devices(state, &outcome.snapshot, local, finished_at);
        })?;

        Ok(SyncReport {
            remote_found,
            entries: outcome.snapshot.entry_count(),
            anomalies: outcome.anomalies,
            finished_at,
        })
    }

    /// Start a run in the background and return immediately.
    pub fn trigger(&self) -> JoinHandle<Result<SyncRun>> {
        let this = self.clone();
        tokio::spawn(async move { this.sync_now().await })
    }

    /// Ask for a run after the debounce window. Each request restarts the
    /// window. Only honoured while the loop from [`Self::start`] is running.
    pub fn request_soon(&self) {
        self.inner.requested.notify_one();
    }

    /// Spawn the periodic loop. The first run happens immediately.
    pub fn start(&self) -> SchedulerHandle {
        let this = self.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move { this.run_loop(shutdown_rx).await });
        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run_loop(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.inner.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut debounce: Option<Instant> = None;

        tracing::debug!(
            "Sync loop started (interval {:?}, debounce {:?})",
            self.inner.config.interval,
            self.inner.config.debounce
        );

        loop {
            let deadline = debounce;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    debounce = None;
                    self.run_scheduled().await;
                }
                () = self.inner.requested.notified() => {
                    debounce = Some(Instant::now() + self.inner.config.debounce);
                }
                () = sleep_until(deadline) => {
                    debounce = None;
                    self.run_scheduled().await;
                }
            }
        }

        tracing::debug!("Sync loop stopped");
    }

    async fn run_scheduled(&self) {
        // Failures are logged and published by sync_now.
        if let Err(Error::SyncDisabled) = self.sync_now().await {
            tracing::debug!("Skipping scheduled sync: disabled");
        }
    }

    fn set_phase_if(&self, from: SyncPhase, to: SyncPhase) {
        self.inner.status.send_if_modified(|status| {
            if status.phase == from {
                status.phase = to;
                true
            } else {
                false
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn record_devices(state: &mut SyncState, snapshot: &Snapshot, local: &DeviceId, at: i64) {
    for reading in snapshot.readings.values().flat_map(|series| series.entries()) {
        state.observe_device(&reading.origin_device, None, reading.last_modified);
    }
    state.observe_device(
        &snapshot.last_modified_by_device,
        None,
        snapshot.last_modified,
    );
    state.observe_device(local, None, at);
}

/// Running sync loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to exit. An in-flight run completes first.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!("Sync loop ended abnormally: {}", error);
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
