//! Status and log reporters
//!
//! Two independent timer loops. The status reporter reconciles on every tick
//! and pushes when something changed or the heartbeat is due; the log
//! reporter ships container logs and advances their watermarks.

use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use tether_core::domain::status::ApplicationStatus;

use crate::repository::StatusSink;
use crate::service::{LogCollector, StatusReconciler, has_changed};

#[derive(Default)]
struct LastReport {
    statuses: Vec<ApplicationStatus>,
    sent_at: Option<Instant>,
}

pub struct StatusReporter {
    reconciler: StatusReconciler,
    sink: Arc<dyn StatusSink>,
    interval: Duration,
    heartbeat_interval: Duration,
    last: Mutex<LastReport>,
}

impl StatusReporter {
    pub fn new(
        reconciler: StatusReconciler,
        sink: Arc<dyn StatusSink>,
        interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            sink,
            interval,
            heartbeat_interval,
            last: Mutex::new(LastReport::default()),
        }
    }

    pub async fn run(&self) {
        info!(
            "Starting status reporter (interval: {:?}, heartbeat: {:?})",
            self.interval, self.heartbeat_interval
        );

        let mut ticker = time::interval(self.interval);
        loop {
            ticker.tick().await;

            if let Err(e) = self.report_once().await {
                warn!("{:#}", e);
            }
        }
    }

    /// Reconciles and pushes the snapshot if it changed or the heartbeat is due
    ///
    /// # Returns
    /// Whether a snapshot was pushed
    pub async fn report_once(&self) -> Result<bool> {
        let current = self.reconciler.reconcile().await;

        let due = {
            let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            match last.sent_at {
                None => true,
                Some(at) => {
                    at.elapsed() >= self.heartbeat_interval || has_changed(&last.statuses, &current)
                }
            }
        };

        if !due {
            debug!("Status unchanged, skipping push");
            return Ok(false);
        }

        self.sink.publish_status(&current).await?;
        debug!("Pushed status of {} application(s)", current.len());

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.statuses = current;
        last.sent_at = Some(Instant::now());
        Ok(true)
    }
}

pub struct LogReporter {
    collector: LogCollector,
    sink: Arc<dyn StatusSink>,
    interval: Duration,
}

impl LogReporter {
    pub fn new(collector: LogCollector, sink: Arc<dyn StatusSink>, interval: Duration) -> Self {
        Self {
            collector,
            sink,
            interval,
        }
    }

    pub async fn run(&self) {
        info!("Starting log reporter (interval: {:?})", self.interval);

        let mut ticker = time::interval(self.interval);
        loop {
            ticker.tick().await;

            if let Err(e) = self.report_once().await {
                warn!("{:#}", e);
            }
        }
    }

    /// Collects and pushes new logs
    ///
    /// # Returns
    /// Number of application snapshots pushed
    pub async fn report_once(&self) -> Result<usize> {
        let batch = self.collector.collect().await;

        if !batch.is_empty() {
            self.sink.publish_logs(&batch.snapshots).await?;
            debug!("Sent logs for {} application(s)", batch.snapshots.len());
        }

        self.collector.commit(&batch);
        Ok(batch.snapshots.len())
    }
}
