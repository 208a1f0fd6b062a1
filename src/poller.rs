//! Export status polling.
//!
//! A job is polled immediately and then every `interval` until the service
//! reports a terminal status, the timeout elapses, or the poll is cancelled.
//! No request is issued after the first terminal response.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ExportApi;
use crate::error::{ExportError, Result};
use crate::schema::ExportJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up (without failing the job) after this long.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The service reported `completed` or `failed`.
    Finished(ExportJob),
    /// The timeout elapsed while the job was still processing; check back later.
    StillProcessing(ExportJob),
    Cancelled,
}

impl PollOutcome {
    /// The terminal job, or an error when polling ended without one.
    pub fn into_finished(self, export_id: &str) -> Result<ExportJob> {
        match self {
            PollOutcome::Finished(job) => Ok(job),
            PollOutcome::StillProcessing(_) => Err(ExportError::PollTimeout(export_id.to_string())),
            PollOutcome::Cancelled => Err(ExportError::Cancelled),
        }
    }
}

/// Poll `export_id` until it is terminal, reporting every observed job to `on_update`.
pub async fn poll_until_done<A, F>(
    api: &A,
    export_id: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<PollOutcome>
where
    A: ExportApi + ?Sized,
    F: FnMut(&ExportJob),
{
    let deadline = Instant::now() + policy.timeout;

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            result = api.job_status(export_id) => result?,
        };
        on_update(&job);

        if job.is_terminal() {
            info!(export_id, status = %job.status, "Export reached terminal status");
            return Ok(PollOutcome::Finished(job));
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(export_id, "Stopped polling, export still processing");
            return Ok(PollOutcome::StillProcessing(job));
        }

        debug!(export_id, progress = job.progress.unwrap_or_default(), "Export still processing");
        let wait = policy.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Background poll of one export, scoped to its owner.
///
/// Dropping the poller or calling [`StatusPoller::dispose`] stops it.
pub struct StatusPoller {
    export_id: String,
    cancel: CancellationToken,
    updates: watch::Receiver<Option<ExportJob>>,
    handle: Option<JoinHandle<Result<PollOutcome>>>,
}

impl StatusPoller {
    pub fn spawn(api: Arc<dyn ExportApi>, export_id: impl Into<String>, policy: PollPolicy) -> Self {
        let export_id = export_id.into();
        let cancel = CancellationToken::new();
        let (tx, updates) = watch::channel(None);

        let task_cancel = cancel.clone();
        let task_id = export_id.clone();
        let handle = tokio::spawn(async move {
            poll_until_done(api.as_ref(), &task_id, policy, &task_cancel, |job| {
                tx.send_replace(Some(job.clone()));
            })
            .await
        });

        Self {
            export_id,
            cancel,
            updates,
            handle: Some(handle),
        }
    }

    pub fn export_id(&self) -> &str {
        &self.export_id
    }

    /// Most recently observed job state.
    pub fn latest(&self) -> Option<ExportJob> {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ExportJob>> {
        self.updates.clone()
    }

    /// Stop polling. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            debug!(export_id = %self.export_id, "Disposing status poller");
            self.cancel.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the poll to end.
    pub async fn wait(mut self) -> Result<PollOutcome> {
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|_| ExportError::Cancelled)?,
            None => Ok(PollOutcome::Cancelled),
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
