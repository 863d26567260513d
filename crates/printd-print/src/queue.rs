// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory print job queue.
//
// The queue is the only shared mutable job store in the service. It holds
// every job record (pending, in flight and finished) until it is purged or
// the process exits, and keeps pending jobs in submission order. All access
// goes through a single mutex, so concurrent submitters never lose or
// duplicate a job.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::{debug, info, instrument, warn};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{JobId, JobState, PrintJob};

/// Job records plus the FIFO order of those still pending.
#[derive(Default)]
struct QueueInner {
    jobs: HashMap<JobId, PrintJob>,
    /// Every retained job, oldest submission first.
    order: VecDeque<JobId>,
    /// Pending jobs, oldest submission first.
    pending: VecDeque<JobId>,
    /// Jobs between `begin` and `succeed`/`fail`.
    in_flight: usize,
}

impl QueueInner {
    fn unfinished(&self) -> usize {
        self.pending.len() + self.in_flight
    }
}

/// Thread-safe FIFO job queue.
///
/// State changes other than `submit` are reserved for the dispatcher; the
/// methods enforce the forward-only lifecycle regardless of the caller.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    /// Maximum number of unfinished (pending or in-flight) jobs.
    capacity: usize,
    /// Wakes the dispatcher when work arrives.
    submitted: Notify,
}

impl JobQueue {
    /// Create an empty queue holding at most `capacity` unfinished jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity: capacity.max(1),
            submitted: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave a job half-written, so a
    // poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new `Pending` job and return its identifier.
    #[instrument(skip(self, job), fields(job_id = %job.id, printer = %job.printer))]
    pub fn submit(&self, job: PrintJob) -> Result<JobId> {
        if job.printer.trim().is_empty() {
            return Err(PrintdError::InvalidJob("printer name is empty".into()));
        }
        if job.state != JobState::Pending {
            return Err(PrintdError::InvalidJob(format!(
                "new jobs must be pending, got {}",
                job.state
            )));
        }

        let id = job.id;
        {
            let mut inner = self.lock();
            if inner.jobs.contains_key(&id) {
                return Err(PrintdError::InvalidJob(format!("job {id} already queued")));
            }
            if inner.unfinished() >= self.capacity {
                warn!(capacity = self.capacity, "queue full, rejecting job");
                return Err(PrintdError::QueueFull {
                    capacity: self.capacity,
                });
            }
            inner.order.push_back(id);
            inner.pending.push_back(id);
            inner.jobs.insert(id, job);
        }

        self.submitted.notify_one();
        info!(job_id = %id, "job queued");
        Ok(id)
    }

    /// The oldest pending job, without removing it. Never blocks.
    pub fn next(&self) -> Option<PrintJob> {
        self.next_skipping(&HashSet::new())
    }

    /// The oldest pending job whose printer is not in `skip`.
    ///
    /// Lets the dispatcher hold back one printer's jobs (keeping their
    /// order) while other printers keep working.
    pub fn next_skipping(&self, skip: &HashSet<String>) -> Option<PrintJob> {
        let inner = self.lock();
        inner
            .pending
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .find(|job| !skip.contains(&job.printer))
            .cloned()
    }

    /// Current state of a job, or `None` if it is unknown.
    pub fn peek_status(&self, id: &JobId) -> Option<JobState> {
        self.lock().jobs.get(id).map(|job| job.state)
    }

    /// Snapshot of a single job.
    pub fn get(&self, id: &JobId) -> Option<PrintJob> {
        self.lock().jobs.get(id).cloned()
    }

    /// Snapshot of every retained job, in submission order.
    pub fn jobs(&self) -> Vec<PrintJob> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of retained jobs in any state.
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a job from `Pending` to `InProgress`.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn begin(&self, id: &JobId) -> Result<PrintJob> {
        let mut inner = self.lock();
        let job = transition(&mut inner.jobs, id, JobState::InProgress)?;
        job.started_at = Some(job.updated_at);
        let snapshot = job.clone();
        inner.pending.retain(|pending| pending != id);
        inner.in_flight += 1;
        debug!(job_id = %id, "job in progress");
        Ok(snapshot)
    }

    /// Mark an in-progress job as accepted by the print subsystem.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn succeed(&self, id: &JobId, backend_job_id: Option<String>) -> Result<PrintJob> {
        let mut inner = self.lock();
        let job = transition(&mut inner.jobs, id, JobState::Succeeded)?;
        job.finished_at = Some(job.updated_at);
        job.backend_job_id = backend_job_id;
        let snapshot = job.clone();
        inner.in_flight -= 1;
        info!(job_id = %id, "job succeeded");
        Ok(snapshot)
    }

    /// Mark an in-progress job as failed, recording why.
    #[instrument(skip(self, detail), fields(job_id = %id))]
    pub fn fail(&self, id: &JobId, detail: impl Into<String>) -> Result<PrintJob> {
        let detail = detail.into();
        let mut inner = self.lock();
        let job = transition(&mut inner.jobs, id, JobState::Failed)?;
        job.finished_at = Some(job.updated_at);
        warn!(job_id = %id, error = %detail, "job failed");
        job.error = Some(detail);
        let snapshot = job.clone();
        inner.in_flight -= 1;
        Ok(snapshot)
    }

    /// Note that a pending job was held back because its printer was
    /// unavailable. The job keeps its state and its place in line.
    pub fn record_deferral(&self, id: &JobId) -> Result<u32> {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(id).ok_or(PrintdError::JobNotFound(*id))?;
        if job.state != JobState::Pending {
            return Err(PrintdError::InvalidTransition {
                job: *id,
                from: job.state,
                to: JobState::Pending,
            });
        }
        job.deferrals += 1;
        job.updated_at = Utc::now();
        Ok(job.deferrals)
    }

    /// Remove a finished job from the queue.
    pub fn purge(&self, id: &JobId) -> Result<PrintJob> {
        let mut inner = self.lock();
        let state = inner
            .jobs
            .get(id)
            .map(|job| job.state)
            .ok_or(PrintdError::JobNotFound(*id))?;
        if !state.is_terminal() {
            return Err(PrintdError::InvalidJob(format!("job {id} is still {state}")));
        }
        inner.order.retain(|kept| kept != id);
        let job = inner.jobs.remove(id).ok_or(PrintdError::JobNotFound(*id))?;
        info!(job_id = %id, "job purged");
        Ok(job)
    }

    /// Remove every finished job. Returns how many were dropped.
    pub fn purge_finished(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, job| !job.state.is_terminal());
        let QueueInner { jobs, order, .. } = &mut *inner;
        order.retain(|id| jobs.contains_key(id));
        let purged = before - inner.jobs.len();
        if purged > 0 {
            info!(purged, "finished jobs purged");
        }
        purged
    }

    /// Resolves after the next successful `submit` (or immediately if one
    /// happened since the last wake-up).
    pub fn notified(&self) -> Notified<'_> {
        self.submitted.notified()
    }
}

/// Apply a forward-only state change to a job record.
fn transition<'a>(
    jobs: &'a mut HashMap<JobId, PrintJob>,
    id: &JobId,
    to: JobState,
) -> Result<&'a mut PrintJob> {
    let job = jobs.get_mut(id).ok_or(PrintdError::JobNotFound(*id))?;
    if !job.state.can_transition_to(to) {
        return Err(PrintdError::InvalidTransition {
            job: *id,
            from: job.state,
            to,
        });
    }
    job.state = to;
    job.updated_at = Utc::now();
    Ok(job)
}
