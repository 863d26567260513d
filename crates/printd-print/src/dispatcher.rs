// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The dispatcher: the single loop that moves jobs from the queue to printers.
//
// Each pass walks the pending jobs oldest first. Before a job is started its
// printer is checked; an unavailable printer leaves the job pending in place,
// starts that printer's backoff and holds back its later jobs for the rest
// of the pass, so jobs for one printer always go out in submission order.
//
// Errors are sorted with `classify_error`. A transient error while checking
// a printer counts as offline; a permanent one fails the job unsent. A send
// failure always fails the job (it may have been partly printed), and if it
// was transient the printer is also treated as gone offline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{ErrorClass, JobState, PrintJob, PrinterAvailability, PrinterHandle};

use crate::backend::PrintBackend;
use crate::payload::load_payload;
use crate::queue::JobQueue;
use crate::retry::{Backoff, RetryConfig, classify_error};
use crate::tracker::StatusTracker;

/// What one dispatch pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs left pending because their printer was unavailable.
    pub deferred: usize,
}

impl DispatchSummary {
    pub fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.failed == 0 && self.deferred == 0
    }
}

pub struct Dispatcher<B: PrintBackend> {
    queue: Arc<JobQueue>,
    tracker: Arc<StatusTracker>,
    backend: Arc<B>,
    backoff: Backoff,
    poll_interval: Duration,
}

impl<B: PrintBackend> Dispatcher<B> {
    pub fn new(
        tracker: Arc<StatusTracker>,
        backend: Arc<B>,
        retry: RetryConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue: Arc::clone(tracker.queue()),
            tracker,
            backend,
            backoff: Backoff::new(retry),
            poll_interval,
        }
    }

    /// Dispatch until `shutdown` is notified.
    ///
    /// Wakes on every submission and at least once per poll interval, so
    /// printers in backoff are re-checked without new work arriving.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        info!(
            backend = self.backend.name(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "dispatcher started"
        );
        loop {
            let summary = self.dispatch_pending().await;
            if !summary.is_empty() {
                debug!(?summary, pending = self.queue.pending_count(), "dispatch pass");
            }

            let queue = Arc::clone(&self.queue);
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = queue.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("dispatcher stopped");
    }

    /// One pass over the pending jobs.
    pub async fn dispatch_pending(&mut self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut blocked: HashSet<String> = self
            .backoff
            .waiting_printers(Instant::now())
            .map(str::to_owned)
            .collect();

        while let Some(job) = self.queue.next_skipping(&blocked) {
            let handle = match self.check_printer(&job.printer).await {
                Ok(handle) => handle,
                Err(e) => {
                    if self.reject(&job, &e).is_some() {
                        summary.failed += 1;
                    }
                    continue;
                }
            };

            if !handle.availability.is_available() {
                self.defer(&job, handle.availability);
                blocked.insert(job.printer.clone());
                summary.deferred += 1;
                continue;
            }

            self.backoff.clear(&job.printer);
            match self.run_job(job, &mut blocked).await {
                Some(JobState::Succeeded) => summary.succeeded += 1,
                Some(JobState::Failed) => summary.failed += 1,
                _ => {}
            }
        }

        summary
    }

    /// Look up `printer` and record the result.
    ///
    /// A transient lookup error counts as offline. A permanent one (a
    /// printer name the backend can never address) is returned.
    async fn check_printer(&self, printer: &str) -> Result<PrinterHandle> {
        match self.backend.probe(printer).await {
            Ok(handle) => {
                self.tracker.record_printer(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let class = classify_error(&e);
                warn!(printer, error = %e, ?class, "printer check failed");
                let handle = PrinterHandle::new(printer, PrinterAvailability::Offline)
                    .with_detail(e.to_string());
                self.tracker.record_printer(handle.clone());
                match class {
                    ErrorClass::Transient => Ok(handle),
                    ErrorClass::Permanent => Err(e),
                }
            }
        }
    }

    fn defer(&mut self, job: &PrintJob, availability: PrinterAvailability) {
        let delay = self.backoff.defer(&job.printer, Instant::now());
        match self.queue.record_deferral(&job.id) {
            Ok(deferrals) => info!(
                job_id = %job.id,
                printer = %job.printer,
                %availability,
                deferrals,
                retry_in_ms = delay.as_millis() as u64,
                "printer unavailable, job stays pending"
            ),
            Err(e) => warn!(job_id = %job.id, error = %e, "could not record deferral"),
        }
    }

    /// Fail a job whose printer can never take it, without sending.
    fn reject(&self, job: &PrintJob, err: &PrintdError) -> Option<JobState> {
        let job = self.start(job)?;
        self.finish(&job, Err(err.to_string()))
    }

    /// Start, send and finish one job. Returns the final state, or `None`
    /// when the job could not be started.
    #[instrument(skip(self, job, blocked), fields(job_id = %job.id, printer = %job.printer))]
    async fn run_job(&mut self, job: PrintJob, blocked: &mut HashSet<String>) -> Option<JobState> {
        let job = self.start(&job)?;

        let outcome = match self.send(&job).await {
            Ok(backend_job_id) => Ok(backend_job_id),
            Err(e) => {
                if classify_error(&e) == ErrorClass::Transient {
                    self.lost_printer(&job.printer, &e);
                    blocked.insert(job.printer.clone());
                }
                Err(e.to_string())
            }
        };
        self.finish(&job, outcome)
    }

    /// The printer dropped out mid-send: mark it offline and back off so its
    /// later jobs wait for the next successful check.
    fn lost_printer(&mut self, printer: &str, err: &PrintdError) {
        let delay = self.backoff.defer(printer, Instant::now());
        self.tracker.record_printer(
            PrinterHandle::new(printer, PrinterAvailability::Offline).with_detail(err.to_string()),
        );
        warn!(
            printer,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "printer lost during send"
        );
    }

    fn start(&self, job: &PrintJob) -> Option<PrintJob> {
        match self.queue.begin(&job.id) {
            Ok(job) => {
                self.tracker.publish(&job);
                Some(job)
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "could not start job");
                None
            }
        }
    }

    fn finish(&self, job: &PrintJob, outcome: std::result::Result<Option<String>, String>) -> Option<JobState> {
        let finished = match outcome {
            Ok(backend_job_id) => self.queue.succeed(&job.id, backend_job_id),
            Err(detail) => self.queue.fail(&job.id, detail),
        };

        match finished {
            Ok(job) => {
                self.tracker.publish(&job);
                Some(job.state)
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "could not finish job");
                None
            }
        }
    }

    async fn send(&self, job: &PrintJob) -> Result<Option<String>> {
        let data = load_payload(job).await?;
        self.backend.submit(&job.printer, &job.title, data).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::payload::prepare_job;
    use crate::testing::ScriptedBackend;
    use printd_core::config::ServiceConfig;
    use printd_core::types::{JobId, Payload, PayloadKind};

    /// Retry immediately so every pass re-probes.
    fn no_backoff() -> RetryConfig {
        RetryConfig {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn setup(retry: RetryConfig) -> (Arc<ScriptedBackend>, Arc<StatusTracker>, Dispatcher<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new());
        let tracker = Arc::new(StatusTracker::new(
            Arc::new(JobQueue::new(1024)),
            &ServiceConfig::default(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&tracker),
            Arc::clone(&backend),
            retry,
            Duration::from_millis(10),
        );
        (backend, tracker, dispatcher)
    }

    async fn submit(tracker: &StatusTracker, printer: &str, title: &str) -> JobId {
        let job = prepare_job(printer, title, PayloadKind::Raw, Payload::inline(title.as_bytes().to_vec()))
            .await
            .expect("prepare");
        tracker.queue().submit(job).expect("submit")
    }

    fn state(tracker: &StatusTracker, id: &JobId) -> JobState {
        tracker.job_status(id).expect("job").state
    }

    #[tokio::test]
    async fn jobs_for_one_printer_go_out_in_submission_order() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);

        let a = submit(&tracker, "P1", "A").await;
        let b = submit(&tracker, "P1", "B").await;
        let c = submit(&tracker, "P1", "C").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary.succeeded, 3);
        assert_eq!(backend.submitted_titles(), vec!["A", "B", "C"]);
        for id in [a, b, c] {
            assert_eq!(state(&tracker, &id), JobState::Succeeded);
        }
        assert_eq!(
            tracker.job_status(&a).expect("a").backend_job_id.as_deref(),
            Some("P1-1")
        );
    }

    #[tokio::test]
    async fn offline_printer_keeps_job_pending_until_online() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Offline);
        let a = submit(&tracker, "P1", "A").await;

        for _ in 0..3 {
            let summary = dispatcher.dispatch_pending().await;
            assert_eq!(summary.deferred, 1);
            assert_eq!(state(&tracker, &a), JobState::Pending);
        }
        assert_eq!(tracker.job_status(&a).expect("a").deferrals, 3);
        assert_eq!(
            tracker.printer_status("P1").availability,
            PrinterAvailability::Offline
        );
        assert!(backend.submitted().is_empty());

        backend.set("P1", PrinterAvailability::Online);
        dispatcher.dispatch_pending().await;
        assert_eq!(state(&tracker, &a), JobState::Succeeded);
    }

    #[tokio::test]
    async fn busy_printer_holds_back_later_jobs_in_place() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Busy);
        let a = submit(&tracker, "P1", "A").await;
        let b = submit(&tracker, "P1", "B").await;

        dispatcher.dispatch_pending().await;
        // Only the head of the line is probed and counted.
        assert_eq!(backend.probes(), vec!["P1"]);
        assert_eq!(tracker.job_status(&a).expect("a").deferrals, 1);
        assert_eq!(tracker.job_status(&b).expect("b").deferrals, 0);

        backend.set("P1", PrinterAvailability::Online);
        dispatcher.dispatch_pending().await;
        assert_eq!(backend.submitted_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn unavailable_printer_does_not_block_others() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Offline);
        backend.set("P2", PrinterAvailability::Online);

        let a = submit(&tracker, "P1", "A").await;
        let b = submit(&tracker, "P2", "B").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary, DispatchSummary { succeeded: 1, failed: 0, deferred: 1 });
        assert_eq!(state(&tracker, &a), JobState::Pending);
        assert_eq!(state(&tracker, &b), JobState::Succeeded);
    }

    #[tokio::test]
    async fn failed_send_is_recorded_and_dispatch_continues() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);
        backend.set("P2", PrinterAvailability::Online);
        backend.fail_submits("P1");

        let a = submit(&tracker, "P1", "A").await;
        let b = submit(&tracker, "P2", "B").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);

        let failed = tracker.job_status(&a).expect("a");
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.error.is_some_and(|e| e.contains("media-jam")));
        assert_eq!(state(&tracker, &b), JobState::Succeeded);
    }

    #[tokio::test]
    async fn finished_jobs_never_change_again() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);
        backend.fail_submits("P1");
        let a = submit(&tracker, "P1", "A").await;

        dispatcher.dispatch_pending().await;
        assert_eq!(state(&tracker, &a), JobState::Failed);

        // Further passes find nothing to do and leave the job alone.
        assert!(dispatcher.dispatch_pending().await.is_empty());
        assert_eq!(state(&tracker, &a), JobState::Failed);
        assert_eq!(backend.submitted().len(), 1);
    }

    #[tokio::test]
    async fn backoff_skips_probing_until_the_window_passes() {
        let (backend, tracker, mut dispatcher) = setup(RetryConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        });
        backend.set("P1", PrinterAvailability::Offline);
        let a = submit(&tracker, "P1", "A").await;

        dispatcher.dispatch_pending().await;
        backend.set("P1", PrinterAvailability::Online);
        let summary = dispatcher.dispatch_pending().await;

        assert!(summary.is_empty());
        assert_eq!(backend.probes().len(), 1);
        assert_eq!(state(&tracker, &a), JobState::Pending);
    }

    #[tokio::test]
    async fn unreachable_scheduler_counts_as_offline() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.unreachable("P1");
        let a = submit(&tracker, "P1", "A").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary.deferred, 1);
        assert_eq!(state(&tracker, &a), JobState::Pending);
        let handle = tracker.printer_status("P1");
        assert_eq!(handle.availability, PrinterAvailability::Offline);
        assert!(handle.detail.is_some());
    }

    #[tokio::test]
    async fn misconfigured_printer_fails_its_job_unsent() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.misconfigured("Bad Queue");
        backend.set("P2", PrinterAvailability::Online);
        let a = submit(&tracker, "Bad Queue", "A").await;
        let b = submit(&tracker, "P2", "B").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary, DispatchSummary { succeeded: 1, failed: 1, deferred: 0 });

        let failed = tracker.job_status(&a).expect("a");
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.error.is_some_and(|e| e.contains("invalid printer URI")));
        assert_eq!(backend.submitted_titles(), vec!["B"]);
        assert_eq!(state(&tracker, &b), JobState::Succeeded);
    }

    #[tokio::test]
    async fn dropped_connection_fails_the_job_and_holds_back_the_rest() {
        let (backend, tracker, mut dispatcher) = setup(RetryConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        });
        backend.set("P1", PrinterAvailability::Online);
        backend.drop_connections("P1");
        let a = submit(&tracker, "P1", "A").await;
        let b = submit(&tracker, "P1", "B").await;

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 0);

        // Sent once, never resent.
        assert_eq!(state(&tracker, &a), JobState::Failed);
        assert_eq!(backend.submitted_titles(), vec!["A"]);

        // The printer is marked offline and its next job waits in line.
        assert_eq!(state(&tracker, &b), JobState::Pending);
        assert_eq!(
            tracker.printer_status("P1").availability,
            PrinterAvailability::Offline
        );
        assert!(dispatcher.dispatch_pending().await.is_empty());
        assert_eq!(backend.probes(), vec!["P1"]);
    }

    #[tokio::test]
    async fn changed_file_fails_the_job() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("job.prn");
        std::fs::write(&path, b"v1").expect("write");
        let job = prepare_job("P1", "doc", PayloadKind::Raw, Payload::file(&path))
            .await
            .expect("prepare");
        let id = tracker.queue().submit(job).expect("submit");
        std::fs::write(&path, b"v2").expect("rewrite");

        dispatcher.dispatch_pending().await;
        assert_eq!(state(&tracker, &id), JobState::Failed);
        assert!(backend.submitted().is_empty());
    }

    #[tokio::test]
    async fn transitions_are_published_in_order() {
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);
        let mut events = tracker.subscribe();
        let a = submit(&tracker, "P1", "A").await;

        dispatcher.dispatch_pending().await;
        let first = events.try_recv().expect("in progress");
        let second = events.try_recv().expect("succeeded");
        assert_eq!((first.job_id, first.state), (a, JobState::InProgress));
        assert_eq!((second.job_id, second.state), (a, JobState::Succeeded));
    }

    #[tokio::test]
    async fn concurrent_submissions_all_dispatch_once() {
        const N: usize = 64;
        let (backend, tracker, mut dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { submit(&tracker, "P1", &format!("job-{i}")).await })
            })
            .collect();
        let mut ids = HashSet::new();
        for task in tasks {
            assert!(ids.insert(task.await.expect("join")));
        }
        assert_eq!(ids.len(), N);

        let summary = dispatcher.dispatch_pending().await;
        assert_eq!(summary.succeeded, N);
        let titles: HashSet<String> = backend.submitted_titles().into_iter().collect();
        assert_eq!(titles.len(), N);
    }

    #[tokio::test]
    async fn run_loop_picks_up_new_jobs_and_stops_on_shutdown() {
        let (backend, tracker, dispatcher) = setup(no_backoff());
        backend.set("P1", PrinterAvailability::Online);
        let mut events = tracker.subscribe();

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(dispatcher.run(Arc::clone(&shutdown)));

        let a = submit(&tracker, "P1", "A").await;
        let done = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event");
                if event.job_id == a && event.state.is_terminal() {
                    return event.state;
                }
            }
        })
        .await
        .expect("job finished");
        assert_eq!(done, JobState::Succeeded);

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("stopped")
            .expect("join");
    }
}
