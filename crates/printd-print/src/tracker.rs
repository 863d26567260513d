// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Read-only status views over jobs and printers.
//
// The tracker never mutates a job. Printer availability is written only by
// the dispatcher and discovery task (crate-private `record_printer`).

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use printd_core::config::ServiceConfig;
use printd_core::error::{PrintdError, Result};
use printd_core::types::{
    JobEvent, JobId, PrintJob, PrinterAvailability, PrinterHandle, PrinterRole,
};

use crate::queue::JobQueue;

/// Capacity of the job event channel. Slow subscribers lose the oldest events.
const EVENT_CAPACITY: usize = 64;

pub struct StatusTracker {
    queue: Arc<JobQueue>,
    printers: RwLock<HashMap<String, PrinterHandle>>,
    /// Configured role assignments, keyed by printer name.
    roles: HashMap<String, PrinterRole>,
    receipt_printer: Option<String>,
    label_printer: Option<String>,
    events: broadcast::Sender<JobEvent>,
}

impl StatusTracker {
    pub fn new(queue: Arc<JobQueue>, config: &ServiceConfig) -> Self {
        let receipt_printer = config
            .printer_for_role(PrinterRole::Receipt)
            .map(str::to_owned);
        let label_printer = config.printer_for_role(PrinterRole::Label).map(str::to_owned);

        let roles = [
            (receipt_printer.clone(), PrinterRole::Receipt),
            (label_printer.clone(), PrinterRole::Label),
        ]
        .into_iter()
        .filter_map(|(name, role)| name.map(|n| (n, role)))
        .collect();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            queue,
            printers: RwLock::new(HashMap::new()),
            roles,
            receipt_printer,
            label_printer,
            events,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Last known availability of `printer`.
    ///
    /// A printer that has never been probed is reported `Offline` with no
    /// `last_checked` timestamp.
    pub fn printer_status(&self, printer: &str) -> PrinterHandle {
        let known = self
            .printers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(printer)
            .cloned();
        known.unwrap_or_else(|| {
            PrinterHandle::unknown(printer).with_role(self.roles.get(printer).copied())
        })
    }

    /// Every printer seen so far plus every configured one, sorted by name.
    pub fn printers(&self) -> Vec<PrinterHandle> {
        let mut all: HashMap<String, PrinterHandle> = self
            .printers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (name, role) in &self.roles {
            all.entry(name.clone())
                .or_insert_with(|| PrinterHandle::unknown(name.clone()).with_role(Some(*role)));
        }
        let mut list: Vec<_> = all.into_values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn job_status(&self, id: &JobId) -> Result<PrintJob> {
        self.queue.get(id).ok_or(PrintdError::JobNotFound(*id))
    }

    pub fn jobs(&self) -> Vec<PrintJob> {
        self.queue.jobs()
    }

    /// Receive a [`JobEvent`] for every state change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// The printer configured for `role`.
    pub fn printer_for_role(&self, role: PrinterRole) -> Result<&str> {
        let name = match role {
            PrinterRole::Receipt => self.receipt_printer.as_deref(),
            PrinterRole::Label => self.label_printer.as_deref(),
        };
        name.ok_or(PrintdError::NoPrinterConfigured(role))
    }

    pub fn role_of(&self, printer: &str) -> Option<PrinterRole> {
        self.roles.get(printer).copied()
    }

    /// Names of the printers assigned a role in configuration.
    pub fn configured_printers(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Store a freshly probed handle. Returns the previous availability when
    /// it changed.
    pub(crate) fn record_printer(&self, handle: PrinterHandle) -> Option<PrinterAvailability> {
        let handle = match handle.role {
            Some(_) => handle,
            None => {
                let role = self.role_of(&handle.name);
                handle.with_role(role)
            }
        };
        let mut printers = self.printers.write().unwrap_or_else(PoisonError::into_inner);
        let previous = printers
            .insert(handle.name.clone(), handle.clone())
            .map(|old| old.availability);
        match previous {
            Some(old) if old == handle.availability => None,
            Some(old) => {
                debug!(printer = %handle.name, from = %old, to = %handle.availability, "availability changed");
                Some(old)
            }
            None => {
                debug!(printer = %handle.name, availability = %handle.availability, "printer first seen");
                None
            }
        }
    }

    /// Broadcast a state change. Having no subscribers is not an error.
    pub(crate) fn publish(&self, job: &PrintJob) {
        let _ = self.events.send(JobEvent::from_job(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printd_core::types::{JobState, Payload, PayloadKind};

    fn tracker() -> StatusTracker {
        let config = ServiceConfig {
            receipt_printer: "Till_ReceiptPrinter".into(),
            ..Default::default()
        };
        StatusTracker::new(Arc::new(JobQueue::new(8)), &config)
    }

    #[test]
    fn unknown_printer_reads_as_offline() {
        let tracker = tracker();
        let handle = tracker.printer_status("Nowhere");
        assert_eq!(handle.availability, PrinterAvailability::Offline);
        assert!(handle.last_checked.is_none());
    }

    #[test]
    fn configured_printers_are_listed_before_probing() {
        let tracker = tracker();
        let printers = tracker.printers();
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].name, "Till_ReceiptPrinter");
        assert_eq!(printers[0].role, Some(PrinterRole::Receipt));
    }

    #[test]
    fn record_printer_reports_changes_only() {
        let tracker = tracker();
        let name = "Till_ReceiptPrinter";
        assert_eq!(
            tracker.record_printer(PrinterHandle::new(name, PrinterAvailability::Offline)),
            None
        );
        assert_eq!(
            tracker.record_printer(PrinterHandle::new(name, PrinterAvailability::Offline)),
            None
        );
        assert_eq!(
            tracker.record_printer(PrinterHandle::new(name, PrinterAvailability::Online)),
            Some(PrinterAvailability::Offline)
        );

        let handle = tracker.printer_status(name);
        assert_eq!(handle.availability, PrinterAvailability::Online);
        assert_eq!(handle.role, Some(PrinterRole::Receipt));
        assert!(handle.last_checked.is_some());
    }

    #[test]
    fn missing_role_is_an_error() {
        let tracker = tracker();
        assert_eq!(
            tracker.printer_for_role(PrinterRole::Receipt).expect("receipt"),
            "Till_ReceiptPrinter"
        );
        assert!(matches!(
            tracker.printer_for_role(PrinterRole::Label),
            Err(PrintdError::NoPrinterConfigured(PrinterRole::Label))
        ));
    }

    #[test]
    fn unknown_job_is_not_found() {
        let tracker = tracker();
        assert!(matches!(
            tracker.job_status(&JobId::new()),
            Err(PrintdError::JobNotFound(_))
        ));
    }

    #[test]
    fn job_status_reflects_queue() {
        let tracker = tracker();
        let job = PrintJob::new("P1", "t", PayloadKind::Raw, Payload::inline(b"x".to_vec()), "h".into(), 1);
        let id = tracker.queue().submit(job).expect("submit");
        assert_eq!(tracker.job_status(&id).expect("status").state, JobState::Pending);
    }

    #[test]
    fn subscribers_receive_published_events() {
        let tracker = tracker();
        let mut rx = tracker.subscribe();
        let job = PrintJob::new("P1", "t", PayloadKind::Raw, Payload::inline(b"x".to_vec()), "h".into(), 1);
        tracker.publish(&job);
        let event = rx.try_recv().expect("event");
        assert_eq!(event.job_id, job.id);
        assert_eq!(event.state, JobState::Pending);
    }
}
