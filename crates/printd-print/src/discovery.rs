// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Periodic discovery of the printers installed on this host.
//
// Every cycle lists the print subsystem's queues, probes each one plus every
// configured role printer, and hands the fresh handles to the status
// tracker. Configured printers that are not installed are reported offline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use printd_core::types::{PrinterAvailability, PrinterHandle, PrinterRole};

use crate::backend::PrintBackend;
use crate::tracker::StatusTracker;

/// The role a printer's system name suggests, from the `ReceiptPrinter` /
/// `LabelPrinter` naming convention.
pub fn suggested_role(name: &str) -> Option<PrinterRole> {
    [PrinterRole::Receipt, PrinterRole::Label]
        .into_iter()
        .find(|role| name.contains(role.name_marker()))
}

/// Printers whose names mark them as suitable for `role`.
pub fn filter_role<'a>(names: &'a [String], role: PrinterRole) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| name.contains(role.name_marker()))
        .map(String::as_str)
        .collect()
}

pub struct PrinterDiscovery<B: PrintBackend> {
    backend: Arc<B>,
    tracker: Arc<StatusTracker>,
}

impl<B: PrintBackend> PrinterDiscovery<B> {
    pub fn new(backend: Arc<B>, tracker: Arc<StatusTracker>) -> Self {
        Self { backend, tracker }
    }

    /// Run one discovery cycle and return every known printer.
    pub async fn refresh(&self) -> Vec<PrinterHandle> {
        let installed: Option<BTreeSet<String>> = match self.backend.list_printers().await {
            Ok(names) => Some(names.into_iter().collect()),
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "cannot list printers");
                None
            }
        };

        let mut targets: BTreeSet<String> = installed.clone().unwrap_or_default();
        targets.extend(self.tracker.configured_printers().map(str::to_owned));

        for name in targets {
            let handle = match &installed {
                Some(list) if !list.contains(&name) => {
                    PrinterHandle::new(&name, PrinterAvailability::Offline)
                        .with_detail("not installed on this host")
                }
                _ => match self.backend.probe(&name).await {
                    Ok(handle) => handle,
                    Err(e) => PrinterHandle::new(&name, PrinterAvailability::Offline)
                        .with_detail(e.to_string()),
                },
            };
            let availability = handle.availability;
            if let Some(previous) = self.tracker.record_printer(handle) {
                info!(printer = %name, from = %previous, to = %availability, "printer availability changed");
            }
        }

        let printers = self.tracker.printers();
        debug!(count = printers.len(), "discovery cycle complete");
        printers
    }

    /// Refresh every `interval` until `shutdown` is notified.
    pub async fn run(self, interval: Duration, shutdown: Arc<Notify>) {
        info!(interval_secs = interval.as_secs(), "printer discovery started");
        loop {
            self.refresh().await;
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("printer discovery stopped");
    }
}
