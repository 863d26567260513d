// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted in-memory backend shared by the crate's tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use printd_core::error::{PrintdError, Result};
use printd_core::types::{PrinterAvailability, PrinterHandle};

use crate::backend::PrintBackend;

/// One job handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub printer: String,
    pub title: String,
    pub data: Vec<u8>,
}

/// Backend whose printers and failures are set by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    availability: Mutex<HashMap<String, PrinterAvailability>>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
    misconfigured: Mutex<HashSet<String>>,
    dropping: Mutex<HashSet<String>>,
    probes: Mutex<Vec<String>>,
    submitted: Mutex<Vec<Submitted>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, printer: &str, availability: PrinterAvailability) {
        self.availability
            .lock()
            .expect("lock")
            .insert(printer.to_owned(), availability);
    }

    /// Make every submit to `printer` fail.
    pub fn fail_submits(&self, printer: &str) {
        self.failing.lock().expect("lock").insert(printer.to_owned());
    }

    /// Make every probe of `printer` return an error.
    pub fn unreachable(&self, printer: &str) {
        self.unreachable.lock().expect("lock").insert(printer.to_owned());
    }

    /// Make every lookup of `printer` fail as a configuration error.
    pub fn misconfigured(&self, printer: &str) {
        self.misconfigured.lock().expect("lock").insert(printer.to_owned());
    }

    /// Make every submit to `printer` lose its connection part-way.
    pub fn drop_connections(&self, printer: &str) {
        self.dropping.lock().expect("lock").insert(printer.to_owned());
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().expect("lock").clone()
    }

    pub fn submitted_titles(&self) -> Vec<String> {
        self.submitted().into_iter().map(|s| s.title).collect()
    }

    /// Printers probed so far, in order.
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().expect("lock").clone()
    }
}

impl PrintBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.availability.lock().expect("lock").keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn probe(&self, printer: &str) -> Result<PrinterHandle> {
        self.probes.lock().expect("lock").push(printer.to_owned());
        if self.unreachable.lock().expect("lock").contains(printer) {
            return Err(PrintdError::Backend("scheduler unreachable".into()));
        }
        if self.misconfigured.lock().expect("lock").contains(printer) {
            return Err(PrintdError::Config(format!("invalid printer URI for '{printer}'")));
        }
        let availability = self
            .availability
            .lock()
            .expect("lock")
            .get(printer)
            .copied()
            .unwrap_or(PrinterAvailability::Offline);
        Ok(PrinterHandle::new(printer, availability))
    }

    async fn submit(&self, printer: &str, title: &str, data: Vec<u8>) -> Result<Option<String>> {
        let mut submitted = self.submitted.lock().expect("lock");
        submitted.push(Submitted {
            printer: printer.to_owned(),
            title: title.to_owned(),
            data,
        });
        if self.failing.lock().expect("lock").contains(printer) {
            return Err(PrintdError::PrintFailure("media-jam".into()));
        }
        if self.dropping.lock().expect("lock").contains(printer) {
            return Err(PrintdError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )));
        }
        Ok(Some(format!("{printer}-{}", submitted.len())))
    }
}
