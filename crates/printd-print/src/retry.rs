// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error classification and per-printer backoff for the dispatcher.
//
// Jobs are never resent after a send failure. What backs off is the printer
// check: while a printer stays unavailable, or after it dropped a connection
// mid-send, the dispatcher waits exponentially longer before asking again,
// and its jobs stay pending.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use printd_core::config::ServiceConfig;
use printd_core::error::PrintdError;
use printd_core::types::ErrorClass;
use tracing::debug;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first unavailable probe.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&ServiceConfig> for RetryConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

/// Classify a `PrintdError` into an `ErrorClass`.
///
/// A transient error while checking a printer leaves the job pending; a
/// permanent one is recorded on the job. After a send, either class fails
/// the job, and a transient one also puts the printer into backoff.
pub fn classify_error(err: &PrintdError) -> ErrorClass {
    match err {
        PrintdError::PrinterUnavailable { .. } => ErrorClass::Transient,
        PrintdError::Backend(_) => ErrorClass::Transient,

        PrintdError::PrintFailure(_)
        | PrintdError::NoPrinterConfigured(_)
        | PrintdError::QueueFull { .. }
        | PrintdError::InvalidJob(_)
        | PrintdError::JobNotFound(_)
        | PrintdError::InvalidTransition { .. }
        | PrintdError::IntegrityMismatch { .. }
        | PrintdError::Server(_)
        | PrintdError::Config(_)
        | PrintdError::Serialization(_) => ErrorClass::Permanent,

        PrintdError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        },
    }
}

/// Exponential backoff delay with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
pub fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    Duration::from_millis(total_ms.min(config.max_delay.as_millis() as u64))
}

/// Deterministic spread across [0, base).
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[derive(Debug, Clone, Copy)]
struct Waiting {
    attempts: u32,
    until: Instant,
}

/// Per-printer probe backoff.
#[derive(Debug, Default)]
pub struct Backoff {
    config: RetryConfig,
    printers: HashMap<String, Waiting>,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            printers: HashMap::new(),
        }
    }

    /// Record another unavailable probe for `printer` and return how long to
    /// wait before probing it again.
    pub fn defer(&mut self, printer: &str, now: Instant) -> Duration {
        let attempts = self.attempts(printer);
        let delay = compute_delay(attempts, &self.config);
        self.printers.insert(
            printer.to_owned(),
            Waiting {
                attempts: attempts + 1,
                until: now + delay,
            },
        );
        debug!(printer, attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "printer backing off");
        delay
    }

    /// Whether `printer` is still inside its backoff window.
    pub fn is_waiting(&self, printer: &str, now: Instant) -> bool {
        self.printers
            .get(printer)
            .is_some_and(|waiting| now < waiting.until)
    }

    /// Printers currently inside their backoff window.
    pub fn waiting_printers(&self, now: Instant) -> impl Iterator<Item = &str> {
        self.printers
            .iter()
            .filter(move |(_, waiting)| now < waiting.until)
            .map(|(name, _)| name.as_str())
    }

    /// Earliest moment any waiting printer may be probed again.
    pub fn next_wake(&self) -> Option<Instant> {
        self.printers.values().map(|waiting| waiting.until).min()
    }

    /// Forget the backoff for `printer` once it is reachable again.
    pub fn clear(&mut self, printer: &str) {
        if self.printers.remove(printer).is_some() {
            debug!(printer, "printer backoff cleared");
        }
    }

    /// Consecutive unavailable probes recorded for `printer`.
    pub fn attempts(&self, printer: &str) -> u32 {
        self.printers.get(printer).map_or(0, |waiting| waiting.attempts)
    }
}
