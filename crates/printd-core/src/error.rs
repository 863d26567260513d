// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printd.

use thiserror::Error;

use crate::types::{JobId, JobState, PrinterAvailability, PrinterRole};

/// Top-level error type for all printd operations.
#[derive(Debug, Error)]
pub enum PrintdError {
    // -- Dispatch errors --
    #[error("printer '{printer}' is {availability}")]
    PrinterUnavailable {
        printer: String,
        availability: PrinterAvailability,
    },

    #[error("print failed: {0}")]
    PrintFailure(String),

    #[error("print backend error: {0}")]
    Backend(String),

    #[error("no {0} printer configured")]
    NoPrinterConfigured(PrinterRole),

    // -- Submission errors --
    #[error("job queue is full ({capacity} unfinished jobs)")]
    QueueFull { capacity: usize },

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {job} cannot move from {from} to {to}")]
    InvalidTransition { job: JobId, from: JobState, to: JobState },

    #[error("payload changed since submission: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Service surface --
    #[error("server error: {0}")]
    Server(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintdError>;
