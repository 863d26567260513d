// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Building jobs from caller input and loading their bytes at dispatch time.

use std::io::ErrorKind;

use tracing::{debug, instrument};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{Payload, PayloadKind, PrintJob};

use crate::integrity::{hash_bytes, verify_hash};

/// Validate caller input and build a `Pending` job ready for the queue.
///
/// File payloads are read once here so the digest can be recorded; they are
/// read again (and checked against the digest) when the job is dispatched.
#[instrument(skip(payload), fields(printer = %printer))]
pub async fn prepare_job(
    printer: &str,
    title: &str,
    kind: PayloadKind,
    payload: Payload,
) -> Result<PrintJob> {
    let printer = printer.trim();
    if printer.is_empty() {
        return Err(PrintdError::InvalidJob("printer name is empty".into()));
    }

    let bytes = read_payload(&payload).await?;
    if bytes.is_empty() {
        return Err(PrintdError::InvalidJob("payload is empty".into()));
    }

    let title = if title.trim().is_empty() {
        default_title(kind)
    } else {
        title.trim()
    };

    debug!(bytes = bytes.len(), "payload accepted");
    Ok(PrintJob::new(
        printer,
        title,
        kind,
        payload,
        hash_bytes(&bytes),
        bytes.len() as u64,
    ))
}

/// Load the bytes a job should send, refusing files changed since submission.
pub async fn load_payload(job: &PrintJob) -> Result<Vec<u8>> {
    let bytes = read_payload(&job.payload).await?;
    verify_hash(&bytes, &job.payload_hash)?;
    Ok(bytes)
}

async fn read_payload(payload: &Payload) -> Result<Vec<u8>> {
    match payload {
        Payload::Inline { bytes } => Ok(bytes.clone()),
        Payload::File { path } => tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                PrintdError::InvalidJob(format!("payload file {} not found", path.display()))
            }
            _ => PrintdError::Io(e),
        }),
    }
}

fn default_title(kind: PayloadKind) -> &'static str {
    match kind {
        PayloadKind::Raw => "printd job",
        PayloadKind::Label => "Label Print",
        PayloadKind::Receipt => "Receipt Print",
    }
}
