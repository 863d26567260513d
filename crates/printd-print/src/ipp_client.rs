// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP backend talking to the local CUPS scheduler.
//
// Uses the `ipp` crate's async API:
//   - CUPS-Get-Printers       (list queues)
//   - Get-Printer-Attributes  (RFC 8011 §4.2.5, availability)
//   - Print-Job               (RFC 8011 §4.2.1, raw payloads)

use std::io::Cursor;

use ipp::operation::IppOperation;
use ipp::prelude::*;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, error, info, instrument};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{PrinterAvailability, PrinterHandle};

use crate::backend::PrintBackend;

/// Document format that makes CUPS pass bytes straight to the device.
const RAW_FORMAT: &str = "application/vnd.cups-raw";

/// IPP `printer-state` enum values.
const STATE_IDLE: i32 = 3;
const STATE_PROCESSING: i32 = 4;

/// Characters escaped in a queue name used as one URI path segment.
const QUEUE_NAME: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub struct IppClient {
    /// `host:port` of the CUPS scheduler.
    host: String,
}

impl IppClient {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_owned(),
        }
    }

    fn scheduler_uri(&self) -> Result<Uri> {
        parse_uri(&format!("ipp://{}/", self.host))
    }

    /// `ipp://<host>/printers/<name>` for a CUPS queue, name percent-encoded.
    pub fn printer_uri(&self, printer: &str) -> Result<Uri> {
        let name = utf8_percent_encode(printer, QUEUE_NAME);
        parse_uri(&format!("ipp://{}/printers/{name}", self.host))
    }

    async fn send(&self, uri: Uri, operation: impl IppOperation, what: &str) -> Result<IppRequestResponse> {
        let client = AsyncIppClient::new(uri);
        let response = client
            .send(operation)
            .await
            .map_err(|e| PrintdError::Backend(format!("{what}: {e}")))?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            error!(status = ?code, "{what} failed");
            return Err(PrintdError::PrintFailure(format!(
                "{what} returned status {code:?}"
            )));
        }
        Ok(response)
    }
}

impl PrintBackend for IppClient {
    fn name(&self) -> &'static str {
        "ipp"
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn list_printers(&self) -> Result<Vec<String>> {
        let operation = IppOperationBuilder::cups().get_printers();
        let response = self
            .send(self.scheduler_uri()?, operation, "CUPS-Get-Printers")
            .await?;

        let names: Vec<String> = response
            .attributes()
            .groups_of(DelimiterTag::PrinterAttributes)
            .filter_map(|group| group.attributes().get("printer-name"))
            .map(|attr| attr.value().to_string())
            .collect();
        debug!(count = names.len(), "CUPS listed printers");
        Ok(names)
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn probe(&self, printer: &str) -> Result<PrinterHandle> {
        let uri = self.printer_uri(printer)?;
        let operation = IppOperationBuilder::get_printer_attributes(uri.clone()).build();
        let response = match self.send(uri, operation, "Get-Printer-Attributes").await {
            Ok(response) => response,
            // A status error means the scheduler answered but has no such queue.
            Err(PrintdError::PrintFailure(detail)) => {
                return Ok(PrinterHandle::new(printer, PrinterAvailability::Offline)
                    .with_detail(detail));
            }
            Err(e) => return Err(e),
        };

        let mut state = None;
        let mut reasons = Vec::new();
        for group in response.attributes().groups_of(DelimiterTag::PrinterAttributes) {
            let attributes = group.attributes();
            if let Some(attr) = attributes.get("printer-state")
                && let IppValue::Enum(value) = attr.value()
            {
                state = Some(*value);
            }
            if let Some(attr) = attributes.get("printer-state-reasons") {
                collect_keywords(attr.value(), &mut reasons);
            }
        }

        let availability = availability_from_ipp(state, &reasons);
        debug!(?state, ?reasons, %availability, "printer attributes");
        let handle = PrinterHandle::new(printer, availability);
        Ok(if reasons.is_empty() || reasons == ["none"] {
            handle
        } else {
            handle.with_detail(reasons.join(", "))
        })
    }

    #[instrument(skip(self, data), fields(host = %self.host, bytes = data.len()))]
    async fn submit(&self, printer: &str, title: &str, data: Vec<u8>) -> Result<Option<String>> {
        let uri = self.printer_uri(printer)?;
        let payload = IppPayload::new(Cursor::new(data));
        let operation = IppOperationBuilder::print_job(uri.clone(), payload)
            .job_title(title)
            .document_format(RAW_FORMAT)
            .build();

        let response = self.send(uri, operation, "Print-Job").await?;
        let job_id = extract_job_id(response.attributes());
        info!(?job_id, "print job accepted by scheduler");
        Ok(job_id.map(|id| format!("{printer}-{id}")))
    }
}

fn parse_uri(uri: &str) -> Result<Uri> {
    uri.parse()
        .map_err(|e| PrintdError::Config(format!("invalid printer URI '{uri}': {e}")))
}

fn collect_keywords(value: &IppValue, out: &mut Vec<String>) {
    match value {
        IppValue::Array(values) => values.iter().for_each(|v| collect_keywords(v, out)),
        other => out.push(other.to_string()),
    }
}

/// Map `printer-state` and `printer-state-reasons` onto availability.
///
/// Stopped printers, and any printer reporting `offline-report` or an
/// `*-error` reason, are offline even when the state says idle.
pub fn availability_from_ipp(state: Option<i32>, reasons: &[String]) -> PrinterAvailability {
    let faulted = reasons
        .iter()
        .any(|reason| reason == "offline-report" || reason.ends_with("-error"));
    match state {
        _ if faulted => PrinterAvailability::Offline,
        Some(STATE_IDLE) => PrinterAvailability::Online,
        Some(STATE_PROCESSING) => PrinterAvailability::Busy,
        _ => PrinterAvailability::Offline,
    }
}

/// Extract the `job-id` integer from a response's Job Attributes group.
fn extract_job_id(attrs: &IppAttributes) -> Option<i32> {
    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        if let Some(attr) = group.attributes().get("job-id")
            && let IppValue::Integer(id) = attr.value()
        {
            return Some(*id);
        }
    }
    None
}
