// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS backend driven through the `lp` and `lpstat` command-line tools.
//
// Jobs are submitted with `-o raw` so TSPL and ESC/POS byte streams reach
// the printer untouched. The payload is fed on stdin; nothing is written to
// a temporary file.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{PrinterAvailability, PrinterHandle};

use crate::backend::PrintBackend;

/// Upper bound on any single `lp`/`lpstat` invocation.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct CupsClient {
    /// `host:port` of the CUPS scheduler, passed as `-h`.
    host: String,
}

impl CupsClient {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_owned(),
        }
    }

    async fn run(&self, program: &str, args: &[&str], stdin: Option<Vec<u8>>) -> Result<String> {
        let mut command = Command::new(program);
        command
            .arg("-h")
            .arg(&self.host)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| PrintdError::Backend(format!("cannot run {program}: {e}")))?;

        if let Some(bytes) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(&bytes).await?;
            pipe.shutdown().await?;
        }

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                PrintdError::Backend(format!(
                    "{program} timed out after {}s",
                    COMMAND_TIMEOUT.as_secs()
                ))
            })??;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(PrintdError::PrintFailure(if stderr.is_empty() {
                format!("{program} exited with {}", output.status)
            } else {
                stderr
            }))
        }
    }
}

impl PrintBackend for CupsClient {
    fn name(&self) -> &'static str {
        "cups"
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn list_printers(&self) -> Result<Vec<String>> {
        let stdout = self.run("lpstat", &["-p"], None).await?;
        let names: Vec<String> = parse_lpstat(&stdout)
            .into_iter()
            .map(|status| status.name)
            .collect();
        debug!(count = names.len(), "lpstat listed printers");
        Ok(names)
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn probe(&self, printer: &str) -> Result<PrinterHandle> {
        let stdout = match self.run("lpstat", &["-p", printer], None).await {
            Ok(stdout) => stdout,
            // lpstat exits non-zero for printers the scheduler does not know.
            Err(PrintdError::PrintFailure(detail)) => {
                return Ok(PrinterHandle::new(printer, PrinterAvailability::Offline)
                    .with_detail(detail));
            }
            Err(e) => return Err(e),
        };

        let status = parse_lpstat(&stdout)
            .into_iter()
            .find(|status| status.name == printer);
        Ok(match status {
            Some(status) => {
                let handle = PrinterHandle::new(printer, status.availability);
                match status.detail {
                    Some(detail) => handle.with_detail(detail),
                    None => handle,
                }
            }
            None => PrinterHandle::new(printer, PrinterAvailability::Offline)
                .with_detail("not listed by lpstat"),
        })
    }

    #[instrument(skip(self, data), fields(host = %self.host, bytes = data.len()))]
    async fn submit(&self, printer: &str, title: &str, data: Vec<u8>) -> Result<Option<String>> {
        let stdout = self
            .run("lp", &["-d", printer, "-o", "raw", "-t", title], Some(data))
            .await?;
        let request_id = parse_request_id(&stdout);
        match &request_id {
            Some(id) => info!(request_id = %id, "lp accepted job"),
            None => warn!(output = %stdout.trim(), "lp accepted job without a request id"),
        }
        Ok(request_id)
    }
}

/// One printer entry from `lpstat -p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpstatPrinter {
    pub name: String,
    pub availability: PrinterAvailability,
    /// Indented lines following the entry (alerts, reasons), joined by `; `.
    pub detail: Option<String>,
}

/// Parse `lpstat -p` output.
///
/// Entry lines look like `printer Till is idle.  enabled since ...`,
/// `printer Till now printing Till-12.  enabled since ...` or
/// `printer Till disabled since ...`.
pub fn parse_lpstat(output: &str) -> Vec<LpstatPrinter> {
    let mut printers: Vec<LpstatPrinter> = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("printer ") {
            let rest = rest.trim_start();
            let Some(name) = rest.split_whitespace().next() else {
                continue;
            };
            let state = &rest[name.len()..];
            let availability = if state.contains("disabled") {
                PrinterAvailability::Offline
            } else if state.contains("now printing") {
                PrinterAvailability::Busy
            } else if state.contains("is idle") {
                PrinterAvailability::Online
            } else {
                PrinterAvailability::Offline
            };
            printers.push(LpstatPrinter {
                name: name.to_owned(),
                availability,
                detail: None,
            });
        } else if line.starts_with([' ', '\t'])
            && let Some(last) = printers.last_mut()
        {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            last.detail = Some(match last.detail.take() {
                Some(existing) => format!("{existing}; {text}"),
                None => text.to_owned(),
            });
        }
    }

    printers
}

/// Extract `Till-42` from `request id is Till-42 (1 file(s))`.
pub fn parse_request_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("request id is "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LPSTAT: &str = "\
printer Till_ReceiptPrinter is idle.  enabled since Mon 02 Mar 2026 09:00:00
printer Back_LabelPrinter now printing Back_LabelPrinter-17.  enabled since Mon 02 Mar 2026 09:00:00
printer Office disabled since Mon 02 Mar 2026 09:00:00 -
\tPaused
\tAlerts: offline-report
";

    #[test]
    fn lpstat_states_map_to_availability() {
        let printers = parse_lpstat(LPSTAT);
        assert_eq!(printers.len(), 3);
        assert_eq!(printers[0].name, "Till_ReceiptPrinter");
        assert_eq!(printers[0].availability, PrinterAvailability::Online);
        assert_eq!(printers[1].availability, PrinterAvailability::Busy);
        assert_eq!(printers[2].availability, PrinterAvailability::Offline);
    }

    #[test]
    fn indented_lines_become_detail() {
        let printers = parse_lpstat(LPSTAT);
        assert_eq!(printers[0].detail, None);
        assert_eq!(
            printers[2].detail.as_deref(),
            Some("Paused; Alerts: offline-report")
        );
    }

    #[test]
    fn empty_output_lists_nothing() {
        assert!(parse_lpstat("").is_empty());
        assert!(parse_lpstat("lpstat: No destinations added.\n").is_empty());
    }

    #[test]
    fn request_id_is_extracted() {
        assert_eq!(
            parse_request_id("request id is Till_ReceiptPrinter-42 (1 file(s))\n").as_deref(),
            Some("Till_ReceiptPrinter-42")
        );
        assert_eq!(parse_request_id(""), None);
    }
}
