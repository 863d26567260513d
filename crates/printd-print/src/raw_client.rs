// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP print backend (JetDirect, port 9100).
//
// Open a socket and write the bytes. No job tracking and no status beyond
// "the port accepts connections", so a reachable printer counts as online.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use printd_core::error::{PrintdError, Result};
use printd_core::types::{PrinterAvailability, PrinterHandle};

use crate::backend::PrintBackend;

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

/// Timeout for sending a whole job.
const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Bytes written per `write_all` call.
const CHUNK_SIZE: usize = 8192;

pub struct RawClient {
    /// Printer name -> `host[:port]`.
    printers: HashMap<String, String>,
}

impl RawClient {
    pub fn new(printers: HashMap<String, String>) -> Self {
        Self { printers }
    }

    fn address(&self, printer: &str) -> Result<String> {
        let addr = self.printers.get(printer).ok_or_else(|| {
            PrintdError::PrintFailure(format!("printer {printer} has no raw address configured"))
        })?;
        Ok(with_default_port(addr))
    }
}

impl PrintBackend for RawClient {
    fn name(&self) -> &'static str {
        "raw"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.printers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn probe(&self, printer: &str) -> Result<PrinterHandle> {
        let addr = match self.address(printer) {
            Ok(addr) => addr,
            Err(e) => {
                return Ok(PrinterHandle::new(printer, PrinterAvailability::Offline)
                    .with_detail(e.to_string()));
            }
        };
        let handle = match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => PrinterHandle::new(printer, PrinterAvailability::Online),
            Ok(Err(e)) => PrinterHandle::new(printer, PrinterAvailability::Offline)
                .with_detail(format!("{addr}: {e}")),
            Err(_) => PrinterHandle::new(printer, PrinterAvailability::Offline)
                .with_detail(format!("{addr}: connect timed out")),
        };
        debug!(addr = %addr, availability = %handle.availability, "raw probe");
        Ok(handle)
    }

    async fn submit(&self, printer: &str, _title: &str, data: Vec<u8>) -> Result<Option<String>> {
        let addr = self.address(printer)?;
        send_raw(&addr, &data).await?;
        Ok(None)
    }
}

/// Append the JetDirect port when `addr` names only a host.
fn with_default_port(addr: &str) -> String {
    let addr = addr.trim();
    // Bracketed IPv6 without a port, or a bare host/IPv4.
    let has_port = match addr.rsplit_once(':') {
        Some((host, port)) => port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']')),
        None => false,
    };
    if has_port {
        addr.to_owned()
    } else {
        format!("{addr}:{RAW_PORT}")
    }
}

/// Send bytes to `addr` over raw TCP.
#[instrument(skip(data), fields(total = data.len()))]
pub async fn send_raw(addr: &str, data: &[u8]) -> Result<()> {
    info!(addr = %addr, "connecting via raw TCP");

    let mut stream = tokio::time::timeout(SEND_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            PrintdError::PrintFailure(format!(
                "raw TCP connection to {addr} timed out after {}s",
                SEND_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| PrintdError::PrintFailure(format!("raw TCP connect to {addr}: {e}")))?;

    let mut sent = 0usize;
    for chunk in data.chunks(CHUNK_SIZE) {
        stream.write_all(chunk).await.map_err(|e| {
            PrintdError::PrintFailure(format!("raw TCP send failed at byte {sent}: {e}"))
        })?;
        sent += chunk.len();
        debug!(sent, total = data.len(), "raw TCP progress");
    }

    stream
        .flush()
        .await
        .map_err(|e| PrintdError::PrintFailure(format!("raw TCP flush: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| PrintdError::PrintFailure(format!("raw TCP shutdown: {e}")))?;

    info!(total = data.len(), "raw TCP job sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn default_port_is_added() {
        assert_eq!(with_default_port("10.0.0.5"), "10.0.0.5:9100");
        assert_eq!(with_default_port("10.0.0.5:9101"), "10.0.0.5:9101");
        assert_eq!(with_default_port("[::1]"), "[::1]:9100");
        assert_eq!(with_default_port("[::1]:9200"), "[::1]:9200");
    }

    #[tokio::test]
    async fn bytes_reach_the_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let reader = tokio::spawn(async move {
            // First connection is the probe, second carries the job.
            let mut received = Vec::new();
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.expect("accept");
                received.clear();
                socket.read_to_end(&mut received).await.expect("read");
            }
            received
        });

        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let client = RawClient::new(HashMap::from([("P1".to_string(), addr)]));
        assert_eq!(
            client.probe("P1").await.expect("probe").availability,
            PrinterAvailability::Online
        );
        client.submit("P1", "t", data.clone()).await.expect("submit");

        assert_eq!(reader.await.expect("join"), data);
    }

    #[tokio::test]
    async fn unconfigured_printer_is_offline_and_cannot_print() {
        let client = RawClient::new(HashMap::new());
        let handle = client.probe("Ghost").await.expect("probe");
        assert_eq!(handle.availability, PrinterAvailability::Offline);
        assert!(matches!(
            client.submit("Ghost", "t", b"x".to_vec()).await,
            Err(PrintdError::PrintFailure(_))
        ));
    }
}
