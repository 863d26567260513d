// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain TCP availability probe for legacy point-of-sale clients.
//
// A client sends one message (at most 4096 bytes), typically
// `{"type": "label"}` or `{"type": "receipt"}`, and gets back `OK` or
// `ERROR: <Role> printer not available`. Anything that is not such a message
// is answered `OK`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use printd_core::error::Result;
use printd_core::types::PrinterRole;

use crate::server::ConnectionHandler;
use crate::tracker::StatusTracker;

const READ_LIMIT: usize = 4096;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Answer for one probe message.
pub fn probe_response(data: &[u8], tracker: &StatusTracker) -> String {
    let role = serde_json::from_slice::<Value>(data)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned))
        .and_then(|kind| match kind.as_str() {
            "label" => Some(PrinterRole::Label),
            "receipt" => Some(PrinterRole::Receipt),
            _ => None,
        });

    let Some(role) = role else {
        return "OK".into();
    };
    let available = tracker
        .printer_for_role(role)
        .map(|name| tracker.printer_status(name).availability.is_available())
        .unwrap_or(false);
    if available {
        "OK".into()
    } else {
        format!("ERROR: {} printer not available", role.display_name())
    }
}

pub struct SocketProbe {
    tracker: Arc<StatusTracker>,
}

impl SocketProbe {
    pub fn new(tracker: Arc<StatusTracker>) -> Self {
        Self { tracker }
    }
}

impl ConnectionHandler for SocketProbe {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut buf = vec![0u8; READ_LIMIT];
        let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                warn!(peer = %peer, "probe client sent nothing");
                return Ok(());
            }
        };
        if n == 0 {
            debug!(peer = %peer, "empty probe");
            return Ok(());
        }

        let response = probe_response(&buf[..n], &self.tracker);
        info!(peer = %peer, %response, "probe answered");
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobQueue;
    use crate::server::LocalServer;
    use printd_core::config::ServiceConfig;
    use printd_core::types::{PrinterAvailability, PrinterHandle};

    fn tracker() -> StatusTracker {
        let config = ServiceConfig {
            label_printer: "Back_LabelPrinter".into(),
            ..Default::default()
        };
        StatusTracker::new(Arc::new(JobQueue::new(4)), &config)
    }

    #[test]
    fn non_json_and_untyped_messages_are_ok() {
        let tracker = tracker();
        assert_eq!(probe_response(b"hello", &tracker), "OK");
        assert_eq!(probe_response(br#"{"foo":1}"#, &tracker), "OK");
        assert_eq!(probe_response(br#"{"type":"laser"}"#, &tracker), "OK");
    }

    #[test]
    fn role_probe_follows_printer_availability() {
        let tracker = tracker();
        assert_eq!(
            probe_response(br#"{"type":"label"}"#, &tracker),
            "ERROR: Label printer not available"
        );

        tracker.record_printer(PrinterHandle::new("Back_LabelPrinter", PrinterAvailability::Online));
        assert_eq!(probe_response(br#"{"type":"label"}"#, &tracker), "OK");

        tracker.record_printer(PrinterHandle::new("Back_LabelPrinter", PrinterAvailability::Busy));
        assert_eq!(
            probe_response(br#"{"type":"label"}"#, &tracker),
            "ERROR: Label printer not available"
        );
    }

    #[test]
    fn unconfigured_role_is_not_available() {
        assert_eq!(
            probe_response(br#"{"type":"receipt"}"#, &tracker()),
            "ERROR: Receipt printer not available"
        );
    }

    #[tokio::test]
    async fn answers_over_tcp() {
        let mut server = LocalServer::new("socket", ([127, 0, 0, 1], 0).into());
        server
            .start(Arc::new(SocketProbe::new(Arc::new(tracker()))))
            .await
            .expect("start");
        let addr = server.local_addr().expect("addr");

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client.write_all(br#"{"type":"receipt"}"#).await.expect("write");
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.expect("read");
        assert_eq!(reply, "ERROR: Receipt printer not available");

        server.stop().await.expect("stop");
    }
}
