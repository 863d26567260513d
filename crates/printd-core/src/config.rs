// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration, persisted as `settings.json`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{PrintdError, Result};
use crate::types::PrinterRole;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE: &str = "settings.json";

/// Which OS print subsystem the dispatcher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CUPS command-line tools (`lp`, `lpstat`).
    Cups,
    /// IPP requests to the local CUPS daemon.
    Ipp,
    /// Raw TCP (JetDirect) to addresses listed in `raw_printers`.
    Raw,
}

/// Persistent service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// System name of the label printer (empty = none selected).
    pub label_printer: String,
    /// Label stock size, e.g. `"40x30mm"`.
    pub label_size: String,
    /// System name of the receipt printer (empty = none selected).
    pub receipt_printer: String,
    /// Receipt paper width, e.g. `"80mm"`.
    pub receipt_width: String,
    /// Port for the socket status probe.
    pub socket_port: u16,
    /// Port for the HTTP API.
    pub http_port: u16,
    /// Interface the listeners bind to.
    pub bind_address: IpAddr,
    pub backend: BackendKind,
    /// `host:port` of the CUPS daemon used by the IPP backend.
    pub cups_host: String,
    /// Printer name -> `host:port` for the raw backend.
    pub raw_printers: HashMap<String, String>,
    /// Maximum number of unfinished jobs held at once.
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub discovery_interval_secs: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            label_printer: String::new(),
            label_size: "40x30mm".into(),
            receipt_printer: String::new(),
            receipt_width: "80mm".into(),
            socket_port: 8420,
            http_port: 8520,
            bind_address: IpAddr::from([127, 0, 0, 1]),
            backend: BackendKind::Cups,
            cups_host: "localhost:631".into(),
            raw_printers: HashMap::new(),
            queue_capacity: 256,
            poll_interval_ms: 500,
            discovery_interval_secs: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl ServiceConfig {
    /// Load settings from `path`.
    ///
    /// A missing file is created with the defaults. A file that cannot be
    /// parsed is logged and the defaults are used without overwriting it.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "wrote default settings");
            return Ok(config);
        }

        let data = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Self>(&data) {
            Ok(config) => {
                config.validate()?;
                info!(path = %path.display(), "settings loaded");
                Ok(config)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "unreadable settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Persist settings atomically (write a temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(PrintdError::Config("queue_capacity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(PrintdError::Config("poll_interval_ms must be at least 1".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(PrintdError::Config(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }
        if self.socket_port == self.http_port {
            return Err(PrintdError::Config(format!(
                "socket_port and http_port are both {}",
                self.http_port
            )));
        }
        parse_label_size(&self.label_size)?;
        Ok(())
    }

    /// The configured printer for a role, if one is selected.
    pub fn printer_for_role(&self, role: PrinterRole) -> Option<&str> {
        let name = match role {
            PrinterRole::Receipt => self.receipt_printer.as_str(),
            PrinterRole::Label => self.label_printer.as_str(),
        };
        (!name.trim().is_empty()).then_some(name)
    }

    /// The role a printer has been assigned, if any.
    pub fn role_of(&self, printer: &str) -> Option<PrinterRole> {
        [PrinterRole::Receipt, PrinterRole::Label]
            .into_iter()
            .find(|role| self.printer_for_role(*role) == Some(printer))
    }

    /// Label width and height in millimetres.
    pub fn label_dimensions_mm(&self) -> Result<(u32, u32)> {
        parse_label_size(&self.label_size)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs.max(1))
    }
}

/// Parse a `"<w>x<h>mm"` label size.
fn parse_label_size(size: &str) -> Result<(u32, u32)> {
    let trimmed = size.trim().trim_end_matches("mm");
    let (w, h) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| PrintdError::Config(format!("label_size '{size}' is not WxHmm")))?;
    let w = w
        .trim()
        .parse::<u32>()
        .map_err(|e| PrintdError::Config(format!("label_size width: {e}")))?;
    let h = h
        .trim()
        .parse::<u32>()
        .map_err(|e| PrintdError::Config(format!("label_size height: {e}")))?;
    if w == 0 || h == 0 {
        return Err(PrintdError::Config(format!("label_size '{size}' has a zero side")));
    }
    Ok((w, h))
}
