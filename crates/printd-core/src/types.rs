// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the printd print service.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle states of a print job.
///
/// Transitions only move forward: `Pending -> InProgress -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, waiting for the dispatcher.
    Pending,
    /// Currently being handed to the OS print subsystem.
    InProgress,
    /// The print subsystem accepted the job.
    Succeeded,
    /// Printing failed, see the job's `error` field.
    Failed,
}

impl JobState {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only order.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Succeeded)
                | (Self::InProgress, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of content a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Printer-native bytes passed through untouched.
    Raw,
    /// A rendered TSPL label program.
    Label,
    /// A rendered ESC/POS receipt.
    Receipt,
}

/// Where the bytes of a job come from.
///
/// Inline bytes are not serialized; API responses only expose the size and
/// digest recorded on the [`PrintJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A file on the local filesystem, read at dispatch time.
    File { path: PathBuf },
    /// Bytes held in memory.
    Inline {
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

impl Payload {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn inline(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Inline {
            bytes: bytes.into(),
        }
    }
}

/// Printer roles the service knows how to render for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterRole {
    /// ESC/POS thermal receipt printer.
    Receipt,
    /// TSPL thermal label printer.
    Label,
}

impl PrinterRole {
    /// Substring that system printer names carry for this role.
    pub fn name_marker(&self) -> &'static str {
        match self {
            Self::Receipt => "ReceiptPrinter",
            Self::Label => "LabelPrinter",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Label => "label",
        }
    }

    /// Capitalised name for user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Receipt => "Receipt",
            Self::Label => "Label",
        }
    }
}

impl std::fmt::Display for PrinterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrinterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receipt" | "ticket" => Ok(Self::Receipt),
            "label" => Ok(Self::Label),
            other => Err(format!("unknown printer type '{other}'")),
        }
    }
}

/// Availability of a physical printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterAvailability {
    /// Idle and accepting work.
    Online,
    /// Disconnected, stopped, or reporting an error.
    Offline,
    /// Processing another job.
    Busy,
}

impl PrinterAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
        }
    }
}

impl std::fmt::Display for PrinterAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory view of a physical printer's availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterHandle {
    pub name: String,
    /// Role assigned through configuration, if any.
    pub role: Option<PrinterRole>,
    pub availability: PrinterAvailability,
    /// State reasons or probe error text.
    pub detail: Option<String>,
    /// When the availability was last probed. `None` = never checked.
    pub last_checked: Option<DateTime<Utc>>,
}

impl PrinterHandle {
    /// A handle for a freshly probed printer.
    pub fn new(name: impl Into<String>, availability: PrinterAvailability) -> Self {
        Self {
            name: name.into(),
            role: None,
            availability,
            detail: None,
            last_checked: Some(Utc::now()),
        }
    }

    /// A printer nothing is known about yet.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            availability: PrinterAvailability::Offline,
            detail: None,
            last_checked: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_role(mut self, role: Option<PrinterRole>) -> Self {
        self.role = role;
        self
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Printer offline or busy. The dispatcher tries again later.
    Transient,
    /// Recorded on the job; never retried automatically.
    Permanent,
}

/// A complete print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    /// Target printer name as known to the print subsystem.
    pub printer: String,
    /// Title shown in the OS print queue.
    pub title: String,
    pub kind: PayloadKind,
    pub payload: Payload,
    /// SHA-256 hex digest of the payload bytes at submission time.
    pub payload_hash: String,
    pub payload_bytes: u64,
    pub state: JobState,
    /// Failure detail. Only set when `state` is `Failed`.
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// How many times dispatch was postponed because the printer was unavailable.
    pub deferrals: u32,
    /// Identifier assigned by the OS print subsystem, when it reports one.
    pub backend_job_id: Option<String>,
}

impl PrintJob {
    pub fn new(
        printer: impl Into<String>,
        title: impl Into<String>,
        kind: PayloadKind,
        payload: Payload,
        payload_hash: String,
        payload_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            printer: printer.into(),
            title: title.into(),
            kind,
            payload,
            payload_hash,
            payload_bytes,
            state: JobState::Pending,
            error: None,
            submitted_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            deferrals: 0,
            backend_job_id: None,
        }
    }
}

/// Notification published whenever a job changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub printer: String,
    pub state: JobState,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(job: &PrintJob) -> Self {
        Self {
            job_id: job.id,
            printer: job.printer.clone(),
            state: job.state,
            error: job.error.clone(),
            at: job.updated_at,
        }
    }
}

/// Status of a background listener (HTTP API, socket probe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        assert!(JobState::Pending.can_transition_to(JobState::InProgress));
        assert!(JobState::InProgress.can_transition_to(JobState::Succeeded));
        assert!(JobState::InProgress.can_transition_to(JobState::Failed));

        assert!(!JobState::Pending.can_transition_to(JobState::Succeeded));
        assert!(!JobState::InProgress.can_transition_to(JobState::Pending));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
    }

    #[test]
    fn job_id_parses_its_display_form() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn printer_role_accepts_ticket_alias() {
        assert_eq!("ticket".parse::<PrinterRole>(), Ok(PrinterRole::Receipt));
        assert_eq!("LABEL".parse::<PrinterRole>(), Ok(PrinterRole::Label));
        assert!("laser".parse::<PrinterRole>().is_err());
    }

    #[test]
    fn unknown_printer_is_offline_and_unchecked() {
        let handle = PrinterHandle::unknown("P1");
        assert_eq!(handle.availability, PrinterAvailability::Offline);
        assert!(handle.last_checked.is_none());
    }

    #[test]
    fn inline_payload_bytes_are_not_serialized() {
        let payload = Payload::inline(b"secret".to_vec());
        let json = serde_json::to_string(&payload).expect("serialize");
        assert_eq!(json, r#"{"type":"inline"}"#);
    }
}
