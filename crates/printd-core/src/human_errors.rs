// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for shop-floor staff.
//
// Every technical error is mapped to a plain sentence and a suggestion. The
// HTTP API returns these instead of raw error strings.

use serde::Serialize;

use crate::error::PrintdError;
use crate::types::PrinterAvailability;

/// Severity of an error from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Printer busy or offline; the service keeps retrying.
    Transient,
    /// Someone must act (select a printer, fix the request).
    ActionRequired,
    /// Nothing will change by retrying.
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    /// Whether the service will retry on its own.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `PrintdError` into a `HumanError`.
pub fn humanize_error(err: &PrintdError) -> HumanError {
    match err {
        PrintdError::PrinterUnavailable {
            printer,
            availability,
        } => HumanError {
            message: match availability {
                PrinterAvailability::Busy => format!("Printer {printer} is busy."),
                _ => format!("Printer {printer} is not available."),
            },
            suggestion: "Check that the printer is switched on and connected. Queued jobs will print once it is ready.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PrintdError::PrintFailure(detail) => humanize_print_failure(detail),

        PrintdError::Backend(detail) => HumanError {
            message: "The system print service did not respond.".into(),
            suggestion: format!("Make sure CUPS is running on this computer. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        PrintdError::NoPrinterConfigured(role) => HumanError {
            message: format!("No {role} printer selected."),
            suggestion: format!("Set \"{role}_printer\" in settings.json, then restart the service."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PrintdError::QueueFull { capacity } => HumanError {
            message: "Too many documents are waiting to print.".into(),
            suggestion: format!(
                "Wait for some of the {capacity} queued documents to finish, then try again."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PrintdError::InvalidJob(detail) => HumanError {
            message: "This print request is not valid.".into(),
            suggestion: format!("Check the request and send it again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PrintdError::JobNotFound(id) => HumanError {
            message: "That print job doesn't exist.".into(),
            suggestion: format!("Job {id} may have been cleared from the list."),
            retriable: false,
            severity: Severity::Permanent,
        },

        PrintdError::InvalidTransition { .. } => HumanError {
            message: "That print job has already been handled.".into(),
            suggestion: "Refresh the job status.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PrintdError::IntegrityMismatch { .. } => HumanError {
            message: "The file changed after it was sent for printing.".into(),
            suggestion: "Send the file again so the latest version is printed.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PrintdError::Server(detail) => HumanError {
            message: "The print service had a problem.".into(),
            suggestion: format!("Try restarting the service. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        PrintdError::Config(detail) => HumanError {
            message: "The service settings are not valid.".into(),
            suggestion: format!("Fix settings.json and restart the service. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PrintdError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "A file could not be found.".into(),
                suggestion: "Check the file path and try again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The service is not allowed to read that file.".into(),
                suggestion: "Check the file permissions.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "A file could not be read or written.".into(),
                suggestion: format!("({io_err})"),
                retriable: false,
                severity: Severity::Permanent,
            },
        },

        PrintdError::Serialization(_) => HumanError {
            message: "The request could not be understood.".into(),
            suggestion: "Send valid JSON.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

/// Map an OS-level print failure string onto a friendlier explanation.
fn humanize_print_failure(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("not found") || lower.contains("does not exist") || lower.contains("unknown printer") {
        return HumanError {
            message: "The printer is not installed on this computer.".into(),
            suggestion: "Check the printer name in settings.json matches the system printer list.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        };
    }

    if lower.contains("media-empty") || lower.contains("paper") {
        return HumanError {
            message: "The printer is out of paper.".into(),
            suggestion: "Load a new roll and send the document again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        };
    }

    if lower.contains("timed out") || lower.contains("connection refused") {
        return HumanError {
            message: "The printer stopped responding while printing.".into(),
            suggestion: "Check the cable, then send the document again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        };
    }

    HumanError {
        message: "The document could not be printed.".into(),
        suggestion: format!("({detail})"),
        retriable: false,
        severity: Severity::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrinterRole;

    #[test]
    fn unavailable_printer_is_transient() {
        let err = PrintdError::PrinterUnavailable {
            printer: "P1".into(),
            availability: PrinterAvailability::Offline,
        };
        let human = humanize_error(&err);
        assert!(human.retriable);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.message.contains("P1"));
    }

    #[test]
    fn missing_printer_config_needs_action() {
        let human = humanize_error(&PrintdError::NoPrinterConfigured(PrinterRole::Label));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("label_printer"));
    }

    #[test]
    fn print_failure_is_never_retriable() {
        let human = humanize_error(&PrintdError::PrintFailure("lp: Error - printer broke".into()));
        assert!(!human.retriable);
    }

    #[test]
    fn out_of_paper_is_recognised() {
        let human = humanize_error(&PrintdError::PrintFailure("media-empty-error".into()));
        assert!(human.message.contains("paper"));
    }

    #[test]
    fn severity_serializes_in_snake_case() {
        let value = serde_json::to_value(Severity::ActionRequired).expect("serialize");
        assert_eq!(value, serde_json::json!("action_required"));
    }

    #[test]
    fn queue_full_mentions_capacity() {
        let human = humanize_error(&PrintdError::QueueFull { capacity: 4 });
        assert!(human.suggestion.contains('4'));
    }
}
