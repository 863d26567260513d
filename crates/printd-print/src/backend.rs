// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The seam between the dispatcher and the OS print subsystem.

use std::future::Future;

use printd_core::config::{BackendKind, ServiceConfig};
use printd_core::error::Result;
use printd_core::types::PrinterHandle;

use crate::cups_client::CupsClient;
use crate::ipp_client::IppClient;
use crate::raw_client::RawClient;

/// Something that can list, probe and print to local printers.
///
/// Implementations must be safe to share between the dispatcher and the
/// discovery task.
pub trait PrintBackend: Send + Sync + 'static {
    /// Short name used in logs and the status endpoint.
    fn name(&self) -> &'static str;

    /// Names of every printer the subsystem knows about.
    fn list_printers(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Current availability of `printer`.
    fn probe(&self, printer: &str) -> impl Future<Output = Result<PrinterHandle>> + Send;

    /// Hand `data` to `printer`. Returns the subsystem's job id when it
    /// reports one.
    fn submit(
        &self,
        printer: &str,
        title: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// The backend selected in configuration.
pub enum SystemBackend {
    Cups(CupsClient),
    Ipp(IppClient),
    Raw(RawClient),
}

impl SystemBackend {
    pub fn from_config(config: &ServiceConfig) -> Self {
        match config.backend {
            BackendKind::Cups => Self::Cups(CupsClient::new(&config.cups_host)),
            BackendKind::Ipp => Self::Ipp(IppClient::new(&config.cups_host)),
            BackendKind::Raw => Self::Raw(RawClient::new(config.raw_printers.clone())),
        }
    }
}

impl PrintBackend for SystemBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Cups(inner) => inner.name(),
            Self::Ipp(inner) => inner.name(),
            Self::Raw(inner) => inner.name(),
        }
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        match self {
            Self::Cups(inner) => inner.list_printers().await,
            Self::Ipp(inner) => inner.list_printers().await,
            Self::Raw(inner) => inner.list_printers().await,
        }
    }

    async fn probe(&self, printer: &str) -> Result<PrinterHandle> {
        match self {
            Self::Cups(inner) => inner.probe(printer).await,
            Self::Ipp(inner) => inner.probe(printer).await,
            Self::Raw(inner) => inner.probe(printer).await,
        }
    }

    async fn submit(&self, printer: &str, title: &str, data: Vec<u8>) -> Result<Option<String>> {
        match self {
            Self::Cups(inner) => inner.submit(printer, title, data).await,
            Self::Ipp(inner) => inner.submit(printer, title, data).await,
            Self::Raw(inner) => inner.submit(printer, title, data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_follows_configuration() {
        let mut config = ServiceConfig::default();
        assert_eq!(SystemBackend::from_config(&config).name(), "cups");

        config.backend = BackendKind::Ipp;
        assert_eq!(SystemBackend::from_config(&config).name(), "ipp");

        config.backend = BackendKind::Raw;
        assert_eq!(SystemBackend::from_config(&config).name(), "raw");
    }
}
