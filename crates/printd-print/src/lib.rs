// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printd Print — job queue, dispatcher, printer status tracking, OS print
// backends (CUPS, IPP, raw TCP), label/receipt rendering, and the loopback
// HTTP API and socket probe. Domain types live in `printd-core`.

pub mod backend;
pub mod cups_client;
pub mod discovery;
pub mod dispatcher;
pub mod http_api;
pub mod integrity;
pub mod ipp_client;
pub mod payload;
pub mod queue;
pub mod raw_client;
pub mod render;
pub mod retry;
pub mod server;
pub mod socket_probe;
pub mod task;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use backend::{PrintBackend, SystemBackend};
pub use discovery::PrinterDiscovery;
pub use dispatcher::Dispatcher;
pub use http_api::{HttpApi, HttpServer};
pub use queue::JobQueue;
pub use server::LocalServer;
pub use socket_probe::SocketProbe;
pub use task::TaskHandle;
pub use tracker::StatusTracker;
