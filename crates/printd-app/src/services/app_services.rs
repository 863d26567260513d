// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — builds the job queue, status tracker and print
// backend from configuration, runs the dispatcher and discovery loops, and
// serves the HTTP API and socket probe on loopback.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use printd_core::config::ServiceConfig;
use printd_core::error::Result;
use printd_core::types::ServerStatus;
use printd_print::retry::RetryConfig;
use printd_print::{
    Dispatcher, HttpApi, HttpServer, JobQueue, LocalServer, PrintBackend, PrinterDiscovery,
    SocketProbe, StatusTracker, SystemBackend, TaskHandle,
};

/// One running printd instance.
pub struct PrintService {
    config: ServiceConfig,
    tracker: Arc<StatusTracker>,
    backend: Arc<SystemBackend>,
    http: HttpServer,
    socket: LocalServer,
    tasks: Vec<TaskHandle>,
}

impl PrintService {
    /// Build the service. Nothing runs until [`PrintService::start`].
    pub fn new(config: ServiceConfig) -> Self {
        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let tracker = Arc::new(StatusTracker::new(queue, &config));
        let backend = Arc::new(SystemBackend::from_config(&config));
        let http = HttpServer::new(SocketAddr::new(config.bind_address, config.http_port));
        let socket = LocalServer::new(
            "socket",
            SocketAddr::new(config.bind_address, config.socket_port),
        );
        Self {
            config,
            tracker,
            backend,
            http,
            socket,
            tasks: Vec::new(),
        }
    }

    pub fn http_status(&self) -> ServerStatus {
        self.http.status()
    }

    pub fn socket_status(&self) -> ServerStatus {
        self.socket.status()
    }

    /// Start the background loops and both listeners.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP API cannot bind. A socket probe that cannot bind is
    /// logged and the service carries on without it.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            backend = self.backend.name(),
            label_printer = %self.config.label_printer,
            receipt_printer = %self.config.receipt_printer,
            "starting print service"
        );

        let discovery = PrinterDiscovery::new(Arc::clone(&self.backend), Arc::clone(&self.tracker));
        let interval = self.config.discovery_interval();
        self.tasks.push(TaskHandle::spawn("discovery", move |shutdown| {
            discovery.run(interval, shutdown)
        }));

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.tracker),
            Arc::clone(&self.backend),
            RetryConfig::from(&self.config),
            self.config.poll_interval(),
        );
        self.tasks.push(TaskHandle::spawn("dispatcher", move |shutdown| {
            dispatcher.run(shutdown)
        }));

        let api = HttpApi::new(Arc::clone(&self.tracker), &self.config, self.backend.name())?;
        if let Err(e) = self.http.start(api).await {
            self.stop().await;
            return Err(e);
        }

        let probe = SocketProbe::new(Arc::clone(&self.tracker));
        if let Err(e) = self.socket.start(Arc::new(probe)).await {
            warn!(error = %e, "socket probe disabled");
        }

        info!("print service running");
        Ok(())
    }

    /// Stop listeners first, then the background loops.
    pub async fn stop(&mut self) {
        if let Err(e) = self.http.stop().await {
            warn!(error = %e, "http api did not stop cleanly");
        }
        if let Err(e) = self.socket.stop().await {
            warn!(error = %e, "socket probe did not stop cleanly");
        }
        for task in self.tasks.drain(..) {
            let name = task.name();
            task.stop().await;
            info!(task = name, "stopped");
        }
        info!(pending = self.tracker.queue().pending_count(), "print service stopped");
    }
}
