// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background tasks with a graceful stop signal.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A spawned loop plus the `Notify` that asks it to finish.
pub struct TaskHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `body` with its own shutdown signal.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(Arc<Notify>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let join = tokio::spawn(body(Arc::clone(&shutdown)));
        debug!(task = name, "task spawned");
        Self {
            name,
            shutdown,
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task and wait for it to finish its current iteration.
    pub async fn stop(self) {
        // `notify_one` stores a permit, so a task that is mid-iteration still
        // sees the signal at its next wait.
        self.shutdown.notify_one();
        match self.join.await {
            Ok(()) => debug!(task = self.name, "task stopped"),
            Err(e) => warn!(task = self.name, error = %e, "task ended abnormally"),
        }
    }
}
