// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — owns the queue, tracker, backend, background tasks and
// listeners for one running printd instance.

pub mod app_services;
pub mod data_dir;
