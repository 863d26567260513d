// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Loopback JSON API for local callers (point-of-sale, back-office tools).
//
// Every response is an envelope `{"code", "message", "data"}`:
//   0    success
//   300  printer not available
//   400  bad request
//   404  not found
//   500  internal error
//
// Routing, framing and body limits are handled by axum; handlers only see
// typed requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use printd_core::config::ServiceConfig;
use printd_core::error::{PrintdError, Result};
use printd_core::human_errors::humanize_error;
use printd_core::types::{JobId, Payload, PayloadKind, PrintJob, PrinterRole, ServerStatus};

use crate::payload::prepare_job;
use crate::render::{EngineerOrder, TsplLabel, escpos_cut, escpos_receipt, receipt_columns};
use crate::tracker::StatusTracker;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
/// A request that has not been answered in this time gets a 408.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const CODE_OK: i64 = 0;
pub const CODE_PRINTER_UNAVAILABLE: i64 = 300;
pub const CODE_BAD_REQUEST: i64 = 400;
pub const CODE_NOT_FOUND: i64 = 404;
pub const CODE_INTERNAL: i64 = 500;

/// HTTP status plus the JSON envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self::envelope(StatusCode::OK, CODE_OK, message, Some(data))
    }

    fn envelope(status: StatusCode, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        let mut body = json!({ "code": code, "message": message.into() });
        if let Some(data) = data {
            body["data"] = data;
        }
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::envelope(StatusCode::BAD_REQUEST, CODE_BAD_REQUEST, message, None)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::envelope(StatusCode::NOT_FOUND, CODE_NOT_FOUND, message, None)
    }

    /// Unavailable printers answer HTTP 200 with code 300, as callers expect.
    pub fn printer_unavailable(message: impl Into<String>) -> Self {
        Self::envelope(StatusCode::OK, CODE_PRINTER_UNAVAILABLE, message, None)
    }

    /// Map a service error onto the envelope, with a plain-language hint.
    pub fn from_error(err: &PrintdError) -> Self {
        let human = humanize_error(err);
        let (status, code) = match err {
            PrintdError::InvalidJob(_)
            | PrintdError::Serialization(_)
            | PrintdError::NoPrinterConfigured(_)
            | PrintdError::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, CODE_BAD_REQUEST),
            PrintdError::JobNotFound(_) => (StatusCode::NOT_FOUND, CODE_NOT_FOUND),
            PrintdError::PrinterUnavailable { .. } => (StatusCode::OK, CODE_PRINTER_UNAVAILABLE),
            PrintdError::QueueFull { .. } => (StatusCode::SERVICE_UNAVAILABLE, CODE_INTERNAL),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL),
        };
        Self::envelope(
            status,
            code,
            human.message,
            Some(json!({
                "error": err.to_string(),
                "suggestion": human.suggestion,
                "retriable": human.retriable,
                "severity": human.severity,
            })),
        )
    }

    /// A body or query string axum could not accept. Keeps axum's status
    /// (400, 413, 415, 422) under the bad-request code.
    fn rejected(status: StatusCode, reason: String) -> Self {
        Self::envelope(status, CODE_BAD_REQUEST, format!("Invalid request: {reason}"), None)
    }

    pub fn code(&self) -> i64 {
        self.body["code"].as_i64().unwrap_or(CODE_INTERNAL)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    printer_type: Option<String>,
}

/// Body of the label and receipt endpoints.
#[derive(Debug, Deserialize)]
struct ContentRequest {
    content: Option<String>,
    printer: Option<String>,
    title: Option<String>,
    #[serde(default)]
    require_online: bool,
}

#[derive(Debug, Deserialize)]
struct EngineerOrderRequest {
    #[serde(flatten)]
    order: EngineerOrder,
    printer: Option<String>,
    #[serde(default)]
    require_online: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CutRequest {
    printer: Option<String>,
    #[serde(default)]
    require_online: bool,
}

#[derive(Debug, Deserialize)]
struct RawJobRequest {
    printer: String,
    path: Option<String>,
    text: Option<String>,
    title: Option<String>,
    #[serde(default)]
    require_online: bool,
}

/// Rendering settings taken from configuration.
#[derive(Debug, Clone, Copy)]
struct RenderSettings {
    label_width_mm: u32,
    label_height_mm: u32,
    receipt_columns: usize,
}

/// Shared state behind every route.
pub struct HttpApi {
    tracker: Arc<StatusTracker>,
    render: RenderSettings,
    backend: &'static str,
    started: Instant,
}

impl HttpApi {
    pub fn new(tracker: Arc<StatusTracker>, config: &ServiceConfig, backend: &'static str) -> Result<Self> {
        let (label_width_mm, label_height_mm) = config.label_dimensions_mm()?;
        Ok(Self {
            tracker,
            render: RenderSettings {
                label_width_mm,
                label_height_mm,
                receipt_columns: receipt_columns(&config.receipt_width),
            },
            backend,
            started: Instant::now(),
        })
    }

    fn service_status(&self) -> ApiResponse {
        let queue = self.tracker.queue();
        ApiResponse::ok(
            "printd is running",
            json!({
                "service": "printd",
                "version": env!("CARGO_PKG_VERSION"),
                "backend": self.backend,
                "uptime_secs": self.started.elapsed().as_secs(),
                "queue": {
                    "pending": queue.pending_count(),
                    "total": queue.len(),
                    "capacity": queue.capacity(),
                },
                "printers": self.tracker.printers(),
            }),
        )
    }

    fn role_status(&self, printer_type: Option<&str>) -> ApiResponse {
        let printer_type = printer_type.unwrap_or("label");
        let role = match printer_type {
            "label" => PrinterRole::Label,
            "receipt" => PrinterRole::Receipt,
            _ => {
                return ApiResponse::bad_request(
                    "Invalid printer_type. Must be 'label' or 'receipt'",
                );
            }
        };

        let printer = self.tracker.printer_for_role(role).ok();
        let handle = printer.map(|name| self.tracker.printer_status(name));
        let connected = handle
            .as_ref()
            .is_some_and(|h| h.availability.is_available());
        let message = format!(
            "{} printer is {}",
            role.display_name(),
            if connected { "connected" } else { "disconnected" }
        );
        ApiResponse::ok(
            message,
            json!({
                "printer_type": printer_type,
                "printer": printer,
                "is_connected": connected,
                "availability": handle.as_ref().map(|h| h.availability),
                "detail": handle.as_ref().and_then(|h| h.detail.clone()),
                "last_checked": handle.as_ref().and_then(|h| h.last_checked),
            }),
        )
    }

    async fn print_label(&self, req: ContentRequest) -> ApiResponse {
        let Some(content) = req.content else {
            return ApiResponse::bad_request("Missing content field");
        };
        let bytes = TsplLabel::new(self.render.label_width_mm, self.render.label_height_mm)
            .text(&content)
            .render();
        self.submit_role(
            PrinterRole::Label,
            req.printer,
            req.title.as_deref().unwrap_or(""),
            PayloadKind::Label,
            bytes,
            req.require_online,
        )
        .await
    }

    async fn print_receipt(&self, req: ContentRequest) -> ApiResponse {
        let Some(content) = req.content else {
            return ApiResponse::bad_request("Missing content field");
        };
        let bytes = escpos_receipt(&content, self.render.receipt_columns);
        self.submit_role(
            PrinterRole::Receipt,
            req.printer,
            req.title.as_deref().unwrap_or(""),
            PayloadKind::Receipt,
            bytes,
            req.require_online,
        )
        .await
    }

    async fn print_engineer_order(&self, req: EngineerOrderRequest) -> ApiResponse {
        let bytes = req
            .order
            .to_label(self.render.label_width_mm, self.render.label_height_mm);
        self.submit_role(
            PrinterRole::Label,
            req.printer,
            "Engineer Order",
            PayloadKind::Label,
            bytes,
            req.require_online,
        )
        .await
    }

    async fn cut_paper(&self, req: CutRequest) -> ApiResponse {
        self.submit_role(
            PrinterRole::Receipt,
            req.printer,
            "Cut Command",
            PayloadKind::Receipt,
            escpos_cut(),
            req.require_online,
        )
        .await
    }

    async fn submit_raw(&self, req: RawJobRequest) -> ApiResponse {
        let payload = match (req.path, req.text) {
            (Some(path), None) => Payload::file(path),
            (None, Some(text)) => Payload::inline(text.into_bytes()),
            _ => return ApiResponse::bad_request("Provide exactly one of 'path' or 'text'"),
        };
        if req.require_online
            && let Some(resp) = self.unavailable(&req.printer, None)
        {
            return resp;
        }
        self.enqueue(&req.printer, req.title.as_deref().unwrap_or(""), PayloadKind::Raw, payload)
            .await
    }

    /// Resolve the role printer (unless the caller named one) and queue.
    async fn submit_role(
        &self,
        role: PrinterRole,
        printer: Option<String>,
        title: &str,
        kind: PayloadKind,
        bytes: Vec<u8>,
        require_online: bool,
    ) -> ApiResponse {
        let printer = match printer.filter(|p| !p.trim().is_empty()) {
            Some(name) => name,
            None => match self.tracker.printer_for_role(role) {
                Ok(name) => name.to_owned(),
                Err(e) => return ApiResponse::from_error(&e),
            },
        };
        if require_online && let Some(resp) = self.unavailable(&printer, Some(role)) {
            return resp;
        }
        self.enqueue(&printer, title, kind, Payload::inline(bytes)).await
    }

    /// The code-300 answer when `printer` is not known to be online.
    fn unavailable(&self, printer: &str, role: Option<PrinterRole>) -> Option<ApiResponse> {
        let handle = self.tracker.printer_status(printer);
        if handle.availability.is_available() {
            return None;
        }
        let message = match role {
            Some(role) => format!("{} printer not available", role.display_name()),
            None => format!("Printer {printer} not available"),
        };
        info!(printer, availability = %handle.availability, "rejecting job, printer not online");
        Some(ApiResponse::printer_unavailable(message))
    }

    async fn enqueue(&self, printer: &str, title: &str, kind: PayloadKind, payload: Payload) -> ApiResponse {
        match self.try_enqueue(printer, title, kind, payload).await {
            Ok(job) => {
                let available = self.tracker.printer_status(&job.printer).availability.is_available();
                ApiResponse::ok(
                    "Print job queued",
                    json!({
                        "job_id": job.id,
                        "printer": job.printer,
                        "state": job.state,
                        "printer_available": available,
                    }),
                )
            }
            Err(e) => {
                warn!(printer, error = %e, "job rejected");
                ApiResponse::from_error(&e)
            }
        }
    }

    async fn try_enqueue(&self, printer: &str, title: &str, kind: PayloadKind, payload: Payload) -> Result<PrintJob> {
        let job = prepare_job(printer, title, kind, payload).await?;
        self.tracker.queue().submit(job.clone())?;
        self.tracker.publish(&job);
        Ok(job)
    }

    fn list_jobs(&self) -> ApiResponse {
        let jobs = self.tracker.jobs();
        ApiResponse::ok(format!("{} jobs", jobs.len()), json!(jobs))
    }

    fn get_job(&self, id: &str) -> ApiResponse {
        let id = match id.parse::<JobId>() {
            Ok(id) => id,
            Err(_) => return ApiResponse::bad_request(format!("'{id}' is not a job id")),
        };
        match self.tracker.job_status(&id) {
            Ok(job) => ApiResponse::ok(job.state.as_str(), json!(job)),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    fn purge_job(&self, id: &str) -> ApiResponse {
        let id = match id.parse::<JobId>() {
            Ok(id) => id,
            Err(_) => return ApiResponse::bad_request(format!("'{id}' is not a job id")),
        };
        match self.tracker.queue().purge(&id) {
            Ok(job) => ApiResponse::ok("Job removed", json!({ "job_id": job.id })),
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    fn list_printers(&self) -> ApiResponse {
        let printers = self.tracker.printers();
        ApiResponse::ok(format!("{} printers", printers.len()), json!(printers))
    }

    fn get_printer(&self, name: &str) -> ApiResponse {
        let handle = self.tracker.printer_status(name);
        ApiResponse::ok(handle.availability.as_str(), json!(handle))
    }
}

type ApiState = State<Arc<HttpApi>>;

/// All routes, with body limit, request timeout and request tracing.
pub fn router(api: Arc<HttpApi>) -> Router {
    Router::new()
        .route("/", get(service_status))
        .route("/status", get(service_status))
        .route("/api/print/status", get(role_status))
        .route("/api/print/label", post(print_label))
        .route("/api/print/receipt", post(print_receipt))
        .route("/api/print/ticket", post(print_receipt))
        .route("/api/print/label/engineer_order", post(print_engineer_order))
        .route("/api/print/cut", post(cut_paper))
        .route("/api/jobs", get(list_jobs).post(submit_raw))
        .route("/api/jobs/{id}", get(get_job).delete(purge_job))
        .route("/api/printers", get(list_printers))
        .route("/api/printers/{name}", get(get_printer))
        .fallback(unknown_route)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn service_status(State(api): ApiState) -> ApiResponse {
    api.service_status()
}

async fn role_status(
    State(api): ApiState,
    query: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResponse {
    match query {
        Ok(Query(query)) => api.role_status(query.printer_type.as_deref()),
        Err(rejection) => rejection.into(),
    }
}

async fn print_label(
    State(api): ApiState,
    body: std::result::Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(req)) => api.print_label(req).await,
        Err(rejection) => rejection.into(),
    }
}

async fn print_receipt(
    State(api): ApiState,
    body: std::result::Result<Json<ContentRequest>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(req)) => api.print_receipt(req).await,
        Err(rejection) => rejection.into(),
    }
}

async fn print_engineer_order(
    State(api): ApiState,
    body: std::result::Result<Json<EngineerOrderRequest>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(req)) => api.print_engineer_order(req).await,
        Err(rejection) => rejection.into(),
    }
}

/// Cut takes an optional body, so it reads raw bytes instead of `Json`.
async fn cut_paper(State(api): ApiState, body: Bytes) -> ApiResponse {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CutRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => return ApiResponse::bad_request(format!("Invalid request: {e}")),
        }
    };
    api.cut_paper(req).await
}

async fn submit_raw(
    State(api): ApiState,
    body: std::result::Result<Json<RawJobRequest>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(req)) => api.submit_raw(req).await,
        Err(rejection) => rejection.into(),
    }
}

async fn list_jobs(State(api): ApiState) -> ApiResponse {
    api.list_jobs()
}

async fn get_job(State(api): ApiState, Path(id): Path<String>) -> ApiResponse {
    api.get_job(&id)
}

async fn purge_job(State(api): ApiState, Path(id): Path<String>) -> ApiResponse {
    api.purge_job(&id)
}

async fn list_printers(State(api): ApiState) -> ApiResponse {
    api.list_printers()
}

async fn get_printer(State(api): ApiState, Path(name): Path<String>) -> ApiResponse {
    api.get_printer(&name)
}

async fn unknown_route() -> ApiResponse {
    ApiResponse::not_found("API endpoint not found")
}

/// Runs the router on a loopback listener until stopped.
pub struct HttpServer {
    /// Requested bind address; port 0 picks a free port.
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Create a server in `Stopped` state.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            local_addr: None,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// The bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and start serving `api`.
    ///
    /// # Errors
    ///
    /// Returns `Server` if the address is in use or cannot be bound.
    pub async fn start(&mut self, api: HttpApi) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!("http server already running");
            return Ok(());
        }
        self.status = ServerStatus::Starting;

        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(PrintdError::Server(format!("http bind {}: {e}", self.addr)));
            }
        };
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "http api listening");

        let app = router(Arc::new(api));
        let shutdown = Arc::clone(&self.shutdown_signal);
        self.task_handle = Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "http server failed");
            }
        }));
        self.local_addr = Some(local_addr);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting, let in-flight requests finish, and wait for the
    /// server task to exit.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!("http api stopping");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| PrintdError::Server(format!("http task join: {e}")))?;
        }
        self.local_addr = None;
        self.status = ServerStatus::Stopped;
        info!("http api stopped");
        Ok(())
    }
}
