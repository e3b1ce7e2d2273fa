//! JSON API over `tiny_http`: a fixed set of worker threads share one listener.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde_json::Value;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, info, warn};

use crate::api::{self, ApiError};
use crate::config::PipelineConfig;
use crate::store;

pub fn serve(config: &PipelineConfig) -> Result<()> {
    let server = Server::http(&config.api_bind)
        .map_err(|e| anyhow!("bind {}: {e}", config.api_bind))?;
    let server = Arc::new(server);
    info!(bind = %config.api_bind, threads = config.api_threads, db = %config.db_path.display(), "api listening");

    let mut handles = Vec::with_capacity(config.api_threads);
    for idx in 0..config.api_threads.max(1) {
        let server = Arc::clone(&server);
        let db_path = config.db_path.clone();
        let handle = thread::Builder::new()
            .name(format!("api-{idx}"))
            .spawn(move || worker_loop(&server, &db_path))
            .context("spawn api worker")?;
        handles.push(handle);
    }
    for handle in handles {
        if handle.join().is_err() {
            error!("api worker panicked");
        }
    }
    Ok(())
}

fn worker_loop(server: &Server, db_path: &Path) {
    let mut reader = Reader::new(db_path.to_path_buf());
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "api listener closed");
                break;
            }
        };
        handle_request(&mut reader, request);
    }
}

/// Per-thread read-only connection, opened on first use so the server can start before the
/// first ingest has created the database.
pub struct Reader {
    db_path: PathBuf,
    conn: Option<Connection>,
}

impl Reader {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            conn: None,
        }
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            self.conn = Some(store::open_reader(&self.db_path)?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| anyhow!("reader connection unavailable"))
    }
}

/// Routes one request to a status code and JSON body.
pub fn dispatch(reader: &mut Reader, method: &Method, url: &str) -> (u16, Value) {
    if *method != Method::Get {
        return (405, serde_json::json!({ "error": "method not allowed" }));
    }
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    if !path.starts_with("/api/") {
        return (404, ApiError::NotFound(format!("route {path}")).body());
    }
    let result = reader
        .connection()
        .map_err(ApiError::from)
        .and_then(|conn| api::handle(conn, path, query));
    match result {
        Ok(body) => (200, body),
        Err(err) => {
            if err.status() >= 500 {
                // A failed handle may be wedged on a stale snapshot; reopen next time.
                reader.conn = None;
                error!(%path, error = %err, "api request failed");
            } else {
                debug!(%path, error = %err, "api request rejected");
            }
            (err.status(), err.body())
        }
    }
}

fn handle_request(reader: &mut Reader, request: Request) {
    let url = request.url().to_string();
    let method = request.method().clone();
    let (status, body) = dispatch(reader, &method, &url);
    let payload = serde_json::to_string(&body)
        .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string());
    let mut response = Response::from_string(payload).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(err) = request.respond(response) {
        warn!(%url, error = %err, "failed writing response");
    }
}
