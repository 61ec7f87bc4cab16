//! Web dashboard.
//!
//! One server thread owns the [`Inspector`] and handles connections strictly
//! one at a time, so each uploaded image is detected, evaluated, rendered and
//! (optionally) spoken before the next request is read.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::FireEyeConfig;
use crate::equipment::Severity;
use crate::pipeline::{Inspection, Inspector};
use crate::render::{html, to_data_uri};
use crate::source::UploadedImage;

const MAX_HEADER_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    /// Initial state of the page's voice toggle.
    pub voice_default: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            voice_default: true,
        }
    }
}

impl From<&FireEyeConfig> for DashboardConfig {
    fn from(cfg: &FireEyeConfig) -> Self {
        Self {
            addr: cfg.dashboard.addr.clone(),
            max_upload_bytes: cfg.dashboard.max_upload_bytes,
            voice_default: cfg.voice.enabled,
        }
    }
}

#[derive(Debug)]
pub struct DashboardHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DashboardHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("dashboard server thread panicked"))?;
        }
        Ok(())
    }
}

/// JSON answer to `POST /api/detect`.
#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub index: usize,
    pub image_name: String,
    pub risk_level: u8,
    pub risk_label: &'static str,
    pub severity: Severity,
    pub detected: Vec<String>,
    pub missing: Vec<String>,
    pub summary: String,
    pub confidences: Vec<ConfidenceEntry>,
    pub annotated_image: String,
    pub html: String,
    pub log_html: String,
}

#[derive(Debug, Serialize)]
pub struct ConfidenceEntry {
    pub label: String,
    pub percent: u32,
}

impl DetectionReport {
    pub fn new(index: usize, image_name: &str, inspection: &Inspection) -> Result<Self> {
        let data_uri = to_data_uri(&inspection.annotated)?;
        let result = &inspection.completeness;
        Ok(Self {
            index,
            image_name: image_name.to_string(),
            risk_level: result.risk_level(),
            risk_label: result.risk_label(),
            severity: result.risk.severity(),
            detected: result.detected.iter().cloned().collect(),
            missing: result.missing.iter().cloned().collect(),
            summary: inspection.summary.clone(),
            confidences: inspection
                .detections
                .label_confidences()
                .map(|(label, confidence)| ConfidenceEntry {
                    label: label.to_string(),
                    percent: html::confidence_percent(confidence),
                })
                .collect(),
            html: html::inspection(index, &data_uri, &inspection.detections, result),
            log_html: html::detection_log(index, image_name, result),
            annotated_image: data_uri,
        })
    }
}

pub struct DashboardServer {
    cfg: DashboardConfig,
    inspector: Inspector,
}

impl DashboardServer {
    pub fn new(cfg: DashboardConfig, inspector: Inspector) -> Self {
        Self { cfg, inspector }
    }

    pub fn spawn(self) -> Result<DashboardHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid dashboard address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "dashboard configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let mut inspector = self.inspector;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_dashboard(listener, &cfg, &mut inspector, shutdown_thread) {
                log::error!("dashboard stopped: {}", err);
            }
        });

        Ok(DashboardHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_dashboard(
    listener: TcpListener,
    cfg: &DashboardConfig,
    inspector: &mut Inspector,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg, inspector) {
                    log::warn!("dashboard request failed: {:#}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &DashboardConfig,
    inspector: &mut Inspector,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_error(&mut stream, 403, "forbidden")?;
        return Ok(());
    }

    let (request, leftover) = read_head(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => {
            let page = html::page(cfg.voice_default);
            write_response(&mut stream, 200, "text/html; charset=utf-8", page.as_bytes())
        }
        ("GET", "/health") => write_json(&mut stream, 200, r#"{"status":"ok"}"#),
        ("POST", "/api/detect") => {
            let length = request.content_length()?;
            if length > cfg.max_upload_bytes {
                write_error(&mut stream, 413, "upload_too_large")?;
                return Ok(());
            }
            let body = read_body(&mut stream, leftover, length)?;
            handle_detect(&mut stream, &request, body, inspector)
        }
        (_, "/" | "/health" | "/api/detect") => {
            write_error(&mut stream, 405, "method_not_allowed")
        }
        _ => write_error(&mut stream, 404, "not_found"),
    }
}

fn handle_detect(
    stream: &mut TcpStream,
    request: &HttpRequest,
    body: Vec<u8>,
    inspector: &mut Inspector,
) -> Result<()> {
    let name = request.query.get("name").map(String::as_str).unwrap_or("");
    let index = match request.query.get("index") {
        Some(raw) => match raw.parse::<usize>() {
            Ok(index) => index,
            Err(_) => return write_error(stream, 400, "index must be a non-negative integer"),
        },
        None => 0,
    };
    let voice = matches!(
        request.query.get("voice").map(String::as_str),
        Some("1" | "true" | "on")
    );

    let upload = match UploadedImage::new(name, body) {
        Ok(upload) => upload,
        Err(err) => return write_error(stream, 400, &err.to_string()),
    };
    let image = match upload.decode() {
        Ok(image) => image,
        Err(err) => return write_error(stream, 400, &format!("{:#}", err)),
    };

    log::info!(
        "image {}: {} ({}x{}, voice {})",
        index + 1,
        upload.name,
        image.width(),
        image.height(),
        if voice { "on" } else { "off" }
    );
    let report = inspector
        .inspect(&image, voice)
        .and_then(|inspection| DetectionReport::new(index, &upload.name, &inspection));
    match report {
        Ok(report) => {
            let payload = serde_json::to_vec(&report)?;
            write_response(stream, 200, "application/json", &payload)
        }
        Err(err) => {
            write_error(stream, 500, &format!("{:#}", err))?;
            Err(err.context(format!("inspection of {} failed", upload.name)))
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl HttpRequest {
    fn content_length(&self) -> Result<usize> {
        match self.headers.get("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid content-length '{}'", value)),
            None => Ok(0),
        }
    }
}

/// Read the request line and headers. Returns any body bytes read past the
/// header terminator.
fn read_head(stream: &mut TcpStream) -> Result<(HttpRequest, Vec<u8>)> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };
    let leftover = data[header_end + 4..].to_vec();

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    Ok((
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            query,
        },
        leftover,
    ))
}

fn read_body(stream: &mut TcpStream, mut body: Vec<u8>, length: usize) -> Result<Vec<u8>> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    body.truncate(length);
    let mut buf = [0u8; 16 * 1024];
    while body.len() < length {
        let want = (length - body.len()).min(buf.len());
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            return Err(anyhow!(
                "connection closed after {} of {} body bytes",
                body.len(),
                length
            ));
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}

fn write_json(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let body = serde_json::json!({ "error": message }).to_string();
    write_json(stream, status, &body)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
