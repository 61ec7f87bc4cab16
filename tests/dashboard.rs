//! Dashboard HTTP surface, driven over a real socket with the stub detector.

use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};

use fire_eye::config::DetectorSettings;
use fire_eye::dashboard::{DashboardConfig, DashboardHandle, DashboardServer};
use fire_eye::detect::{SharedBackend, StubBackend};
use fire_eye::render::Annotator;
use fire_eye::speech::Speaker;
use fire_eye::Inspector;

#[derive(Clone, Default)]
struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

impl Speaker for RecordingSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct MutedSpeaker;

impl Speaker for MutedSpeaker {
    fn speak(&mut self, _text: &str) -> Result<()> {
        Err(anyhow!("audio device unavailable"))
    }
}

fn start(labels: &[(&str, f32)], speaker: RecordingSpeaker) -> DashboardHandle {
    start_with(labels, Box::new(speaker))
}

fn start_with(labels: &[(&str, f32)], speaker: Box<dyn Speaker>) -> DashboardHandle {
    let detector: SharedBackend = Arc::new(Mutex::new(
        StubBackend::new(DetectorSettings::default().class_names).with_labels(labels),
    ));
    let inspector = Inspector::new(detector, Annotator::without_captions(2), speaker);
    let cfg = DashboardConfig {
        addr: "127.0.0.1:0".to_string(),
        max_upload_bytes: 1024 * 1024,
        voice_default: true,
    };
    DashboardServer::new(cfg, inspector).spawn().expect("spawn dashboard")
}

fn send(addr: SocketAddr, head: &str, body: &[u8]) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let text = String::from_utf8_lossy(&response).to_string();
    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    send(addr, &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"), b"")
}

fn post_image(addr: SocketAddr, query: &str, body: &[u8]) -> (u16, String) {
    let head = format!(
        "POST /api/detect?{query} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    send(addr, &head, body)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn serves_page_and_health() {
    let handle = start(&[], RecordingSpeaker::default());

    let (status, body) = get(handle.addr, "/health");
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"status":"ok"}"#);

    let (status, body) = get(handle.addr, "/");
    assert_eq!(status, 200);
    assert!(body.contains("FIRE-EYE"));
    assert!(body.contains("Run Detection on All"));

    let (status, _) = get(handle.addr, "/events");
    assert_eq!(status, 404);

    let (status, _) = get(handle.addr, "/api/detect");
    assert_eq!(status, 405);

    handle.stop().unwrap();
}

#[test]
fn detect_returns_report_and_speaks_when_asked() {
    let speaker = RecordingSpeaker::default();
    let handle = start(&[("FireExtinguisher", 0.91), ("ToolBox", 0.55)], speaker.clone());

    let (status, body) = post_image(handle.addr, "name=bay%201.png&index=2&voice=1", &png(40, 30));
    assert_eq!(status, 200, "{body}");
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["index"], 2);
    assert_eq!(report["image_name"], "bay 1.png");
    assert_eq!(report["risk_level"], 1);
    assert_eq!(report["risk_label"], "Moderate Risk: 1 item missing");
    assert_eq!(report["severity"], "warning");
    assert_eq!(report["missing"], serde_json::json!(["OxygenTank"]));
    assert_eq!(report["confidences"][0]["percent"], 91);
    assert_eq!(report["confidences"][1]["percent"], 55);
    assert!(report["annotated_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
    assert!(report["html"].as_str().unwrap().contains("Detection Result 3"));
    assert!(report["log_html"].as_str().unwrap().contains("Image 3: bay 1.png"));

    assert_eq!(
        speaker.0.lock().unwrap().as_slice(),
        ["Detected: FireExtinguisher, ToolBox. Missing: OxygenTank"]
    );

    let (status, _) = post_image(handle.addr, "name=quiet.png&voice=0", &png(8, 8));
    assert_eq!(status, 200);
    assert_eq!(speaker.0.lock().unwrap().len(), 1);

    handle.stop().unwrap();
}

#[test]
fn empty_detections_report_high_risk() {
    let handle = start(&[], RecordingSpeaker::default());

    let (status, body) = post_image(handle.addr, "name=camera.jpg", &png(16, 16));
    assert_eq!(status, 200);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["risk_level"], 2);
    assert_eq!(report["detected"], serde_json::json!([]));
    assert!(report["html"].as_str().unwrap().contains("No equipment detected."));

    handle.stop().unwrap();
}

#[test]
fn bad_uploads_are_rejected() {
    let handle = start(&[], RecordingSpeaker::default());

    let (status, body) = post_image(handle.addr, "name=notes.txt", &png(4, 4));
    assert_eq!(status, 400);
    assert!(body.contains("unsupported upload name"));

    let (status, body) = post_image(handle.addr, "name=broken.png", b"not really a png");
    assert_eq!(status, 400);
    assert!(body.contains("failed to decode"));

    let (status, _) = post_image(handle.addr, "name=a.png&index=-1", &png(4, 4));
    assert_eq!(status, 400);

    // The server keeps serving after rejected requests.
    let (status, _) = get(handle.addr, "/health");
    assert_eq!(status, 200);

    handle.stop().unwrap();
}

#[test]
fn oversized_upload_is_refused() {
    let handle = start(&[], RecordingSpeaker::default());

    // Headers only: the server answers from Content-Length without reading a body.
    let head = format!(
        "POST /api/detect?name=big.png HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
        2 * 1024 * 1024
    );
    let (status, body) = send(handle.addr, &head, b"");
    assert_eq!(status, 413);
    assert!(body.contains("upload_too_large"));

    let (status, _) = get(handle.addr, "/health");
    assert_eq!(status, 200);

    handle.stop().unwrap();
}

#[test]
fn pipeline_failure_answers_500_and_keeps_serving() {
    let handle = start_with(&[("ToolBox", 0.8)], Box::new(MutedSpeaker));

    let (status, body) = post_image(handle.addr, "name=bay.png&voice=1", &png(12, 12));
    assert_eq!(status, 500);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(error["error"]
        .as_str()
        .unwrap()
        .contains("audio device unavailable"));

    let (status, _) = get(handle.addr, "/health");
    assert_eq!(status, 200);

    // Without voice the same image goes through.
    let (status, _) = post_image(handle.addr, "name=bay.png&voice=0", &png(12, 12));
    assert_eq!(status, 200);

    handle.stop().unwrap();
}
