//! HTML fragments for the dashboard.
//!
//! Every string that can originate from a user or a model (file names,
//! labels) passes through [`escape_html`].

use std::fmt::Write as _;

use crate::detect::DetectionSet;
use crate::equipment::{CompletenessResult, RiskLevel};

const STYLE: &str = r#"
body {
  margin: 0;
  background: radial-gradient(ellipse at top, #0f172a 0%, #020617 70%);
  background-attachment: fixed;
  font-family: 'Roboto', sans-serif;
  color: #f8fafc;
}
.layout { display: flex; gap: 24px; padding: 24px; }
.sidebar {
  width: 260px;
  flex-shrink: 0;
  background: rgba(15, 23, 42, 0.8);
  border-radius: 16px;
  padding: 16px;
}
.main { flex: 1; max-width: 960px; margin: 0 auto; }
h1 {
  font-family: 'Orbitron', sans-serif;
  color: #38bdf8;
  text-align: center;
  font-size: 36px;
}
.card {
  background: rgba(255, 255, 255, 0.05);
  padding: 20px;
  border-radius: 16px;
  backdrop-filter: blur(10px);
  box-shadow: 0 0 15px rgba(56, 189, 248, 0.1);
  border: 1px solid rgba(148, 163, 184, 0.2);
  margin-bottom: 20px;
}
.card img { width: 100%; border-radius: 10px; }
.result-card {
  background: rgba(56, 189, 248, 0.1);
  padding: 15px;
  border-radius: 10px;
  margin: 8px 0;
  border-left: 4px solid #38bdf8;
}
.alert-card {
  background-color: rgba(239, 68, 68, 0.15);
  border-left: 5px solid #ef4444;
  padding: 15px;
  border-radius: 10px;
  margin: 8px 0;
}
.confidence-bar {
  height: 10px;
  background-color: #1e293b;
  border-radius: 10px;
  overflow: hidden;
  margin-top: 6px;
}
.confidence-fill {
  height: 100%;
  background-color: #38bdf8;
  text-align: right;
  padding-right: 5px;
  color: #fff;
  font-size: 10px;
}
.risk { padding: 14px 18px; border-radius: 10px; margin: 10px 0; font-weight: bold; }
.risk.success { background: rgba(34, 197, 94, 0.15); color: #4ade80; }
.risk.warning { background: rgba(234, 179, 8, 0.15); color: #facc15; }
.risk.error { background: rgba(239, 68, 68, 0.15); color: #f87171; }
.summary-badge {
  background-color: #1e3a8a;
  color: white;
  padding: 10px;
  border-radius: 10px;
  margin-top: 10px;
  text-align: center;
}
.footer {
  text-align: center;
  color: #94a3b8;
  font-size: 13px;
  margin-top: 40px;
}
button {
  background: #38bdf8;
  color: #020617;
  border: none;
  padding: 10px 18px;
  border-radius: 10px;
  font-weight: bold;
  cursor: pointer;
}
button:disabled { opacity: 0.5; cursor: default; }
video, #snapshot { max-width: 320px; border-radius: 10px; display: block; margin: 8px 0; }
"#;

const SCRIPT: &str = r#"
const filesInput = document.getElementById('files');
const runButton = document.getElementById('run');
const results = document.getElementById('results');
const log = document.getElementById('log');
const voice = document.getElementById('voice');
const video = document.getElementById('camera');
const snapshot = document.getElementById('snapshot');
let cameraBlob = null;

function refreshButton() {
  runButton.disabled = !(cameraBlob || filesInput.files.length > 0);
}
filesInput.addEventListener('change', refreshButton);

document.getElementById('camera-start').addEventListener('click', async () => {
  const stream = await navigator.mediaDevices.getUserMedia({ video: true });
  video.srcObject = stream;
  video.hidden = false;
  await video.play();
});

document.getElementById('camera-snap').addEventListener('click', () => {
  if (!video.srcObject) { return; }
  snapshot.width = video.videoWidth;
  snapshot.height = video.videoHeight;
  snapshot.getContext('2d').drawImage(video, 0, 0);
  snapshot.hidden = false;
  snapshot.toBlob((blob) => { cameraBlob = blob; refreshButton(); }, 'image/jpeg', 0.92);
});

runButton.addEventListener('click', async () => {
  // A captured webcam frame replaces the uploaded files.
  const items = cameraBlob
    ? [{ name: 'camera.jpg', body: cameraBlob }]
    : Array.from(filesInput.files).map((f) => ({ name: f.name, body: f }));
  runButton.disabled = true;
  results.innerHTML = '';
  try {
    for (let index = 0; index < items.length; index++) {
      const item = items[index];
      const query = new URLSearchParams({
        name: item.name,
        index: String(index),
        voice: voice.checked ? '1' : '0',
      });
      let report;
      try {
        const response = await fetch('/api/detect?' + query, { method: 'POST', body: item.body });
        report = await response.json();
        if (!response.ok) {
          showAlert(item.name, report.error || response.statusText);
          break;
        }
      } catch (err) {
        showAlert(item.name, String(err));
        break;
      }
      results.insertAdjacentHTML('beforeend', report.html);
      log.insertAdjacentHTML('beforeend', report.log_html);
    }
  } finally {
    refreshButton();
  }
});

// Server messages may echo the upload name, so they are set as text only.
function showAlert(name, message) {
  const card = document.createElement('div');
  card.className = 'alert-card';
  const title = document.createElement('b');
  title.textContent = name + ':';
  card.appendChild(title);
  card.appendChild(document.createTextNode(' ' + message));
  results.appendChild(card);
}
"#;

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Width of a confidence bar, truncated to a whole percent in `0..=100`.
pub fn confidence_percent(confidence: f32) -> u32 {
    if !confidence.is_finite() {
        return 0;
    }
    ((confidence * 100.0) as i64).clamp(0, 100) as u32
}

/// The complete dashboard page.
pub fn page(voice_enabled: bool) -> String {
    let checked = if voice_enabled { " checked" } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>FIRE-EYE</title>
<style>{style}</style>
</head>
<body>
<div class="layout">
<aside class="sidebar">
<h3>&#x1f4dc; Detection Log</h3>
<div id="log"></div>
</aside>
<main class="main">
<h1>&#x1f9ef; FIRE-EYE: Astronaut Detection Console</h1>
<div class="card">
<label>&#x1f4e4; Upload One or More Images
<input id="files" type="file" accept=".jpg,.jpeg,.png" multiple></label>
<p>&#x1f4f7; Or use your Webcam
<button id="camera-start" type="button">Start camera</button>
<button id="camera-snap" type="button">Take photo</button></p>
<video id="camera" hidden playsinline></video>
<canvas id="snapshot" hidden></canvas>
<label><input id="voice" type="checkbox"{checked}> &#x1f50a; Enable Voice Summary</label>
</div>
<button id="run" type="button" disabled>&#x1f680; Run Detection on All</button>
<div id="results"></div>
<div class="footer">&#x1f468;&#x200d;&#x1f680; YOLOv8 &middot; Falcon Crew &middot; AlgoVerse 2025 &#x1f680;</div>
</main>
</div>
<script>{script}</script>
</body>
</html>
"#,
        style = STYLE,
        checked = checked,
        script = SCRIPT,
    )
}

/// Card holding the annotated image.
pub fn result_card(index: usize, image_src: &str) -> String {
    format!(
        "<div class=\"card\"><h3>&#x1f4f8; Detection Result {}</h3><img src=\"{}\" alt=\"Detection Result {}\"></div>",
        index + 1,
        escape_html(image_src),
        index + 1
    )
}

/// Banner styled by the risk level's severity.
pub fn risk_banner(risk: RiskLevel) -> String {
    format!(
        "<div class=\"risk {}\">{} {}</div>",
        risk.severity().css_class(),
        risk.icon(),
        escape_html(risk.label())
    )
}

pub fn summary_badge(result: &CompletenessResult) -> String {
    format!(
        "<div class=\"summary-badge\">&#x1f6e1; <b>Detected:</b> {}<br>&#x274c; <b>Missing:</b> {}</div>",
        join_or_none(result.detected.iter()),
        join_or_none(result.missing.iter())
    )
}

/// One bar per detection, or an alert when nothing was detected.
pub fn confidence_bars(detections: &DetectionSet) -> String {
    let mut html = String::from("<div class=\"card\"><h3>&#x1f6f0; Detection Confidence</h3>");
    if detections.is_empty() {
        html.push_str("<div class=\"alert-card\"><b>&#x274c; No equipment detected.</b></div>");
    }
    for (label, confidence) in detections.label_confidences() {
        let percent = confidence_percent(confidence);
        let _ = write!(
            html,
            "<div class=\"result-card\"><b>{label}</b><div class=\"confidence-bar\"><div class=\"confidence-fill\" style=\"width: {percent}%;\">{percent}%</div></div></div>",
            label = escape_html(label),
            percent = percent
        );
    }
    html.push_str("</div>");
    html
}

/// Sidebar entry: image name and a check line per required item.
pub fn detection_log(index: usize, image_name: &str, result: &CompletenessResult) -> String {
    let mut html = format!(
        "<div class=\"log-entry\"><p>&#x1f5bc; Image {}: {}</p>",
        index + 1,
        escape_html(image_name)
    );
    for (label, present) in result.checklist() {
        let mark = if present { "&#x2705;" } else { "&#x274c;" };
        let _ = write!(html, "<p>{} {}</p>", mark, escape_html(label));
    }
    html.push_str("</div>");
    html
}

/// Everything shown for one inspected image, in display order.
pub fn inspection(
    index: usize,
    image_src: &str,
    detections: &DetectionSet,
    result: &CompletenessResult,
) -> String {
    let mut html = result_card(index, image_src);
    html.push_str(&risk_banner(result.risk));
    html.push_str(&summary_badge(result));
    html.push_str(&confidence_bars(detections));
    html
}

fn join_or_none<'a>(labels: impl Iterator<Item = &'a String>) -> String {
    let joined = labels
        .map(|label| escape_html(label))
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}
