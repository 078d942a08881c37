//! Management page served at `/`.

use askama::Template;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{Html, IntoResponse, Response};

use crate::GatewayState;

/// Response header mirroring the gateway's access mode.
pub const READ_ONLY_HEADER: &str = "x-read-only";

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!DOCTYPE html>
<html>
<head>
  <title>Script Publisher</title>
  <style>
    body { font-family: "Space Grotesk", sans-serif; background: #fef7ed; color: #1a1a1a; padding: 20px; }
    h1 { font-size: 3rem; text-shadow: 4px 4px 0px #fb923c; }
    input, textarea { width: 100%; padding: 1rem; border: 4px solid #1a1a1a; margin-bottom: 1rem; font-family: "JetBrains Mono", monospace; }
    button { background: #fb923c; color: #1a1a1a; border: 4px solid #1a1a1a; padding: 1rem 2rem; font-weight: 900; cursor: pointer; }
    button:disabled { opacity: 0.5; cursor: not-allowed; }
    .banner { padding: 1rem; border: 4px solid #1a1a1a; background: #fff7d6; margin-bottom: 1rem; }
    .result { margin-top: 2rem; padding: 1.5rem; border: 4px solid #1a1a1a; background: white; font-weight: 600; }
    .success { background: #dcfce7; border-color: #166534; }
    .error { background: #fef2f2; border-color: #dc2626; }
  </style>
</head>
<body>
  <h1>Script Publisher</h1>
  {% if !message.is_empty() %}<div class="banner">{{ message }}</div>{% endif %}
  {% if read_only %}<div class="banner">Read-only mode: publishing is disabled.</div>{% endif %}
  <p>Namespace: <code>{{ namespace }}</code></p>
  <form id="deployForm">
    <input type="text" id="scriptName" placeholder="{{ default_script }}" required>
    <textarea id="code">export default { async fetch(req, env) { return new Response("Hello from " + env.MESSAGE); } };</textarea>
    <button type="submit"{% if read_only %} disabled{% endif %}>Deploy Script</button>
  </form>
  <div id="result"></div>
  <script>
    document.getElementById('deployForm').addEventListener('submit', async e => {
      e.preventDefault();
      const scriptName = document.getElementById('scriptName').value;
      const code = document.getElementById('code').value;
      const resultDiv = document.getElementById('result');
      resultDiv.textContent = 'Deploying...';
      try {
        const res = await fetch('/deploy', { method: 'POST', headers: {'Content-Type': 'application/json'}, body: JSON.stringify({ scriptName, code }) });
        const data = await res.json();
        resultDiv.className = res.ok ? 'result success' : 'result error';
        resultDiv.textContent = res.ok ? 'Deployed ' + data.script : data.error;
      } catch (err) {
        resultDiv.className = 'result error';
        resultDiv.textContent = err.message;
      }
    });
  </script>
</body>
</html>"#
)]
struct ManagementPage<'a> {
    read_only: bool,
    message: &'a str,
    namespace: &'a str,
    default_script: &'a str,
}

/// GET /
pub async fn management_page(State(state): State<GatewayState>) -> Response {
    let config = &state.config;
    let read_only = config.access.is_read_only();
    let page = ManagementPage {
        read_only,
        message: &config.message,
        namespace: &config.namespace,
        default_script: &config.default_script,
    };
    let html = page
        .render()
        .unwrap_or_else(|e| format!("<pre>Template error: {e}</pre>"));

    let mut response = Html(html).into_response();
    response.headers_mut().insert(
        READ_ONLY_HEADER,
        HeaderValue::from_static(if read_only { "true" } else { "false" }),
    );
    response
}
