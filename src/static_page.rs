//! Browser console for trying the duplex channel and the push stream by hand

use crate::http::Response;
use http::StatusCode;

pub const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>echo-server</title>
<style>
  body { font-family: monospace; margin: 2em; }
  #log { white-space: pre-wrap; border: 1px solid #ccc; padding: 1em; height: 24em; overflow-y: scroll; }
  input { width: 30em; }
</style>
</head>
<body>
<h1>echo-server</h1>
<p>
  <button id="ws-connect">Open WebSocket</button>
  <button id="sse-connect">Open event stream</button>
  <button id="close">Close</button>
</p>
<p>
  <input id="message" placeholder="message to echo">
  <button id="send">Send</button>
</p>
<div id="log"></div>
<script>
  const log = (text) => {
    const el = document.getElementById("log");
    el.textContent += new Date().toISOString() + "  " + text + "\n";
    el.scrollTop = el.scrollHeight;
  };
  let ws = null;
  let es = null;
  const base = location.host + location.pathname.replace(/\/\.ws$/, "");

  document.getElementById("ws-connect").onclick = () => {
    if (ws) { ws.close(); }
    const scheme = location.protocol === "https:" ? "wss://" : "ws://";
    ws = new WebSocket(scheme + base + "/.ws");
    ws.binaryType = "arraybuffer";
    ws.onopen = () => log("[ws] open");
    ws.onmessage = (e) => log("[ws] recv " + (typeof e.data === "string" ? e.data : e.data.byteLength + " byte(s)"));
    ws.onclose = (e) => log("[ws] closed " + e.code);
    ws.onerror = () => log("[ws] error");
  };

  document.getElementById("sse-connect").onclick = () => {
    if (es) { es.close(); }
    es = new EventSource(location.protocol + "//" + base + "/.sse");
    for (const name of ["server", "request", "time"]) {
      es.addEventListener(name, (e) => log("[sse] " + name + " #" + e.lastEventId + ": " + e.data));
    }
    es.onerror = () => log("[sse] error");
  };

  document.getElementById("send").onclick = () => {
    const text = document.getElementById("message").value;
    if (ws && ws.readyState === WebSocket.OPEN) {
      ws.send(text);
      log("[ws] sent " + text);
    } else {
      log("[ws] not connected");
    }
  };

  document.getElementById("close").onclick = () => {
    if (ws) { ws.close(); ws = null; }
    if (es) { es.close(); es = null; log("[sse] closed"); }
  };
</script>
</body>
</html>
"#;

pub fn response() -> Response {
    Response::new(StatusCode::OK, "text/html", PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response() {
        let response = response();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.get("content-type").unwrap(), "text/html");
        assert!(String::from_utf8(response.body).unwrap().contains("new WebSocket("));
    }
}
