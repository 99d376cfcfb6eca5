//! Static page served by the command server.
//!
//! A single form that posts the gain to `/command`, plus a WebSocket console
//! for pushing `{"kp": …}` messages without a page reload.

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>ddb</title>
<style>
body { font-family: sans-serif; margin: 2em; }
input, button { font-size: 1.2em; }
#log { font-family: monospace; white-space: pre; margin-top: 1em; }
</style>
</head>
<body>
<h1>Differential-drive bot</h1>
<form id="post" method="post" action="/command" enctype="text/plain">
  <label>kp <input id="kp" name="kp" type="number" step="any" value="1.0"></label>
  <button type="submit">POST</button>
  <button type="button" id="push">WebSocket</button>
</form>
<div id="log"></div>
<script>
const log = (m) => { document.getElementById('log').textContent += m + "\n"; };
document.getElementById('post').addEventListener('submit', (e) => {
  e.preventDefault();
  const kp = document.getElementById('kp').value;
  fetch('/command', { method: 'POST', body: '{"kp":' + kp + '}' })
    .then(() => log('POST kp=' + kp));
});
let ws;
document.getElementById('push').addEventListener('click', () => {
  const kp = parseFloat(document.getElementById('kp').value);
  const send = () => ws.send(JSON.stringify({ kp }));
  if (ws && ws.readyState === WebSocket.OPEN) { send(); return; }
  ws = new WebSocket('ws://' + location.host + '/ws', 'messages');
  ws.onmessage = (m) => log(m.data);
  ws.onopen = send;
});
</script>
</body>
</html>
"#;
