//! Bundled inspector web UI.
//!
//! A single self-contained page, no external assets, so the inspector
//! keeps working offline.

pub const INSPECTOR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>hz Inspector</title>
<style>
  :root {
    --bg: #111418; --panel: #1a1f26; --border: #2a313b;
    --text: #d7dde5; --dim: #7a8694; --accent: #4c9aff;
    --ok: #3fb950; --warn: #d29922; --err: #f85149;
  }
  * { box-sizing: border-box; }
  body {
    margin: 0; background: var(--bg); color: var(--text);
    font: 14px/1.5 ui-monospace, "SF Mono", Menlo, Consolas, monospace;
  }
  header {
    display: flex; align-items: center; gap: 12px;
    padding: 12px 20px; background: var(--panel);
    border-bottom: 1px solid var(--border);
    position: sticky; top: 0;
  }
  header h1 { font-size: 15px; margin: 0; font-weight: 600; }
  #live { width: 8px; height: 8px; border-radius: 50%; background: var(--ok); }
  #live.off { background: var(--err); }
  header .spacer { flex: 1; }
  button {
    background: none; color: var(--dim); border: 1px solid var(--border);
    border-radius: 4px; padding: 4px 10px; font: inherit; cursor: pointer;
  }
  button:hover { color: var(--text); border-color: var(--dim); }
  main { display: flex; height: calc(100vh - 53px); }
  #list { flex: 1; overflow-y: auto; border-right: 1px solid var(--border); }
  #detail { flex: 1; overflow-y: auto; padding: 16px 20px; white-space: pre-wrap; }
  table { width: 100%; border-collapse: collapse; }
  td {
    padding: 6px 10px; border-bottom: 1px solid var(--border);
    white-space: nowrap; overflow: hidden; text-overflow: ellipsis;
  }
  tr { cursor: pointer; }
  tr:hover, tr.selected { background: #202733; }
  .method { color: var(--accent); width: 60px; }
  .status-2 { color: var(--ok); }
  .status-3 { color: var(--accent); }
  .status-4 { color: var(--warn); }
  .status-5 { color: var(--err); }
  .dim { color: var(--dim); }
  .empty { padding: 40px; text-align: center; color: var(--dim); }
</style>
</head>
<body>
<header>
  <span id="live" title="live feed"></span>
  <h1>hz inspector</h1>
  <span class="spacer"></span>
  <span class="dim" id="count"></span>
  <button onclick="clearRequests()">clear</button>
</header>
<main>
  <div id="list"><div class="empty">waiting for requests&hellip;</div></div>
  <pre id="detail" class="dim">select a request</pre>
</main>
<script>
  let requests = [];
  let selected = null;

  function statusClass(code) { return 'status-' + Math.floor(code / 100); }

  function render() {
    const list = document.getElementById('list');
    document.getElementById('count').textContent = requests.length + ' captured';
    if (requests.length === 0) {
      list.innerHTML = '<div class="empty">waiting for requests&hellip;</div>';
      return;
    }
    const rows = requests.map(r =>
      '<tr data-id="' + r.id + '"' + (r.id === selected ? ' class="selected"' : '') + '>' +
      '<td class="method">' + r.method + '</td>' +
      '<td>' + r.path + '</td>' +
      '<td class="' + statusClass(r.status_code) + '">' + r.status_code + '</td>' +
      '<td class="dim">' + r.service + '</td>' +
      '<td class="dim">' + r.duration_ms.toFixed(1) + ' ms</td>' +
      '</tr>');
    list.innerHTML = '<table>' + rows.join('') + '</table>';
    list.querySelectorAll('tr').forEach(tr =>
      tr.addEventListener('click', () => select(tr.dataset.id)));
  }

  function select(id) {
    selected = id;
    const r = requests.find(x => x.id === id);
    const detail = document.getElementById('detail');
    detail.classList.remove('dim');
    detail.textContent = r ? JSON.stringify(r, null, 2) : '';
    render();
  }

  function clearRequests() {
    fetch('/api/requests/clear', { method: 'POST' }).then(() => {
      requests = [];
      selected = null;
      render();
    });
  }

  function connect() {
    const source = new EventSource('/api/requests/sse');
    source.onopen = () => document.getElementById('live').classList.remove('off');
    source.onmessage = (e) => {
      const record = JSON.parse(e.data);
      requests = requests.filter(r => r.id !== record.id);
      requests.unshift(record);
      render();
    };
    source.onerror = () => {
      document.getElementById('live').classList.add('off');
      source.close();
      setTimeout(connect, 2000);
    };
  }

  fetch('/api/requests')
    .then(r => r.json())
    .then(data => { requests = data; render(); connect(); });
</script>
</body>
</html>
"#;
