/// Control page served at `/`: the live stream next to the filter controls.
pub(crate) const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>frame-enhance</title>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; background: #0f172a; color: #e2e8f0; }
  main { display: flex; gap: 2rem; padding: 2rem; flex-wrap: wrap; }
  .feed { flex: 2 1 640px; background: #000; border-radius: 12px; overflow: hidden; }
  .feed img { width: 100%; display: block; }
  .controls { flex: 1 1 260px; background: #1e293b; border-radius: 12px; padding: 1.5rem; }
  label { display: flex; justify-content: space-between; margin: 1rem 0; }
  input[type=text] { width: 100%; box-sizing: border-box; padding: .4rem; }
  #status { font-family: monospace; font-size: .8rem; color: #94a3b8; }
</style>
</head>
<body>
<main>
  <div class="feed"><img src="/video_feed" alt="Live video feed"></div>
  <form class="controls" id="controls">
    <h2>Enhancement</h2>
    <label>Video source</label>
    <input type="text" name="source" placeholder="0 or /path/to/video.mp4">
    <label>CLAHE contrast <input type="checkbox" name="clahe"></label>
    <label>Denoise (slow) <input type="checkbox" name="denoise"></label>
    <label>Sharpen <span id="amount">0.0</span></label>
    <input type="range" name="unsharp_amount" min="0" max="3" step="0.1" value="0">
    <p id="status"></p>
  </form>
</main>
<script>
const form = document.getElementById('controls');
const status = document.getElementById('status');

function show(config) {
  form.source.value = config.source;
  form.clahe.checked = config.clahe;
  form.denoise.checked = config.denoise;
  form.unsharp_amount.value = config.unsharp_amount;
  document.getElementById('amount').textContent = Number(config.unsharp_amount).toFixed(1);
}

async function send(update) {
  const res = await fetch('/config', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(update),
  });
  const body = await res.json();
  if (res.ok) {
    show(body.config);
    status.textContent = 'updated';
  } else {
    status.textContent = body.error;
  }
}

form.clahe.addEventListener('change', e => send({ clahe: e.target.checked }));
form.denoise.addEventListener('change', e => send({ denoise: e.target.checked }));
form.unsharp_amount.addEventListener('change', e => send({ unsharp_amount: parseFloat(e.target.value) }));
form.source.addEventListener('change', e => send({ source: e.target.value }));
form.addEventListener('submit', e => e.preventDefault());

fetch('/config').then(res => res.json()).then(show);
</script>
</body>
</html>
"#;
