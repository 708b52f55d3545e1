use axum::{response::Html, routing::get, Router};

pub fn router() -> Router {
    Router::new().route("/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Data Science Crew</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 2rem; color: #1d1d1f; }
    h1 { margin-bottom: 0.5rem; }
    .card { border: 1px solid #ddd; padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
    .locked { opacity: 0.5; }
    label { display: block; margin-top: 0.75rem; font-weight: 600; }
    input, textarea { width: 100%; padding: 0.5rem; box-sizing: border-box; }
    button { margin-top: 1rem; padding: 0.6rem 1rem; }
    pre { background: #f6f8fa; padding: 1rem; overflow: auto; white-space: pre-wrap; }
    .status { margin-top: 0.5rem; font-style: italic; }
  </style>
</head>
<body>
  <h1>Data Science Crew</h1>
  <p>Intake, data engineering, analysis and reporting, each run by its own agents.</p>

  <div class="card">
    <label>Google API Key (optional if set on the server)</label>
    <input id="apiKey" type="password" autocomplete="off" />
  </div>

  <div class="card" id="panel-intake">
    <h2>1. Intake &amp; Scope</h2>
    <label>Describe your data science project request</label>
    <textarea id="request" rows="3">Build a churn model to see why users leave</textarea>
    <button id="intakeBtn">Submit Request</button>
    <div class="status" id="intakeStatus"></div>
    <h3>Jira Ticket</h3><pre id="ticket"></pre>
    <h3>Project Plan</h3><pre id="plan"></pre>
  </div>

  <div class="card locked" id="panel-data">
    <h2>2. Data Engineering</h2>
    <label>Upload CSV Data</label>
    <input id="fileInput" type="file" accept=".csv" />
    <button id="dataBtn">Clean Data</button>
    <div class="status" id="dataStatus"></div>
    <pre id="dataOutput"></pre>
  </div>

  <div class="card locked" id="panel-analysis">
    <h2>3. Analysis</h2>
    <button id="analysisBtn">Run Analysis</button>
    <div class="status" id="analysisStatus"></div>
    <pre id="analysisOutput"></pre>
  </div>

  <div class="card locked" id="panel-report">
    <h2>4. Reporting</h2>
    <button id="reportBtn">Generate Presentation</button>
    <div class="status" id="reportStatus"></div>
    <p><a id="download" href="/api/report/download" hidden>Download PowerPoint</a></p>
  </div>

  <script>
    const order = ['idle', 'intake_done', 'data_ready', 'analysis_ready', 'report_ready'];
    const panels = { 'panel-data': 1, 'panel-analysis': 2, 'panel-report': 3 };
    const $ = (id) => document.getElementById(id);

    function headers(extra) {
      const h = Object.assign({}, extra || {});
      const key = $('apiKey').value.trim();
      if (key) h['x-api-key'] = key;
      return h;
    }

    function render(session) {
      const reached = order.indexOf(session.state);
      for (const [id, needed] of Object.entries(panels)) {
        $(id).classList.toggle('locked', reached < needed);
      }
      if (session.intake) {
        $('ticket').textContent = session.intake.ticket;
        $('plan').textContent = session.intake.plan;
      }
      if (session.data) {
        $('dataOutput').textContent = session.data.preview + '\n' + session.data.summary;
      }
      if (session.analysis) {
        $('analysisOutput').textContent = session.analysis.summary;
      }
      $('download').hidden = !session.report;
    }

    async function refresh() {
      const res = await fetch('/api/session');
      render(await res.json());
    }

    async function call(statusId, label, url, options) {
      $(statusId).textContent = label;
      try {
        const res = await fetch(url, options);
        const json = await res.json();
        if (json.status === 'error') {
          $(statusId).textContent = json.error;
        } else {
          $(statusId).textContent = 'Done.';
        }
      } catch (e) {
        $(statusId).textContent = 'Request failed: ' + e;
      }
      await refresh();
    }

    $('intakeBtn').addEventListener('click', () => call('intakeStatus',
      'Intake Manager & Scrum Master are working...', '/api/intake', {
        method: 'POST',
        headers: headers({ 'Content-Type': 'application/json' }),
        body: JSON.stringify({ request: $('request').value })
      }));

    $('dataBtn').addEventListener('click', () => {
      const form = new FormData();
      if ($('fileInput').files.length) form.append('file', $('fileInput').files[0]);
      return call('dataStatus', 'Data Engineer is cleaning the dataset...', '/api/data', {
        method: 'POST', headers: headers(), body: form
      });
    });

    $('analysisBtn').addEventListener('click', () => call('analysisStatus',
      'Senior Data Scientist is training the model...', '/api/analysis', {
        method: 'POST', headers: headers()
      }));

    $('reportBtn').addEventListener('click', () => call('reportStatus',
      'Presentation Designer is building the deck...', '/api/report', {
        method: 'POST', headers: headers()
      }));

    refresh();
  </script>
</body>
</html>"#)
}
