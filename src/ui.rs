use crate::models::{LocalEntry, TIN_CHOICES, Tins};
use crate::tracker::TrackerState;
use std::fmt::Write as _;

pub fn render_auth(email: &str, message: Option<&str>) -> String {
    let message = message
        .map(|text| format!(r#"<p class="status">{}</p>"#, escape(text)))
        .unwrap_or_default();
    AUTH_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{EMAIL}}", &escape(email))
        .replace("{{MESSAGE}}", &message)
}

pub fn render_tracker(email: Option<&str>, state: &TrackerState) -> String {
    let error = state
        .error
        .as_deref()
        .map(|text| format!(r#"<p class="status" data-type="error">{}</p>"#, escape(text)))
        .unwrap_or_default();

    let total = if state.history.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="total">✅ Total Tins Submitted: <strong id="total">{}</strong></div>"#,
            state.history.total_tins()
        )
    };

    let history = if state.loading {
        r#"<p class="hint">Loading entries…</p>"#.to_string()
    } else if state.history.is_empty() {
        r#"<p class="hint">No data yet.</p>"#.to_string()
    } else {
        let mut items = String::from(r#"<ul class="history">"#);
        for entry in state.history.entries() {
            let _ = write!(
                items,
                r#"<li><div><div class="tins">{tins} Tin(s)</div><div class="hint">{date}</div></div><form method="post" action="/form/entries/{id}/delete"><button class="btn-danger" type="submit">Delete</button></form></li>"#,
                tins = entry.tins,
                date = entry.date,
                id = entry.id,
            );
        }
        items.push_str("</ul>");
        items
    };

    let submit_label = if state.submitting { "Saving..." } else { "Submit" };

    TRACKER_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{USER}}", &escape(email.unwrap_or("")))
        .replace("{{TIN_OPTIONS}}", &tin_options(state.form.tins))
        .replace("{{DATE}}", &escape(&state.form.date))
        .replace("{{SUBMIT_LABEL}}", submit_label)
        .replace("{{ERROR}}", &error)
        .replace("{{TOTAL}}", &total)
        .replace("{{HISTORY}}", &history)
}

pub fn render_local(entries: &[LocalEntry], total: u64) -> String {
    let history = if entries.is_empty() {
        r#"<p class="hint">No data yet.</p>"#.to_string()
    } else {
        let mut items = String::from(r#"<ul class="history">"#);
        for entry in entries {
            let _ = write!(
                items,
                r#"<li><div><div class="tins">{} Tin(s)</div><div class="hint">{}</div></div></li>"#,
                entry.tins, entry.date
            );
        }
        items.push_str("</ul>");
        items
    };

    LOCAL_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{TIN_OPTIONS}}", &tin_options(Tins::default()))
        .replace("{{TOTAL}}", &total.to_string())
        .replace("{{HISTORY}}", &history)
}

fn tin_options(selected: Tins) -> String {
    TIN_CHOICES
        .iter()
        .map(|value| {
            let marker = if *value == selected.get() { " selected" } else { "" };
            format!(r#"<option value="{value}"{marker}>{value}</option>"#)
        })
        .collect()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = r#"
    :root {
      --bg-1: #e6f4f8;
      --bg-2: #a7dcf5;
      --ink: #1f2b33;
      --accent: #1f8fbf;
      --accent-2: #2f4858;
      --danger: #c63b2b;
      --card: rgba(255, 255, 255, 0.88);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #d4f1ff 60%, #eef8fb 100%);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(560px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 32px;
      display: grid;
      gap: 22px;
    }

    header {
      display: flex;
      align-items: center;
      justify-content: space-between;
      gap: 12px;
    }

    h1 {
      font-family: "Georgia", serif;
      font-size: clamp(1.6rem, 4vw, 2.2rem);
      margin: 0;
    }

    form.card {
      display: grid;
      gap: 12px;
      background: white;
      border-radius: 18px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
    }

    label {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.1em;
      color: #60717c;
    }

    input, select {
      width: 100%;
      padding: 10px 12px;
      border-radius: 10px;
      border: 1px solid rgba(47, 72, 88, 0.2);
      font-size: 1rem;
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 12px 18px;
      font-size: 1rem;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
    }

    .btn-secondary {
      background: var(--accent-2);
      font-size: 0.85rem;
      padding: 8px 14px;
    }

    .btn-danger {
      background: var(--danger);
      font-size: 0.85rem;
      padding: 8px 14px;
    }

    .actions {
      display: flex;
      gap: 12px;
    }

    .total {
      padding: 12px 16px;
      border-radius: 14px;
      background: rgba(47, 72, 88, 0.06);
    }

    .history {
      list-style: none;
      margin: 0;
      padding: 0;
      display: grid;
      gap: 10px;
    }

    .history li {
      display: flex;
      align-items: center;
      justify-content: space-between;
      background: white;
      border-radius: 14px;
      padding: 12px 16px;
    }

    .tins {
      font-weight: 600;
    }

    .status {
      font-size: 0.95rem;
      color: #4c5a63;
    }

    .status[data-type="error"] {
      color: var(--danger);
    }

    .hint {
      margin: 0;
      color: #6f7a80;
      font-size: 0.9rem;
    }
"#;

const AUTH_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Water Bottle App</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header><h1>Water Bottle App</h1></header>
    <form class="card" method="post" action="/auth/sign-in">
      <label for="email">Email</label>
      <input id="email" name="email" type="email" placeholder="Enter email" value="{{EMAIL}}" autocomplete="email" required />
      <label for="password">Password</label>
      <input id="password" name="password" type="password" placeholder="Enter password" autocomplete="current-password" required />
      <div class="actions">
        <button type="submit" formaction="/auth/sign-up" class="btn-secondary">Sign Up</button>
        <button type="submit">Sign In</button>
      </div>
    </form>
    {{MESSAGE}}
    <p class="hint"><a href="/local">Use without an account</a> (entries stay on this server only).</p>
  </main>
</body>
</html>
"#;

const TRACKER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Water Bottle Tracker</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header>
      <h1>💧 Water Bottle Tracker</h1>
      <form method="post" action="/auth/sign-out">
        <button class="btn-secondary" type="submit">Logout</button>
      </form>
    </header>
    <p class="hint">{{USER}}</p>

    <form class="card" method="post" action="/form/entries">
      <label for="tins">Number of Water Tins</label>
      <select id="tins" name="tins">{{TIN_OPTIONS}}</select>
      <label for="date">Date of Deposit</label>
      <input id="date" name="date" type="date" value="{{DATE}}" required />
      <button type="submit">{{SUBMIT_LABEL}}</button>
      {{ERROR}}
    </form>

    {{TOTAL}}

    <section>
      <h2>Submission History</h2>
      {{HISTORY}}
    </section>
  </main>

  <script>
    const events = new EventSource('/api/session/events');
    events.addEventListener('redirect', (event) => {
      events.close();
      window.location.replace(event.data || '/');
    });
  </script>
</body>
</html>
"#;

const LOCAL_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Water Bottle Tracker (local)</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header><h1>💧 Water Bottle Tracker</h1></header>
    <form class="card" method="post" action="/local/entries">
      <label for="tins">Number of Water Tins</label>
      <select id="tins" name="tins">{{TIN_OPTIONS}}</select>
      <label for="date">Date of Deposit</label>
      <input id="date" name="date" type="date" required />
      <button type="submit">Submit</button>
    </form>
    <div class="total">✅ Total Tins Submitted: <strong id="total">{{TOTAL}}</strong></div>
    <section>
      <h2>Submission History</h2>
      {{HISTORY}}
    </section>
    <p class="hint"><a href="/">Sign in</a> to keep entries with your account.</p>
  </main>
</body>
</html>
"#;
