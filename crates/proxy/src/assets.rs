// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing assets: bootstrap page, service worker, WebSocket shim,
//! and the small HTML pages the server renders itself.
//!
//! The service worker rewrites same-origin fetches so agent web UIs that
//! assume root-relative paths work unmodified behind the `/agents/<name>`
//! prefix. The bootstrap installs it once, marks installation with a
//! cookie, and reloads so the original page loads through the worker.

use crate::cookie::{agent_path_prefix, sw_installed_cookie_name};

/// HTML that registers the service worker, sets the installed cookie, and
/// reloads.
pub fn bootstrap_html(agent_name: &str) -> String {
    let prefix = agent_path_prefix(agent_name);
    let installed_cookie = sw_installed_cookie_name(agent_name);
    format!(
        r#"<!DOCTYPE html>
<html><head><title>Loading...</title></head>
<body>
<p>Loading...</p>
<script>
const PREFIX = '{prefix}/';
const SW_URL = PREFIX + '__sw.js';

async function boot() {{
  const reg = await navigator.serviceWorker.register(SW_URL, {{ scope: PREFIX }});
  const sw = reg.installing || reg.waiting || reg.active;

  function onActivated() {{
    document.cookie = '{installed_cookie}=1; path=' + PREFIX;
    location.reload();
  }}

  if (sw.state === 'activated') {{
    onActivated();
    return;
  }}

  sw.addEventListener('statechange', () => {{
    if (sw.state === 'activated') onActivated();
  }});
}}

boot().catch(err => {{
  document.body.textContent = 'Failed to initialize: ' + err.message;
}});
</script>
</body></html>"#
    )
}

/// The service worker script, text-substituted per agent.
pub fn service_worker_js(agent_name: &str) -> String {
    let prefix = agent_path_prefix(agent_name);
    format!(
        r#"const PREFIX = '{prefix}';

self.addEventListener('install', () => self.skipWaiting());
self.addEventListener('activate', (e) => e.waitUntil(self.clients.claim()));

self.addEventListener('fetch', (event) => {{
  const url = new URL(event.request.url);

  // Only rewrite same-origin requests
  if (url.origin !== location.origin) return;

  // Already prefixed, let it through
  if (url.pathname.startsWith(PREFIX + '/') || url.pathname === PREFIX) return;

  // Skip the SW script itself
  if (url.pathname.endsWith('__sw.js')) return;

  // Rewrite: /foo -> {prefix}/foo
  url.pathname = PREFIX + url.pathname;

  const init = {{
    method: event.request.method,
    headers: event.request.headers,
    mode: event.request.mode,
    credentials: event.request.credentials,
    redirect: 'manual',
  }};

  // Only attach body for methods that support it
  if (!['GET', 'HEAD'].includes(event.request.method)) {{
    init.body = event.request.body;
    init.duplex = 'half';
  }}

  event.respondWith(fetch(new Request(url.toString(), init)));
}});
"#
    )
}

/// Script injected into proxied HTML that wraps `WebSocket` so same-origin
/// socket URLs gain the agent prefix.
pub fn websocket_shim_js(agent_name: &str) -> String {
    let prefix = agent_path_prefix(agent_name);
    format!(
        r#"<script>
(function() {{
  var PREFIX = '{prefix}';
  var OrigWebSocket = window.WebSocket;

  window.WebSocket = function(url, protocols) {{
    try {{
      var parsed = new URL(url, location.origin);
      if (parsed.host === location.host) {{
        if (!parsed.pathname.startsWith(PREFIX + '/') && parsed.pathname !== PREFIX) {{
          parsed.pathname = PREFIX + parsed.pathname;
        }}
        url = parsed.toString();
      }}
    }} catch(e) {{}}
    return protocols !== undefined
      ? new OrigWebSocket(url, protocols)
      : new OrigWebSocket(url);
  }};

  window.WebSocket.prototype = OrigWebSocket.prototype;
  window.WebSocket.CONNECTING = OrigWebSocket.CONNECTING;
  window.WebSocket.OPEN = OrigWebSocket.OPEN;
  window.WebSocket.CLOSING = OrigWebSocket.CLOSING;
  window.WebSocket.CLOSED = OrigWebSocket.CLOSED;
}})();
</script>"#
    )
}

/// Inject the WebSocket shim right after `<head>` (handling attributes),
/// or prepend it when the document has no head at all.
pub fn inject_websocket_shim(html: &str, agent_name: &str) -> String {
    let shim = websocket_shim_js(agent_name);

    if let Some(idx) = html.find("<head>") {
        let insert_at = idx + "<head>".len();
        return format!("{}{}{}", &html[..insert_at], shim, &html[insert_at..]);
    }
    if let Some(idx) = html.find("<head ") {
        if let Some(close) = html[idx..].find('>') {
            let insert_at = idx + close + 1;
            return format!("{}{}{}", &html[..insert_at], shim, &html[insert_at..]);
        }
    }
    format!("{}{}", shim, html)
}

/// Landing page listing the agents this browser is authenticated for.
pub fn landing_page_html(agent_names: &[String]) -> String {
    let body = if agent_names.is_empty() {
        "<p>No agents are accessible from this browser. \
         Use a login link to authenticate.</p>"
            .to_string()
    } else {
        let items: String = agent_names
            .iter()
            .map(|name| {
                format!(
                    "<li><a href=\"/agents/{name}/\">{name}</a></li>",
                    name = name
                )
            })
            .collect();
        format!("<ul>{}</ul>", items)
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Agent Gateway</title></head>
<body>
<h1>Agent Gateway</h1>
{body}
</body>
</html>"#
    )
}

/// Login page that forwards the one-time code to `/authenticate` from
/// JavaScript, keeping the code out of intermediary redirect logs.
pub fn login_redirect_html(agent_name: &str, one_time_code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Signing in...</title></head>
<body>
<p>Signing in...</p>
<script>
window.location.href = '/authenticate?changeling_name={agent_name}&one_time_code={one_time_code}';
</script>
</body>
</html>"#
    )
}

/// Page shown when a one-time code does not validate.
pub fn invalid_code_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Login failed</title></head>
<body>
<h1>Login failed</h1>
<p>This login link is invalid or has already been used. Ask the agent for a
fresh link.</p>
</body>
</html>"#
        .to_string()
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod tests;
