// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted CLI: pops queued responses, then repeats the last one.
#[derive(Default)]
struct ScriptedCli {
    logs: Mutex<VecDeque<Option<String>>>,
    lists: Mutex<VecDeque<Option<String>>>,
    log_calls: Arc<Mutex<usize>>,
}

impl ScriptedCli {
    fn push_log(&self, response: Option<&str>) {
        self.logs.lock().push_back(response.map(|s| s.to_string()));
    }

    fn push_list(&self, response: Option<&str>) {
        self.lists.lock().push_back(response.map(|s| s.to_string()));
    }
}

#[async_trait]
impl MngCli for &'static ScriptedCli {
    async fn read_agent_log(&self, _agent: &str, _log_file: &str) -> Option<String> {
        *self.log_calls.lock() += 1;
        let mut logs = self.logs.lock();
        if logs.len() > 1 {
            logs.pop_front().flatten()
        } else {
            logs.front().cloned().flatten()
        }
    }

    async fn list_agents_json(&self) -> Option<String> {
        let mut lists = self.lists.lock();
        if lists.len() > 1 {
            lists.pop_front().flatten()
        } else {
            lists.front().cloned().flatten()
        }
    }
}

fn leaked_cli() -> &'static ScriptedCli {
    Box::leak(Box::new(ScriptedCli::default()))
}

#[test]
fn server_log_parsing_skips_invalid_lines_and_overrides() {
    let text = r#"
{"server": "web", "url": "http://127.0.0.1:9100"}
not json at all
{"server": "api"}
{"server": "web", "url": "http://127.0.0.1:9200"}
"#;
    let servers = parse_server_log(text);
    assert_eq!(servers.len(), 1);
    // The later record for "web" wins.
    assert_eq!(servers["web"], "http://127.0.0.1:9200");
}

#[test]
fn agents_parsing_extracts_ssh_info_under_id_and_name() {
    let raw = serde_json::json!({
        "agents": [
            {"id": "agent-aaa", "name": "alpha"},
            {
                "id": "agent-bbb",
                "name": "beta",
                "host": {"ssh": {
                    "user": "root", "host": "10.0.0.5", "port": 22,
                    "key_path": "/keys/id_ed25519",
                }},
            },
            {"name": "no-id-is-skipped"},
        ],
    })
    .to_string();

    let parsed = parse_agents_json(&raw);
    assert_eq!(parsed.agent_ids, vec!["agent-aaa", "agent-bbb"]);
    assert_eq!(parsed.ssh_info["agent-bbb"].host, "10.0.0.5");
    assert_eq!(parsed.ssh_info["beta"].port, 22);
    assert!(!parsed.ssh_info.contains_key("agent-aaa"));
}

#[test]
fn agents_parsing_tolerates_garbage() {
    assert!(parse_agents_json("not json").agent_ids.is_empty());
    assert!(parse_agents_json("{}").agent_ids.is_empty());
}

#[tokio::test]
async fn static_resolver_answers_from_its_map() {
    let mut urls = HashMap::new();
    urls.insert("alpha".to_string(), {
        let mut servers = HashMap::new();
        servers.insert("web".to_string(), "http://127.0.0.1:9100".to_string());
        servers.insert("api".to_string(), "http://127.0.0.1:9101".to_string());
        servers
    });
    let resolver = StaticBackendResolver::new(urls);

    assert_eq!(
        resolver.get_backend_url("alpha", "web").await.as_deref(),
        Some("http://127.0.0.1:9100")
    );
    assert_eq!(resolver.get_backend_url("alpha", "vnc").await, None);
    assert_eq!(resolver.get_backend_url("beta", "web").await, None);
    assert_eq!(resolver.list_known_agents().await, vec!["alpha"]);
    assert_eq!(
        resolver.list_servers_for_agent("alpha").await,
        vec!["api", "web"]
    );
}

#[tokio::test]
async fn cli_resolver_caches_within_ttl() {
    let cli = leaked_cli();
    cli.push_log(Some(r#"{"server": "web", "url": "http://127.0.0.1:9100"}"#));
    let resolver = CliBackendResolver::new(Box::new(cli));

    let first = resolver.get_backend_url("alpha", "web").await;
    let second = resolver.get_backend_url("alpha", "web").await;

    assert_eq!(first.as_deref(), Some("http://127.0.0.1:9100"));
    assert_eq!(second, first);
    // Second lookup served from cache.
    assert_eq!(*cli.log_calls.lock(), 1);
}

#[tokio::test]
async fn cli_failure_serves_previous_value() {
    let cli = leaked_cli();
    cli.push_log(Some(r#"{"server": "web", "url": "http://127.0.0.1:9100"}"#));
    cli.push_log(None);
    let resolver = CliBackendResolver::new(Box::new(cli));

    assert_eq!(
        resolver.get_backend_url("alpha", "web").await.as_deref(),
        Some("http://127.0.0.1:9100")
    );

    // Force the cache past its TTL, then fail the refresh: the previous
    // value is still served, not an empty map.
    resolver
        .server_cache
        .lock()
        .get_mut("alpha")
        .unwrap()
        .fetched_at = Instant::now() - Duration::from_secs(60);

    assert_eq!(
        resolver.get_backend_url("alpha", "web").await.as_deref(),
        Some("http://127.0.0.1:9100")
    );
}

#[tokio::test]
async fn cli_resolver_resolves_ssh_info() {
    let cli = leaked_cli();
    cli.push_list(Some(
        &serde_json::json!({
            "agents": [{
                "id": "agent-bbb",
                "name": "beta",
                "host": {"ssh": {
                    "user": "root", "host": "10.0.0.5", "port": 2222,
                    "key_path": "/keys/id_ed25519",
                }},
            }],
        })
        .to_string(),
    ));
    let resolver = CliBackendResolver::new(Box::new(cli));

    let info = resolver.get_ssh_info("beta").await.unwrap();
    assert_eq!(info.user, "root");
    assert_eq!(info.port, 2222);
    assert_eq!(resolver.get_ssh_info("agent-aaa").await, None);
    assert_eq!(resolver.list_known_agents().await, vec!["agent-bbb"]);
}
