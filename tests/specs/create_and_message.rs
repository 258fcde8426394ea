// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local create + message: provision an agent on the local provider, see
//! its session come up, and deliver a message into the pane.

use mng_core::config::MngConfig;
use mng_core::options::{CreateAgentOptions, NewHostOptions};
use mng_core::state::AgentLifecycleState;
use mng_providers::{create_agent, AgentRegistry, HookRegistry, LocalProvider};
use mng_providers::provider::Provider;
use serial_test::serial;

fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! fail_if_no_tmux {
    () => {
        if !tmux_available() {
            panic!("tmux is required but not available");
        }
    };
}

fn test_config(dir: &tempfile::TempDir) -> MngConfig {
    MngConfig::new(dir.path()).with_session_prefix(format!("mngspec{}-", std::process::id()))
}

#[tokio::test]
#[serial(tmux)]
async fn create_starts_agent_and_send_reaches_the_pane() {
    fail_if_no_tmux!();
    let host_dir = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("README.md"), "seed\n").unwrap();

    let provider = LocalProvider::new(test_config(&host_dir));
    let host = provider
        .create_host(NewHostOptions::default())
        .await
        .unwrap();

    let options = CreateAgentOptions {
        name: Some(mng_core::name::AgentName::new("alpha")),
        agent_type: "process".to_string(),
        command: "sleep 99999".to_string(),
        source: Some(source.path().to_path_buf()),
        await_ready: true,
        ..CreateAgentOptions::default()
    };

    let (agent, host) = create_agent(
        &provider,
        &HookRegistry::new(),
        &AgentRegistry::with_builtins(),
        Some(host),
        None,
        options,
    )
    .await
    .unwrap();

    // The session exists under the configured prefix and the agent reports
    // a live lifecycle state.
    let state = agent.get_lifecycle_state(&host).await.unwrap();
    assert_eq!(state, AgentLifecycleState::Running);

    // The source tree was copied into the generated work dir.
    let work_dir = std::path::Path::new(&agent.data().work_dir);
    assert_eq!(
        std::fs::read_to_string(work_dir.join("README.md")).unwrap(),
        "seed\n"
    );

    // Deliver a message; the pane (a tty echoing its input) shows it.
    agent.send_message(&host, "hello").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let pane = agent.capture_pane_content(&host).await.unwrap();
    assert!(pane.contains("hello"), "pane content: {}", pane);

    agent.stop(&host).await.unwrap();
    assert_eq!(
        agent.get_lifecycle_state(&host).await.unwrap(),
        AgentLifecycleState::Stopped
    );
}

#[tokio::test]
#[serial(tmux)]
async fn destroyed_agent_leaves_no_state_dir() {
    fail_if_no_tmux!();
    let host_dir = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(test_config(&host_dir));
    let host = provider
        .create_host(NewHostOptions::default())
        .await
        .unwrap();

    let options = CreateAgentOptions {
        name: Some(mng_core::name::AgentName::new("doomed")),
        agent_type: "process".to_string(),
        command: "sleep 99999".to_string(),
        await_ready: true,
        ..CreateAgentOptions::default()
    };
    let (agent, host) = create_agent(
        &provider,
        &HookRegistry::new(),
        &AgentRegistry::with_builtins(),
        Some(host),
        None,
        options,
    )
    .await
    .unwrap();

    let agent_dir = host.paths().agent_dir(agent.id());
    assert!(agent_dir.exists());

    mng_providers::destroy_agent(&host, agent.as_ref()).await.unwrap();

    assert!(!agent_dir.exists());
    assert_eq!(
        agent.get_lifecycle_state(&host).await.unwrap(),
        AgentLifecycleState::Stopped
    );
}
