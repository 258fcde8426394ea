// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provisioning pipeline and its plugin hook points.
//!
//! Creating an agent on a (possibly new) host runs an ordered sequence of
//! phases, each of which plugins can extend:
//!
//! 1. `on_before_host_create` (new hosts only)
//! 2. provider creates the host, `on_host_created`
//! 3. initial file copy, bracketed by before/after hooks (skipped when the
//!    caller opts out of work-dir creation)
//! 4. agent state dir creation, `on_agent_state_dir_created`
//! 5. `on_before_provisioning`: plugins install credentials, symlinks,
//!    skill files. Must be idempotent.
//! 6. caller-supplied provisioning options (directories, uploads, file
//!    edits, sudo and user commands) and the merged environment
//! 7. `on_after_provisioning`
//! 8. `on_agent_created`
//!
//! A separate `provision` operation re-runs phases 5-7 against an existing
//! agent; the host must be online but the agent may be stopped.

use crate::agent::{await_ready, Agent, AgentRegistry};
use crate::connector::shell_escape_single_quotes;
use crate::host::OnlineHost;
use crate::provider::Provider;
use async_trait::async_trait;
use mng_adapters::env::{merge_env_sources, merge_preserving_existing, render_env_file};
use mng_core::agent_data::CertifiedAgentData;
use mng_core::error::MngError;
use mng_core::id::AgentId;
use mng_core::name::{generate_agent_name, HostName, ProviderInstanceName};
use mng_core::options::{AgentProvisioningOptions, CreateAgentOptions, NewHostOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Plugin hook points, called in registration order at each phase.
///
/// Every method defaults to a no-op; plugins override what they need.
#[async_trait]
pub trait ProvisioningHooks: Send + Sync {
    async fn on_before_host_create(
        &self,
        _name: &HostName,
        _provider: &ProviderInstanceName,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_host_created(&self, _host: &OnlineHost) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_before_initial_file_copy(
        &self,
        _options: &CreateAgentOptions,
        _host: &OnlineHost,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_after_initial_file_copy(
        &self,
        _options: &CreateAgentOptions,
        _host: &OnlineHost,
        _work_dir: &Path,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_agent_state_dir_created(
        &self,
        _agent: &CertifiedAgentData,
        _host: &OnlineHost,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_before_provisioning(
        &self,
        _agent: &CertifiedAgentData,
        _host: &OnlineHost,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_after_provisioning(
        &self,
        _agent: &CertifiedAgentData,
        _host: &OnlineHost,
    ) -> Result<(), MngError> {
        Ok(())
    }

    async fn on_agent_created(
        &self,
        _agent: &CertifiedAgentData,
        _host: &OnlineHost,
    ) -> Result<(), MngError> {
        Ok(())
    }
}

/// Ordered collection of registered plugin hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ProvisioningHooks>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hooks: Arc<dyn ProvisioningHooks>) {
        self.hooks.push(hooks);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProvisioningHooks>> {
        self.hooks.iter()
    }
}

async fn run_host_command(host: &OnlineHost, command: &str) -> Result<(), MngError> {
    let result = host
        .execute_command(command, Some(Duration::from_secs(600)))
        .await?;
    if !result.success {
        return Err(MngError::CommandFailed(format!(
            "provisioning command failed: {}: {}",
            command,
            result.stderr.trim()
        )));
    }
    Ok(())
}

/// Resolve an upload or edit path against the agent's work dir.
fn resolve_remote_path(work_dir: &Path, path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

/// Apply caller-supplied provisioning options (phase 6).
async fn apply_provisioning_options(
    host: &OnlineHost,
    agent: &CertifiedAgentData,
    options: &AgentProvisioningOptions,
) -> Result<(), MngError> {
    let work_dir = Path::new(&agent.work_dir);

    for dir in &options.created_directories {
        let target = resolve_remote_path(work_dir, dir);
        run_host_command(
            host,
            &format!(
                "mkdir -p '{}'",
                shell_escape_single_quotes(&target.display().to_string())
            ),
        )
        .await?;
    }

    for upload in &options.uploads {
        let target = resolve_remote_path(work_dir, &upload.remote_path);
        host.connector()
            .copy_file_from_local(&upload.local_path, &target)
            .await?;
    }

    for edit in &options.prepends {
        let target = resolve_remote_path(work_dir, &edit.remote_path);
        let existing = host
            .connector()
            .read_file(&target)
            .await?
            .unwrap_or_default();
        host.write_text_file(&target, &format!("{}{}", edit.text, existing))
            .await?;
    }

    for edit in &options.appends {
        let target = resolve_remote_path(work_dir, &edit.remote_path);
        let existing = host
            .connector()
            .read_file(&target)
            .await?
            .unwrap_or_default();
        host.write_text_file(&target, &format!("{}{}", existing, edit.text))
            .await?;
    }

    for command in &options.sudo_commands {
        run_host_command(host, &format!("sudo sh -c '{}'", shell_escape_single_quotes(command)))
            .await?;
    }

    for command in &options.user_commands {
        run_host_command(host, command).await?;
    }

    write_merged_env(host, agent, options).await
}

/// Merge environment sources and write `<agent_dir>/env`.
///
/// Keys already present on the host survive; only collisions are replaced.
async fn write_merged_env(
    host: &OnlineHost,
    agent: &CertifiedAgentData,
    options: &AgentProvisioningOptions,
) -> Result<(), MngError> {
    let mut file_contents = Vec::new();
    for path in &options.env.env_files {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MngError::io(path, e))?;
        file_contents.push(contents);
    }

    let merged = merge_env_sources(
        &options.env.pass_env,
        &options.env.literals,
        &file_contents,
        |name| std::env::var(name).ok(),
    );

    let env_path = host.paths().agent_env_file(&agent.id);
    let existing = host
        .connector()
        .read_file(&env_path)
        .await?
        .unwrap_or_default();
    let rendered = if existing.is_empty() {
        render_env_file(&merged)
    } else {
        merge_preserving_existing(&existing, &merged)
    };
    host.write_text_file(&env_path, &rendered).await
}

/// Run phases 5-7 for an agent: plugin provisioning, variant provisioning,
/// caller options.
pub async fn provision_agent(
    host: &OnlineHost,
    hooks: &HookRegistry,
    agent: &Arc<dyn Agent>,
    options: &AgentProvisioningOptions,
) -> Result<(), MngError> {
    let data = agent.data();
    for hook in hooks.iter() {
        hook.on_before_provisioning(data, host).await?;
    }
    agent.provision(host).await?;
    apply_provisioning_options(host, data, options).await?;
    for hook in hooks.iter() {
        hook.on_after_provisioning(data, host).await?;
    }
    Ok(())
}

/// Create (and optionally start) an agent, running the full pipeline.
///
/// When `new_host` is given the provider creates a fresh host first;
/// otherwise `existing_host` is used as-is.
pub async fn create_agent(
    provider: &dyn Provider,
    hooks: &HookRegistry,
    registry: &AgentRegistry,
    existing_host: Option<OnlineHost>,
    new_host: Option<NewHostOptions>,
    options: CreateAgentOptions,
) -> Result<(Arc<dyn Agent>, OnlineHost), MngError> {
    // Phases 1-2: host resolution.
    let host = match (existing_host, new_host) {
        (Some(host), _) => host,
        (None, Some(new_host_options)) => {
            let name = new_host_options
                .name
                .clone()
                .unwrap_or_else(|| mng_core::name::generate_host_name(|_| false));
            for hook in hooks.iter() {
                hook.on_before_host_create(&name, provider.name()).await?;
            }
            let known_hosts = new_host_options.known_hosts.clone();
            let volume_mount_path = new_host_options.volume_mount_path.clone();
            let host = provider.create_host(new_host_options).await?;
            crate::host_setup::prepare_host(&host, &known_hosts, volume_mount_path.as_deref())
                .await?;
            for hook in hooks.iter() {
                hook.on_host_created(&host).await?;
            }
            host
        }
        (None, None) => {
            return Err(MngError::Other(
                "create_agent needs an existing host or new-host options".to_string(),
            ));
        }
    };

    // Agent identity.
    let existing_names: Vec<String> = host
        .get_agent_references()
        .await?
        .into_iter()
        .map(|r| r.agent_name.0)
        .collect();
    let agent_name = match options.name.clone() {
        Some(name) => {
            if existing_names.iter().any(|n| n == name.as_str()) {
                return Err(MngError::NameInUse(name.to_string()));
            }
            name
        }
        None => generate_agent_name(|candidate| existing_names.iter().any(|n| n == candidate)),
    };

    // Work dir resolution: user-supplied or generated (and tracked).
    let (work_dir, is_generated) = match &options.work_dir {
        Some(dir) => (dir.clone(), false),
        None => (host.paths().work_dir_for(agent_name.as_str()), true),
    };

    // Phase 3: initial file copy.
    if options.create_work_dir {
        for hook in hooks.iter() {
            hook.on_before_initial_file_copy(&options, &host).await?;
        }
        match &options.source {
            Some(source) => {
                host.connector()
                    .copy_dir_from_local(source, &work_dir)
                    .await?;
            }
            None => {
                run_host_command(
                    &host,
                    &format!(
                        "mkdir -p '{}'",
                        shell_escape_single_quotes(&work_dir.display().to_string())
                    ),
                )
                .await?;
            }
        }
        for hook in hooks.iter() {
            hook.on_after_initial_file_copy(&options, &host, &work_dir)
                .await?;
        }
    }
    if is_generated {
        host.track_generated_work_dir(&work_dir).await?;
    }

    // Phase 4: agent state.
    let mut data = CertifiedAgentData::new(
        AgentId::generate(),
        agent_name,
        options.agent_type.clone(),
        options.command.clone(),
        work_dir.display().to_string(),
        host.id().clone(),
    );
    data.permissions = options.permissions.clone();
    host.create_agent_state(&data, "").await?;
    for hook in hooks.iter() {
        hook.on_agent_state_dir_created(&data, &host).await?;
    }

    let agent = registry.build(data.clone())?;

    // Phases 5-7.
    provision_agent(&host, hooks, &agent, &options.provisioning).await?;

    // Phase 8.
    for hook in hooks.iter() {
        hook.on_agent_created(&data, &host).await?;
    }

    agent.start(&host).await?;
    if options.await_ready {
        await_ready(&host, agent.as_ref()).await?;
    }
    if let Some(message) = &options.initial_message {
        agent.send_message(&host, message).await?;
    }

    Ok((agent, host))
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
