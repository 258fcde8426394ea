// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote host preparation: required packages, SSH keys, known hosts.
//!
//! Providers that boot fresh hosts run these shell commands before the
//! first agent lands. Each builder returns a single `sh -c`-able string so
//! one round-trip does the whole step. Packages missing from the base
//! image are installed at runtime with a prefixed warning the caller can
//! surface.

use crate::connector::shell_escape_single_quotes;
use crate::host::OnlineHost;
use crate::watcher_script::{build_start_volume_sync_command, start_activity_watcher};
use mng_core::error::MngError;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix marking shell output lines that should be shown to the user.
pub const WARNING_PREFIX: &str = "MNG_WARN:";

/// An apt package that must be present on remote hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredHostPackage {
    pub package: &'static str,
    /// Binary checked with `command -v` unless `check_cmd` overrides it.
    pub binary: &'static str,
    pub check_cmd: Option<&'static str>,
}

/// Packages any remote host needs before agents can run.
///
/// Providers that build a default image should pre-install these; the
/// runtime check still installs whatever is missing, with a warning.
pub const REQUIRED_HOST_PACKAGES: [RequiredHostPackage; 6] = [
    RequiredHostPackage {
        package: "openssh-server",
        binary: "sshd",
        check_cmd: Some("test -x /usr/sbin/sshd"),
    },
    RequiredHostPackage {
        package: "tmux",
        binary: "tmux",
        check_cmd: None,
    },
    RequiredHostPackage {
        package: "curl",
        binary: "curl",
        check_cmd: None,
    },
    RequiredHostPackage {
        package: "rsync",
        binary: "rsync",
        check_cmd: None,
    },
    RequiredHostPackage {
        package: "git",
        binary: "git",
        check_cmd: None,
    },
    RequiredHostPackage {
        package: "jq",
        binary: "jq",
        check_cmd: None,
    },
];

fn package_check_snippet(pkg: &RequiredHostPackage) -> String {
    let check = match pkg.check_cmd {
        Some(check) => check.to_string(),
        None => format!("command -v {} >/dev/null 2>&1", pkg.binary),
    };
    format!(
        "if ! {check}; then \
         echo '{prefix}{package} is not pre-installed in the base image. \
         Installing at runtime. For faster startup, use an image with \
         {package} pre-installed.'; \
         PKGS_TO_INSTALL=\"$PKGS_TO_INSTALL {package}\"; fi",
        check = check,
        prefix = WARNING_PREFIX,
        package = pkg.package,
    )
}

/// Build the command that checks for and installs required packages, then
/// prepares the host state directory.
///
/// With a volume mount path the host dir becomes a symlink onto the
/// volume, so everything written under it persists across restarts.
pub fn build_check_and_install_packages_command(
    host_dir: &str,
    host_volume_mount_path: Option<&str>,
) -> String {
    let mut script_lines: Vec<String> = vec!["PKGS_TO_INSTALL=''".to_string()];
    script_lines.extend(REQUIRED_HOST_PACKAGES.iter().map(package_check_snippet));
    script_lines.push(
        "if [ -n \"$PKGS_TO_INSTALL\" ]; then \
         apt-get update -qq && apt-get install -y -qq $PKGS_TO_INSTALL; fi"
            .to_string(),
    );
    // sshd refuses to start without its run directory.
    script_lines.push("mkdir -p /run/sshd".to_string());

    match host_volume_mount_path {
        Some(mount) => {
            // ln -sfn alone will not replace a real directory left behind
            // by a pre-volume snapshot.
            script_lines.push(format!(
                "[ -L {host_dir} ] || rm -rf {host_dir}; ln -sfn {mount} {host_dir}",
                host_dir = host_dir,
                mount = mount,
            ));
        }
        None => script_lines.push(format!("mkdir -p {}", host_dir)),
    }

    script_lines.join("; ")
}

/// The SSH directory for a user: `/root/.ssh` or `/home/<user>/.ssh`.
pub fn user_ssh_dir(user: &str) -> PathBuf {
    if user == "root" {
        PathBuf::from("/root/.ssh")
    } else {
        PathBuf::from(format!("/home/{}/.ssh", user))
    }
}

/// Build the command that installs the client's key and the host's own
/// identity keys with correct permissions.
pub fn build_configure_ssh_command(
    user: &str,
    client_public_key: &str,
    host_private_key: &str,
    host_public_key: &str,
) -> String {
    let ssh_dir = user_ssh_dir(user);
    let authorized_keys = ssh_dir.join("authorized_keys");

    [
        format!("mkdir -p '{}'", ssh_dir.display()),
        format!(
            "printf '%s' '{}' > '{}'",
            shell_escape_single_quotes(client_public_key),
            authorized_keys.display(),
        ),
        format!("chmod 600 '{}'", authorized_keys.display()),
        // Stale host keys from a restored snapshot would trip clients.
        "rm -f /etc/ssh/ssh_host_*".to_string(),
        format!(
            "printf '%s' '{}' > /etc/ssh/ssh_host_ed25519_key",
            shell_escape_single_quotes(host_private_key),
        ),
        format!(
            "printf '%s' '{}' > /etc/ssh/ssh_host_ed25519_key.pub",
            shell_escape_single_quotes(host_public_key),
        ),
        "chmod 600 /etc/ssh/ssh_host_ed25519_key".to_string(),
        "chmod 644 /etc/ssh/ssh_host_ed25519_key.pub".to_string(),
    ]
    .join("; ")
}

/// Build the command that appends known-hosts entries for outbound SSH
/// from the host, or `None` when there are none.
pub fn build_add_known_hosts_command(user: &str, entries: &[String]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let ssh_dir = user_ssh_dir(user);
    let known_hosts = ssh_dir.join("known_hosts");

    let mut script_lines = vec![format!("mkdir -p '{}'", ssh_dir.display())];
    for entry in entries {
        script_lines.push(format!(
            "printf '%s\\n' '{}' >> '{}'",
            shell_escape_single_quotes(entry),
            known_hosts.display(),
        ));
    }
    script_lines.push(format!("chmod 644 '{}'", known_hosts.display()));

    Some(script_lines.join("; "))
}

/// Extract user-facing warnings from prepared-command output.
pub fn parse_warnings_from_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix(WARNING_PREFIX))
        .map(|warning| warning.trim().to_string())
        .filter(|warning| !warning.is_empty())
        .collect()
}

/// Prepare a freshly created remote host: packages, state dirs (or the
/// volume symlink), known hosts, the background activity watcher, and the
/// volume sync loop when a mount path is given.
///
/// Local hosts only get their state directories; nobody wants apt runs on
/// their own machine.
pub async fn prepare_host(
    host: &OnlineHost,
    known_hosts: &[String],
    volume_mount_path: Option<&str>,
) -> Result<(), MngError> {
    let host_dir = host.paths().root().display().to_string();

    if host.is_local() {
        let result = host
            .execute_command(
                &format!(
                    "mkdir -p '{dir}/commands' '{dir}/logs' '{dir}/activity'",
                    dir = shell_escape_single_quotes(&host_dir)
                ),
                Some(Duration::from_secs(30)),
            )
            .await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "preparing host dirs failed: {}",
                result.stderr.trim()
            )));
        }
        return Ok(());
    }

    let install = build_check_and_install_packages_command(&host_dir, volume_mount_path);
    let result = host
        .execute_command(&install, Some(Duration::from_secs(600)))
        .await?;
    if !result.success {
        return Err(MngError::CommandFailed(format!(
            "host package setup failed: {}",
            result.stderr.trim()
        )));
    }
    for warning in parse_warnings_from_output(&result.stdout) {
        tracing::warn!(host_id = %host.id(), "{}", warning);
    }

    if let Some(command) = build_add_known_hosts_command("root", known_hosts) {
        let result = host
            .execute_command(&command, Some(Duration::from_secs(30)))
            .await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "installing known_hosts failed: {}",
                result.stderr.trim()
            )));
        }
    }

    if let Some(mount) = volume_mount_path {
        let sync = build_start_volume_sync_command(mount, &host_dir);
        let result = host
            .execute_command(&sync, Some(Duration::from_secs(30)))
            .await?;
        if !result.success {
            return Err(MngError::CommandFailed(format!(
                "starting volume sync failed: {}",
                result.stderr.trim()
            )));
        }
    }

    start_activity_watcher(host).await
}

#[cfg(test)]
#[path = "host_setup_tests.rs"]
mod tests;
