// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-host background scripts: the activity watcher and the volume sync loop.
//!
//! Both are plain POSIX shell, installed under `<host_dir>/commands/` and
//! started with `nohup` so they survive the provisioning connection. The
//! watcher reads its configuration from `data.json` with `jq`, so updating
//! the host's activity config takes effect without re-upload.

use crate::connector::shell_escape_single_quotes;
use crate::host::OnlineHost;
use mng_core::error::MngError;
use std::time::Duration;

/// Watches activity-source mtimes and shuts the host down when idle.
///
/// Invoked as `activity_watcher.sh <host_dir>`. The shutdown command is the
/// host-level `commands/shutdown.sh`, which each provider installs to do
/// whatever "stop" means for its backend.
pub const ACTIVITY_WATCHER_SH: &str = r#"#!/bin/sh
# Stops the host when no activity source has been touched within the
# configured idle timeout. Config is re-read every cycle from data.json.
HOST_DIR="$1"
DATA_FILE="$HOST_DIR/data.json"
SHUTDOWN_CMD="$HOST_DIR/commands/shutdown.sh"
CHECK_INTERVAL=30

while true; do
    sleep "$CHECK_INTERVAL"
    [ -f "$DATA_FILE" ] || continue

    IDLE_MODE=$(jq -r '.idle_mode // "AGENT"' "$DATA_FILE")
    [ "$IDLE_MODE" = "DISABLED" ] && continue

    IDLE_TIMEOUT=$(jq -r '.max_idle_seconds // 3600' "$DATA_FILE")

    LAST_ACTIVITY=0
    for SRC in $(jq -r '.activity_sources[]' "$DATA_FILE"); do
        SRC_FILE="$HOST_DIR/activity/$(printf '%s' "$SRC" | tr 'A-Z' 'a-z')"
        [ -f "$SRC_FILE" ] || continue
        MTIME=$(stat -c %Y "$SRC_FILE" 2>/dev/null || echo 0)
        [ "$MTIME" -gt "$LAST_ACTIVITY" ] && LAST_ACTIVITY=$MTIME
    done
    [ "$LAST_ACTIVITY" -eq 0 ] && continue

    NOW=$(date +%s)
    IDLE=$((NOW - LAST_ACTIVITY))
    if [ "$IDLE" -gt "$IDLE_TIMEOUT" ]; then
        echo "idle for ${IDLE}s (timeout ${IDLE_TIMEOUT}s), shutting down"
        "$SHUTDOWN_CMD"
        exit 0
    fi
done
"#;

/// Build the volume sync loop script for a given mount path.
///
/// Runs `sync` on the mount every 60 seconds so sudden termination leaves
/// the persistent state coherent.
pub fn volume_sync_script(volume_mount_path: &str) -> String {
    format!(
        "#!/bin/sh\nwhile true; do sync {} 2>/dev/null; sleep 60; done\n",
        volume_mount_path
    )
}

/// Build the shell command that installs and starts the activity watcher.
///
/// Writes the script, marks it executable, and launches it under `nohup`
/// with output going to `<host_dir>/logs/activity_watcher.log`.
pub fn build_start_activity_watcher_command(host_dir: &str) -> String {
    let script_path = format!("{}/commands/activity_watcher.sh", host_dir);
    let log_path = format!("{}/logs/activity_watcher.log", host_dir);
    let escaped_script = shell_escape_single_quotes(ACTIVITY_WATCHER_SH);

    [
        format!("mkdir -p '{}/commands'", host_dir),
        format!("mkdir -p '{}/logs'", host_dir),
        format!("printf '%s' '{}' > '{}'", escaped_script, script_path),
        format!("chmod +x '{}'", script_path),
        format!(
            "nohup '{}' '{}' > '{}' 2>&1 &",
            script_path, host_dir, log_path
        ),
    ]
    .join("; ")
}

/// Build the shell command that installs and starts the volume sync loop.
pub fn build_start_volume_sync_command(volume_mount_path: &str, host_dir: &str) -> String {
    let script_path = format!("{}/commands/volume_sync.sh", host_dir);
    let log_path = format!("{}/logs/volume_sync.log", host_dir);
    let escaped_script = shell_escape_single_quotes(&volume_sync_script(volume_mount_path));

    [
        format!("mkdir -p '{}/commands'", host_dir),
        format!("mkdir -p '{}/logs'", host_dir),
        format!("printf '%s' '{}' > '{}'", escaped_script, script_path),
        format!("chmod +x '{}'", script_path),
        format!("nohup '{}' > '{}' 2>&1 &", script_path, log_path),
    ]
    .join("; ")
}

/// Install and start the activity watcher on a host.
pub async fn start_activity_watcher(host: &OnlineHost) -> Result<(), MngError> {
    let host_dir = host.paths().root().display().to_string();
    let command = build_start_activity_watcher_command(&host_dir);
    let result = host
        .execute_command(&command, Some(Duration::from_secs(30)))
        .await?;
    if !result.success {
        return Err(MngError::CommandFailed(format!(
            "starting activity watcher failed: {}",
            result.stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "watcher_script_tests.rs"]
mod tests;
