//! Small standalone helpers that don't belong to any one component.

use crate::error::ConfigError;

/// Confirm `ssh` and `scp` are resolvable on `PATH` before the orchestrator
/// starts dialing hosts, so a missing client fails fast with one clear
/// message instead of once per host.
pub fn ensure_ssh_tools_available() -> Result<(), ConfigError> {
    for tool in ["ssh", "scp"] {
        if which::which(tool).is_err() {
            return Err(ConfigError::MissingTool(tool.to_string()));
        }
    }
    Ok(())
}
