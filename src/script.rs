//! Runs a local shell script with a composed environment (spec §4.3).
//!
//! Manifests and `gencode-*` scripts are the only scripts that need the
//! emulator's `PATH` prepend — explorers and `code-remote` run on the
//! target host directly by path and never invoke `__typename`.

use crate::error::ScriptError;
use crate::executor::{CommandOutput, RemoteExecutor};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The engine-global variables every manifest/gencode invocation receives,
/// computed once per host run (spec §4.3 table).
#[derive(Debug, Clone)]
pub struct EngineEnv {
    pub bin_dir: PathBuf,
    pub target_host: String,
    pub out_dir: PathBuf,
    pub type_base_dir: PathBuf,
    /// Scratch root for this host run; the emulator derives the object
    /// store location (`<local_base_dir>/object`) from this.
    pub local_base_dir: PathBuf,
}

impl EngineEnv {
    pub fn base_vars(&self) -> Vec<(String, String)> {
        let inherited_path = std::env::var("PATH").unwrap_or_default();
        vec![
            (
                "PATH".to_string(),
                format!("{}:{}", self.bin_dir.display(), inherited_path),
            ),
            ("__target_host".to_string(), self.target_host.clone()),
            ("__global".to_string(), self.out_dir.display().to_string()),
            (
                "__cdist_type_base_dir".to_string(),
                self.type_base_dir.display().to_string(),
            ),
            (
                "__cdist_local_base_dir".to_string(),
                self.local_base_dir.display().to_string(),
            ),
        ]
    }
}

/// Merge env layers left-to-right, later layers overriding earlier ones
/// on key collision, preserving first-seen insertion order otherwise.
pub fn merge_env(layers: &[&[(String, String)]]) -> Vec<(String, String)> {
    let mut order: Vec<String> = Vec::new();
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for layer in layers {
        for (k, v) in layer.iter() {
            if !map.contains_key(k) {
                order.push(k.clone());
            }
            map.insert(k.clone(), v.clone());
        }
    }
    order
        .into_iter()
        .map(|k| {
            let v = map.remove(&k).unwrap();
            (k, v)
        })
        .collect()
}

/// Run `script` locally under `/bin/sh -e`, with `env.base_vars()` merged
/// under `extra_env` (extra wins). On nonzero exit, the script body is
/// read back from disk and attached to the error for diagnostics.
pub fn run_local<E: RemoteExecutor>(
    executor: &E,
    env: &EngineEnv,
    script: &Path,
    extra_env: &[(String, String)],
) -> Result<CommandOutput, ScriptError> {
    let base = env.base_vars();
    let merged = merge_env(&[&base, extra_env]);
    let argv = vec![
        "/bin/sh".to_string(),
        "-e".to_string(),
        script.display().to_string(),
    ];

    let output = executor.run(&argv, &merged, false)?;
    if !output.success {
        let body = fs::read_to_string(script).map_err(|e| ScriptError::Read(script.to_path_buf(), e))?;
        return Err(crate::error::ExecutorError::ScriptFailed {
            argv: argv.join(" "),
            status: "nonzero exit".to_string(),
            body,
        }
        .into());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_env_later_wins() {
        let a = vec![("PATH".to_string(), "a".to_string())];
        let b = vec![("PATH".to_string(), "b".to_string()), ("X".to_string(), "1".to_string())];
        let merged = merge_env(&[&a, &b]);
        assert_eq!(
            merged.iter().find(|(k, _)| k == "PATH").unwrap().1,
            "b"
        );
        assert!(merged.iter().any(|(k, v)| k == "X" && v == "1"));
    }

    #[test]
    fn test_base_vars_prepends_bin_dir() {
        let env = EngineEnv {
            bin_dir: PathBuf::from("/scratch/bin"),
            target_host: "h1".to_string(),
            out_dir: PathBuf::from("/scratch/out"),
            type_base_dir: PathBuf::from("/conf/type"),
            local_base_dir: PathBuf::from("/scratch"),
        };
        let vars = env.base_vars();
        let path = &vars.iter().find(|(k, _)| k == "PATH").unwrap().1;
        assert!(path.starts_with("/scratch/bin:"));
    }
}
