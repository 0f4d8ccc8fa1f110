//! The explorer engine (spec §4.7): runs global and per-type explorer
//! scripts on the target host and captures their stdout as facts the
//! manifests and types can read back.

use crate::constants::{REMOTE_GLOBAL_EXPLORER_DIR, REMOTE_OBJECT_DIR, REMOTE_TYPE_DIR};
use crate::error::{ConfigError, ExecutorError};
use crate::executor::RemoteExecutor;
use crate::store::ObjectStore;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ExplorerEngine<'a, E: RemoteExecutor> {
    executor: &'a E,
    global_explorer_dir: PathBuf,
    type_base_dir: PathBuf,
    transferred_types: HashSet<String>,
}

impl<'a, E: RemoteExecutor> ExplorerEngine<'a, E> {
    pub fn new(executor: &'a E, global_explorer_dir: PathBuf, type_base_dir: PathBuf) -> Self {
        Self {
            executor,
            global_explorer_dir,
            type_base_dir,
            transferred_types: HashSet::new(),
        }
    }

    fn list_scripts(dir: &Path) -> std::io::Result<Vec<String>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Transfer `conf/explorer/` to the target host and run every explorer
    /// in it, once per config/install invocation. The spec requires at
    /// least one global explorer to exist.
    pub fn run_global_explorers(&self) -> Result<HashMap<String, String>, ConfigError> {
        let names = Self::list_scripts(&self.global_explorer_dir)
            .map_err(|e| ConfigError::UnreadableTypeDir(self.global_explorer_dir.clone(), e))?;
        if names.is_empty() {
            return Err(ConfigError::NoExplorers(self.global_explorer_dir.clone()));
        }

        self.executor
            .mkdir(REMOTE_GLOBAL_EXPLORER_DIR, true)
            .map_err(|e| config_transfer_error(&self.global_explorer_dir, e))?;
        self.executor
            .copy(&self.global_explorer_dir, REMOTE_GLOBAL_EXPLORER_DIR)
            .map_err(|e| config_transfer_error(&self.global_explorer_dir, e))?;

        let explorer_env = vec![("__explorer".to_string(), REMOTE_GLOBAL_EXPLORER_DIR.to_string())];
        let mut results = HashMap::new();
        for name in names {
            let remote_path = format!("{REMOTE_GLOBAL_EXPLORER_DIR}/{name}");
            let out = self
                .executor
                .run(&[remote_path.clone()], &explorer_env, true)
                .map_err(|e| config_transfer_error(&self.global_explorer_dir, e))?;
            results.insert(name, String::from_utf8_lossy(&out.stdout).trim_end().to_string());
        }
        Ok(results)
    }

    /// Transfer a type's `explorer/` directory to the remote type dir, at
    /// most once per host run regardless of how many objects of that type
    /// exist (spec's per-host type-transfer memoization).
    pub fn ensure_type_transferred(&mut self, type_name: &str) -> Result<(), ExecutorError> {
        if self.transferred_types.contains(type_name) {
            return Ok(());
        }
        let local_explorer_dir = self.type_base_dir.join(type_name).join("explorer");
        let remote_type_dir = format!("{REMOTE_TYPE_DIR}/{type_name}");
        self.executor.mkdir(&remote_type_dir, true)?;
        if local_explorer_dir.is_dir() {
            self.executor.copy(&local_explorer_dir, &remote_type_dir)?;
        }
        self.transferred_types.insert(type_name.to_string());
        Ok(())
    }

    /// Names of the explorer scripts a type declares locally. The remote
    /// copy was already placed by `ensure_type_transferred`; this only
    /// reads the local source tree to know what to run.
    pub fn list_type_explorer_names(&self, type_name: &str) -> std::io::Result<Vec<String>> {
        Self::list_scripts(&self.type_base_dir.join(type_name).join("explorer"))
    }

    /// Copy an object's `parameter/` directory to the remote object dir so
    /// its type explorers can read back the parameters they were given.
    pub fn transfer_object_parameter(&self, store: &ObjectStore, object_fq: &str) -> Result<(), ExecutorError> {
        let local = store.paths(object_fq).parameter_dir;
        let remote_object_dir = format!("{REMOTE_OBJECT_DIR}/{object_fq}");
        self.executor.mkdir(&remote_object_dir, true)?;
        if local.is_dir() {
            self.executor.copy(&local, &remote_object_dir)?;
        }
        Ok(())
    }

    /// Run one type explorer for one object, returning its captured
    /// stdout. `__object` is the object's *remote* object dir (type
    /// explorers run on the target host, unlike manifests/gencode), with
    /// `__object_id`/`__object_fq` alongside it, plus `__explorer` (the
    /// remote global explorer dir) and `__type_explorer` (this type's own
    /// remote explorer dir) so the explorer can locate both.
    pub fn run_type_explorer(
        &self,
        type_name: &str,
        explorer_name: &str,
        object_fq: &str,
        object_id: &str,
    ) -> Result<String, ExecutorError> {
        let remote_path = format!("{REMOTE_TYPE_DIR}/{type_name}/explorer/{explorer_name}");
        let type_explorer_dir = format!("{REMOTE_TYPE_DIR}/{type_name}/explorer");
        let remote_object_dir = format!("{REMOTE_OBJECT_DIR}/{object_fq}");
        let env = vec![
            ("__explorer".to_string(), REMOTE_GLOBAL_EXPLORER_DIR.to_string()),
            ("__type_explorer".to_string(), type_explorer_dir),
            ("__object".to_string(), remote_object_dir),
            ("__object_id".to_string(), object_id.to_string()),
            ("__object_fq".to_string(), object_fq.to_string()),
        ];
        let out = self.executor.run(&[remote_path], &env, true)?;
        Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
    }
}

fn config_transfer_error(dir: &Path, source: ExecutorError) -> ConfigError {
    ConfigError::UnreadableTypeDir(
        dir.to_path_buf(),
        std::io::Error::other(source.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, MockRemoteExecutor};
    use tempfile::tempdir;

    #[test]
    fn test_run_global_explorers_fails_when_empty() {
        let dir = tempdir().unwrap();
        let mock = MockRemoteExecutor::new();
        let engine = ExplorerEngine::new(&mock, dir.path().join("explorer"), dir.path().join("type"));
        assert!(matches!(
            engine.run_global_explorers(),
            Err(ConfigError::NoExplorers(_))
        ));
    }

    #[test]
    fn test_run_global_explorers_collects_stdout() {
        let dir = tempdir().unwrap();
        let explorer_dir = dir.path().join("explorer");
        fs::create_dir_all(&explorer_dir).unwrap();
        fs::write(explorer_dir.join("os"), "#!/bin/sh\necho linux\n").unwrap();

        let mut mock = MockRemoteExecutor::new();
        mock.expect_mkdir().returning(|_, _| Ok(()));
        mock.expect_copy().returning(|_, _| Ok(()));
        mock.expect_run().returning(|_, _, _| {
            Ok(CommandOutput {
                success: true,
                stdout: b"linux\n".to_vec(),
                stderr: vec![],
            })
        });

        let engine = ExplorerEngine::new(&mock, explorer_dir, dir.path().join("type"));
        let results = engine.run_global_explorers().unwrap();
        assert_eq!(results.get("os"), Some(&"linux".to_string()));
    }

    #[test]
    fn test_ensure_type_transferred_memoizes() {
        let dir = tempdir().unwrap();
        let mut mock = MockRemoteExecutor::new();
        mock.expect_mkdir().times(1).returning(|_, _| Ok(()));
        mock.expect_copy().times(0);

        let mut engine = ExplorerEngine::new(&mock, dir.path().join("explorer"), dir.path().to_path_buf());
        engine.ensure_type_transferred("__file").unwrap();
        engine.ensure_type_transferred("__file").unwrap();
    }
}
