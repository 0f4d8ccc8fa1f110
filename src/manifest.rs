//! Running manifests (spec §4.6): the initial manifest and per-object
//! type manifests, both executed locally under `/bin/sh -e` with the
//! emulator's `bin_dir` on `PATH` so `__typename` invocations resolve to
//! the dispatching binary.

use crate::error::ScriptError;
use crate::executor::RemoteExecutor;
use crate::script::{self, EngineEnv};
use crate::store::ObjectStore;
use std::path::Path;

/// Run the initial manifest (`conf/manifest/init` or the path given to
/// `-i/--initial-manifest`). `__cdist_manifest` is set to the manifest's
/// own path, same as for a type manifest, so `__typename` invocations from
/// the initial manifest record it as their declaring source.
pub fn run_initial_manifest<E: RemoteExecutor>(
    executor: &E,
    env: &EngineEnv,
    initial_manifest: &Path,
) -> Result<(), ScriptError> {
    let extra_env = vec![(
        "__cdist_manifest".to_string(),
        initial_manifest.display().to_string(),
    )];
    script::run_local(executor, env, initial_manifest, &extra_env)?;
    Ok(())
}

/// Run a single object's type manifest (`conf/type/<type>/manifest`), with
/// `__object`, `__object_id`, `__object_fq`, `__type` and `__cdist_manifest`
/// set so the manifest can refer to the object that is invoking it and
/// nested `__typename` calls record it as their source, mirroring how
/// cdist exposes the current object to nested type manifests. `__object`
/// is the object's local `.cdist` directory (manifests run locally), not
/// its fully-qualified id — `__object_fq` carries that.
pub fn run_type_manifest<E: RemoteExecutor>(
    executor: &E,
    env: &EngineEnv,
    store: &ObjectStore,
    type_manifest: &Path,
    object_fq: &str,
    object_id: &str,
) -> Result<(), ScriptError> {
    if !type_manifest.is_file() {
        return Ok(());
    }
    let type_dir = type_manifest.parent().unwrap_or_else(|| Path::new(""));
    let object_dir = store.paths(object_fq).dir;
    let extra_env = vec![
        ("__object".to_string(), object_dir.display().to_string()),
        ("__object_id".to_string(), object_id.to_string()),
        ("__object_fq".to_string(), object_fq.to_string()),
        ("__type".to_string(), type_dir.display().to_string()),
        (
            "__cdist_manifest".to_string(),
            type_manifest.display().to_string(),
        ),
    ];
    script::run_local(executor, env, type_manifest, &extra_env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockRemoteExecutor;
    use std::path::PathBuf;

    fn env() -> EngineEnv {
        EngineEnv {
            bin_dir: PathBuf::from("/scratch/bin"),
            target_host: "h1".to_string(),
            out_dir: PathBuf::from("/scratch/out"),
            type_base_dir: PathBuf::from("/conf/type"),
            local_base_dir: PathBuf::from("/scratch"),
        }
    }

    #[test]
    fn test_run_type_manifest_skips_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join("object"));
        let mock = MockRemoteExecutor::new();
        let result = run_type_manifest(&mock, &env(), &store, Path::new("/nonexistent"), "__file/x", "x");
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_initial_manifest_invokes_executor() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("init");
        std::fs::write(&manifest, "#!/bin/sh\ntrue\n").unwrap();

        let mut mock = MockRemoteExecutor::new();
        mock.expect_run()
            .withf(|argv, _, remote| argv[0] == "/bin/sh" && !remote)
            .times(1)
            .returning(|_, _, _| {
                Ok(crate::executor::CommandOutput {
                    success: true,
                    stdout: vec![],
                    stderr: vec![],
                })
            });

        run_initial_manifest(&mock, &env(), &manifest).unwrap();
    }
}
