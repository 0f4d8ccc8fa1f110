//! The code stage (spec §4.9): for every object, run `gencode-local` and
//! `gencode-remote` to produce `code-local`/`code-remote`, in dependency
//! order (an object's `__require` list must finish before the object
//! itself), then execute `code-local` here and `code-remote` on the
//! target host.

use crate::constants::{CODE_HEADER, REMOTE_OBJECT_DIR};
use crate::error::{CycleError, DriverError, ExecutorError};
use crate::executor::RemoteExecutor;
use crate::script::EngineEnv;
use crate::store::{ObjectStore, split_fq};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Visiting,
    Done,
}

/// Topologically order `objects` by their `__require` edges, detecting
/// cycles. Objects with no recorded dependency run in the order they were
/// discovered relative to their siblings.
pub fn dependency_order(store: &ObjectStore, objects: &[String]) -> Result<Vec<String>, CycleError> {
    let mut state: HashMap<String, Visit> = HashMap::new();
    let mut order = Vec::with_capacity(objects.len());
    let mut stack = Vec::new();

    for start in objects {
        visit(store, start, &mut state, &mut order, &mut stack)?;
    }
    Ok(order)
}

fn visit(
    store: &ObjectStore,
    object: &str,
    state: &mut HashMap<String, Visit>,
    order: &mut Vec<String>,
    stack: &mut Vec<String>,
) -> Result<(), CycleError> {
    match state.get(object) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::Visiting) => {
            let mut cycle: Vec<String> = stack.clone();
            cycle.push(object.to_string());
            return Err(CycleError(cycle));
        }
        None => {}
    }

    state.insert(object.to_string(), Visit::Visiting);
    stack.push(object.to_string());

    let deps = store.require_list(object).unwrap_or_default();
    for dep in deps {
        visit(store, &dep, state, order, stack)?;
    }

    stack.pop();
    state.insert(object.to_string(), Visit::Done);
    order.push(object.to_string());
    Ok(())
}

/// Run `gencode-local`/`gencode-remote` for one object, writing `code-local`
/// and/or `code-remote` into its `.cdist` directory. A gencode script that
/// produces nothing beyond [`CODE_HEADER`] is discarded rather than stored
/// (spec's "header-only code carries no work" rule).
pub fn generate<E: RemoteExecutor>(
    executor: &E,
    env: &EngineEnv,
    store: &ObjectStore,
    type_base_dir: &Path,
    object_fq: &str,
) -> Result<(), DriverError> {
    let (type_name, object_id) = split_fq(object_fq);
    let paths = store.paths(object_fq);
    let type_dir = type_base_dir.join(type_name);
    let extra_env = vec![
        ("__object".to_string(), paths.dir.display().to_string()),
        ("__object_id".to_string(), object_id.to_string()),
        ("__object_fq".to_string(), object_fq.to_string()),
        ("__type".to_string(), type_dir.display().to_string()),
    ];

    let mut any_code = false;
    for (script_name, code_path) in [
        ("gencode-local", &paths.code_local),
        ("gencode-remote", &paths.code_remote),
    ] {
        let script = type_base_dir.join(type_name).join(script_name);
        if !script.is_file() {
            continue;
        }
        let output = crate::script::run_local(executor, env, &script, &extra_env)?;
        let body = String::from_utf8_lossy(&output.stdout).into_owned();
        let full = format!("{CODE_HEADER}{body}");
        if full.len() > CODE_HEADER.len() {
            fs::write(code_path, &full)?;
            let mut perms = fs::metadata(code_path)?.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(code_path, perms)?;
            any_code = true;
        }
    }

    if any_code {
        store.mark_changed(object_fq)?;
    }
    Ok(())
}

/// Execute `code-local` here and `code-remote` on the target host, in that
/// order, for one object. Missing code files (no gencode output) are
/// silently skipped.
pub fn execute<E: RemoteExecutor>(
    executor: &E,
    store: &ObjectStore,
    object_fq: &str,
) -> Result<(), ExecutorError> {
    let paths = store.paths(object_fq);

    if paths.code_local.is_file() {
        let argv = vec![paths.code_local.display().to_string()];
        let out = executor.run(&argv, &[], false)?;
        if !out.success {
            return Err(ExecutorError::CommandFailed {
                argv: argv.join(" "),
                detail: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
    }

    if paths.code_remote.is_file() {
        let remote_path = format!("{REMOTE_OBJECT_DIR}/{object_fq}/.cdist/code-remote");
        executor.copy(&paths.code_remote, &remote_path)?;
        let argv = vec![remote_path.clone()];
        let out = executor.run(&argv, &[], true)?;
        if !out.success {
            return Err(ExecutorError::CommandFailed {
                argv: argv.join(" "),
                detail: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dependency_order_respects_require() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path().to_path_buf());
        store.create("__user", "root", "manifest/init", &[]).unwrap();
        store.create("__file", "etc/passwd", "manifest/init", &[]).unwrap();
        store
            .append_require("__file/etc/passwd", &["__user/root".to_string()])
            .unwrap();

        let objects = vec!["__file/etc/passwd".to_string(), "__user/root".to_string()];
        let order = dependency_order(&store, &objects).unwrap();
        let user_pos = order.iter().position(|o| o == "__user/root").unwrap();
        let file_pos = order.iter().position(|o| o == "__file/etc/passwd").unwrap();
        assert!(user_pos < file_pos);
    }

    #[test]
    fn test_dependency_order_detects_cycle() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path().to_path_buf());
        store.create("__a", "x", "manifest/init", &[]).unwrap();
        store.create("__b", "y", "manifest/init", &[]).unwrap();
        store.append_require("__a/x", &["__b/y".to_string()]).unwrap();
        store.append_require("__b/y", &["__a/x".to_string()]).unwrap();

        let objects = vec!["__a/x".to_string(), "__b/y".to_string()];
        assert!(dependency_order(&store, &objects).is_err());
    }
}
