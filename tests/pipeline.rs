//! Exercises the object store, explorer engine, convergence loop and code
//! stage together against a real fixture type tree. Local steps
//! (manifests, gencode, code-local) really run `/bin/sh -e` via
//! `std::process::Command`; remote steps are stubbed by `FakeExecutor` so
//! the test never touches the network.

use cdist_engine::codegen;
use cdist_engine::converge;
use cdist_engine::emulator::{self, ParsedInvocation, TypeSignature};
use cdist_engine::executor::{CommandOutput, ExecutorError, RemoteExecutor};
use cdist_engine::explorer::ExplorerEngine;
use cdist_engine::script::EngineEnv;
use cdist_engine::store::{ObjectStore, object_fq};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A `RemoteExecutor` that really runs local commands and stubs remote
/// ones out as successful no-ops, so the convergence/code-stage pipeline
/// can be driven end to end without a network.
struct FakeExecutor;

impl RemoteExecutor for FakeExecutor {
    fn run(&self, argv: &[String], env: &[(String, String)], remote: bool) -> Result<CommandOutput, ExecutorError> {
        if remote {
            return Ok(CommandOutput {
                success: true,
                stdout: vec![],
                stderr: vec![],
            });
        }
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecutorError::Spawn {
                argv: argv.join(" "),
                source,
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn mkdir(&self, _path: &str, _remote: bool) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn remove_tree(&self, _path: &str, _remote: bool) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn copy(&self, _src: &Path, _dst: &str) -> Result<(), ExecutorError> {
        Ok(())
    }
}

fn fixture_type_base_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/type")
}

#[test]
fn test_full_local_pipeline_converges_and_runs_code() {
    let scratch = tempfile::tempdir().unwrap();
    let store = ObjectStore::new(scratch.path().join("object"));
    let type_base_dir = fixture_type_base_dir();

    // Simulate what the initial manifest would do by calling into the
    // type emulator directly: declare a __user object and a __file object
    // that requires it.
    let user_sig = TypeSignature::load(&type_base_dir.join("__user")).unwrap();
    let user_invocation = ParsedInvocation {
        type_name: "__user".to_string(),
        object_id: Some("root".to_string()),
        params: vec![],
    };
    emulator::validate(&user_invocation, &user_sig).unwrap();
    emulator::apply(&store, &user_invocation, "manifest/init", &[]).unwrap();

    // A real manifest would export `__require="__user/root"` before
    // invoking `__file`; the emulator reads it from the environment, not
    // as a CLI parameter.
    let file_sig = TypeSignature::load(&type_base_dir.join("__file")).unwrap();
    let file_invocation = ParsedInvocation {
        type_name: "__file".to_string(),
        object_id: Some("passwd".to_string()),
        params: vec![("mode".to_string(), "0644".to_string())],
    };
    emulator::validate(&file_invocation, &file_sig).unwrap();
    let require = vec!["__user/root".to_string()];
    emulator::apply(&store, &file_invocation, "manifest/init", &require).unwrap();

    let env = EngineEnv {
        bin_dir: scratch.path().join("bin"),
        target_host: "h1".to_string(),
        out_dir: scratch.path().join("out"),
        type_base_dir: type_base_dir.clone(),
        local_base_dir: scratch.path().to_path_buf(),
    };
    std::fs::create_dir_all(&env.out_dir).unwrap();

    let exec = FakeExecutor;

    // Neither type declares a `manifest` file or an `explorer/` directory
    // in the fixture tree, so the convergence loop settles in a single
    // round with no-op explorer transfers.
    let mut explorers = ExplorerEngine::new(&exec, type_base_dir.join("../explorer"), type_base_dir.clone());
    let count = converge::run(&exec, &env, &store, &type_base_dir, &mut explorers).unwrap();
    assert_eq!(count, 2);

    let objects = store.list().unwrap();
    let mut sorted = objects.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["__file/passwd".to_string(), "__user/root".to_string()]);

    let ordered = codegen::dependency_order(&store, &objects).unwrap();
    let user_pos = ordered.iter().position(|o| o == "__user/root").unwrap();
    let file_pos = ordered.iter().position(|o| o == "__file/passwd").unwrap();
    assert!(user_pos < file_pos, "__user/root must run before its dependent __file/passwd");

    for object_fq in &ordered {
        codegen::generate(&exec, &env, &store, &type_base_dir, object_fq).unwrap();
    }

    // __user has no gencode-local/remote scripts, so it produced no code
    // and is not marked changed.
    let user_paths = store.paths(&object_fq("__user", "root"));
    assert!(!user_paths.changed_file.exists());

    // __file's gencode-local produced real code; it must be executable and
    // marked changed.
    let file_paths = store.paths(&object_fq("__file", "passwd"));
    assert!(file_paths.code_local.is_file());
    assert!(file_paths.changed_file.exists());

    for object_fq in &ordered {
        codegen::execute(&exec, &store, object_fq).unwrap();
    }

    let marker = env.out_dir.join("marker-passwd");
    assert!(marker.is_file(), "code-local should have run and created the marker file");
    assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "applied");
}

#[test]
fn test_parameter_conflict_is_fatal_across_redeclarations() {
    let scratch = tempfile::tempdir().unwrap();
    let store = ObjectStore::new(scratch.path().join("object"));

    store.create("__file", "passwd", "manifest/init", &[("mode".into(), "0644".into())]).unwrap();
    let err = store
        .create("__file", "passwd", "type/__other/manifest", &[("mode".into(), "0600".into())])
        .unwrap_err();
    assert!(matches!(err, cdist_engine::error::StoreError::ParameterDiffers { .. }));
}
