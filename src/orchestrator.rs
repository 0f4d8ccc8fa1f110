//! Multi-host orchestration (spec §4.10/§5): run the full per-host driver
//! over every target, sequentially or concurrently, with per-host failure
//! isolation — one host's failure never aborts the others.

use crate::error::DriverError;
use crate::executor::SshExecutor;
use crate::layout::HostContext;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Scratch directories currently in use by in-flight host runs, so a
/// Ctrl+C handler can remove them before the process exits — `TempDir`'s
/// `Drop` never runs when `std::process::exit` cuts in.
static ACTIVE_SCRATCH_DIRS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn active_scratch_dirs() -> &'static Mutex<HashSet<PathBuf>> {
    ACTIVE_SCRATCH_DIRS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Remove every scratch directory currently registered by an in-flight
/// host run. Intended to be called from a `ctrlc::set_handler` closure.
pub fn cleanup_on_interrupt() {
    let dirs = active_scratch_dirs().lock().unwrap_or_else(|e| e.into_inner());
    for dir in dirs.iter() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

/// Deregisters a scratch directory from [`ACTIVE_SCRATCH_DIRS`] once its
/// host run finishes normally, successfully or not.
struct UnregisterScratch(PathBuf);

impl Drop for UnregisterScratch {
    fn drop(&mut self) {
        active_scratch_dirs().lock().unwrap_or_else(|e| e.into_inner()).remove(&self.0);
    }
}

/// Outcome of running the full driver pipeline against one host.
pub struct HostResult {
    pub host: String,
    pub elapsed: Duration,
    pub outcome: Result<usize, DriverError>,
}

pub struct RunRequest {
    pub hosts: Vec<String>,
    pub remote_user: String,
    pub cdist_home: PathBuf,
    pub cache_base: PathBuf,
    pub initial_manifest: Option<PathBuf>,
    pub binary: PathBuf,
    pub parallel: bool,
}

/// Run `cdist config`/`install` against every host in `request.hosts`.
/// Sequential by default; `parallel` fans out with one OS thread per host
/// via `std::thread::scope` and joins all of them before returning.
pub fn run_all(request: &RunRequest) -> Vec<HostResult> {
    if request.parallel {
        run_parallel(request)
    } else {
        request.hosts.iter().map(|host| run_one_timed(request, host)).collect()
    }
}

fn run_parallel(request: &RunRequest) -> Vec<HostResult> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = request
            .hosts
            .iter()
            .map(|host| scope.spawn(move || run_one_timed(request, host)))
            .collect();
        handles.into_iter().map(|h| h.join().expect("host thread panicked")).collect()
    })
}

fn run_one_timed(request: &RunRequest, host: &str) -> HostResult {
    let start = Instant::now();
    let outcome = run_one(request, host);
    let elapsed = start.elapsed();
    match &outcome {
        Ok(count) => info!(host, objects = count, elapsed_ms = elapsed.as_millis() as u64, "host converged"),
        Err(e) => error!(host, error = %e, elapsed_ms = elapsed.as_millis() as u64, "host failed"),
    }
    HostResult {
        host: host.to_string(),
        elapsed,
        outcome,
    }
}

fn run_one(request: &RunRequest, host: &str) -> Result<usize, DriverError> {
    let ctx = HostContext::new(host, request.remote_user.clone(), request.cdist_home.clone(), &request.cache_base)?;
    ctx.prepare(&request.binary)?;

    let scratch = ctx.scratch_dir();
    active_scratch_dirs().lock().unwrap_or_else(|e| e.into_inner()).insert(scratch.clone());
    let _unregister = UnregisterScratch(scratch);

    let executor = SshExecutor::new(host, request.remote_user.clone());
    let store = crate::store::ObjectStore::new(ctx.working_object_dir());
    let env = crate::script::EngineEnv {
        bin_dir: ctx.local_bin_dir(),
        target_host: host.to_string(),
        out_dir: ctx.local_out_dir(),
        type_base_dir: ctx.type_base_dir(),
        local_base_dir: ctx.scratch_dir(),
    };

    init_deploy(&executor)?;

    let mut explorers = crate::explorer::ExplorerEngine::new(&executor, ctx.global_explorer_dir(), ctx.type_base_dir());
    explorers.run_global_explorers()?;

    let initial_manifest = request
        .initial_manifest
        .clone()
        .unwrap_or_else(|| ctx.default_initial_manifest());
    if !initial_manifest.is_file() {
        return Err(crate::error::ConfigError::MissingInitialManifest(initial_manifest).into());
    }
    crate::manifest::run_initial_manifest(&executor, &env, &initial_manifest)?;

    let object_count = crate::converge::run(&executor, &env, &store, &ctx.type_base_dir(), &mut explorers)?;

    let objects = store.list()?;
    let ordered = crate::codegen::dependency_order(&store, &objects)?;
    for object_fq in &ordered {
        crate::codegen::generate(&executor, &env, &store, &ctx.type_base_dir(), object_fq)?;
    }
    for object_fq in &ordered {
        crate::codegen::execute(&executor, &store, object_fq)?;
    }

    ctx.promote_cache()?;
    Ok(object_count)
}

/// Reset the remote staging area to a clean slate before a run, mirroring
/// cdist's `init_deploy`.
fn init_deploy<E: crate::executor::RemoteExecutor>(executor: &E) -> Result<(), DriverError> {
    executor.remove_tree(crate::constants::REMOTE_BASE_DIR, true)?;
    executor.mkdir(crate::constants::REMOTE_BASE_DIR, true)?;
    Ok(())
}

pub fn default_cache_base() -> PathBuf {
    let state_home = std::env::var("XDG_CACHE_HOME").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{}/.cache", home)
    });
    Path::new(&state_home).join(crate::constants::APP_NAME).join("hosts")
}
