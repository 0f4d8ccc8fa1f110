//! Single binary, two personalities: invoked as `cdist` it is the CLI
//! frontend; invoked as `__typename` (or with `EMULATE_ENV_MARKER` set) it
//! is the type emulator a manifest calls into. `bin_dir` is populated with
//! symlinks of every type name back to this same executable, so a
//! manifest's `__file ...` call resolves here regardless of mode.

use cdist_engine::cli::{Args, Commands};
use cdist_engine::constants::{EMULATE_ENV_MARKER, TYPE_PREFIX};
use cdist_engine::emulator::{self, TypeSignature};
use cdist_engine::error::{DriverError, EmulatorError};
use cdist_engine::orchestrator::{self, RunRequest};
use cdist_engine::store::ObjectStore;
use cdist_engine::{logging, utils};
use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let invoked_as = args
        .first()
        .and_then(|p| PathBuf::from(p).file_name().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();

    let is_emulator = invoked_as.starts_with(TYPE_PREFIX) || std::env::var(EMULATE_ENV_MARKER).is_ok();

    // Types run as short-lived local subprocesses; only the frontend's
    // host runs leave scratch directories worth cleaning up on interrupt.
    if !is_emulator {
        ctrlc::set_handler(|| {
            orchestrator::cleanup_on_interrupt();
            std::process::exit(130);
        })
        .expect("failed to install Ctrl+C handler");
    }

    let exit_code = if is_emulator {
        run_emulator(&invoked_as, &args[1..])
    } else {
        run_frontend()
    };
    std::process::exit(exit_code);
}

fn run_emulator(type_name: &str, argv: &[String]) -> i32 {
    match run_emulator_inner(type_name, argv) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{type_name}: {e}");
            1
        }
    }
}

fn run_emulator_inner(type_name: &str, argv: &[String]) -> Result<(), EmulatorError> {
    let type_base_dir = PathBuf::from(
        std::env::var("__cdist_type_base_dir").map_err(|_| EmulatorError::MissingEnv("__cdist_type_base_dir"))?,
    );
    let local_base_dir = PathBuf::from(
        std::env::var("__cdist_local_base_dir").map_err(|_| EmulatorError::MissingEnv("__cdist_local_base_dir"))?,
    );
    let current_manifest =
        std::env::var("__cdist_manifest").map_err(|_| EmulatorError::MissingEnv("__cdist_manifest"))?;

    let type_dir = type_base_dir.join(type_name);
    let sig = TypeSignature::load(&type_dir)?;

    let parsed = emulator::parse_argv(type_name, argv)?;
    emulator::validate(&parsed, &sig)?;

    // `require` is never a CLI parameter; a manifest declares it by
    // exporting `__require="dep1 dep2"` before invoking the type.
    let require: Vec<String> = std::env::var("__require")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let store = ObjectStore::new(local_base_dir.join("object"));
    emulator::apply(&store, &parsed, &current_manifest, &require)?;
    Ok(())
}

fn run_frontend() -> i32 {
    let args_raw: Vec<String> = std::env::args().collect();
    if args_raw.len() <= 1 {
        Args::build_command().print_help().unwrap_or_default();
        println!();
        return 0;
    }

    let matches = match Args::build_command().try_get_matches() {
        Ok(m) => m,
        Err(e) => e.exit(),
    };
    use clap::FromArgMatches;
    let args = match Args::from_arg_matches(&matches) {
        Ok(a) => a,
        Err(e) => e.exit(),
    };

    match args.command {
        Commands::Banner => {
            cdist_engine::cli::print_banner();
            0
        }
        Commands::Config(run_args) | Commands::Install(run_args) => run(run_args),
    }
}

fn run(run_args: cdist_engine::cli::RunArgs) -> i32 {
    let _guard = logging::init_logging(run_args.debug);

    if let Err(e) = utils::ensure_ssh_tools_available() {
        eprintln!("Error: {e}");
        return 1;
    }

    let binary = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: could not locate own executable: {e}");
            return 1;
        }
    };

    let request = RunRequest {
        hosts: run_args.hosts.clone(),
        remote_user: run_args.remote_user.clone(),
        cdist_home: run_args.resolved_cdist_home(),
        cache_base: orchestrator::default_cache_base(),
        initial_manifest: run_args.initial_manifest.clone(),
        binary,
        parallel: run_args.parallel && !run_args.sequential,
    };

    let results = orchestrator::run_all(&request);

    let mut exit_code = 0;
    for result in &results {
        match &result.outcome {
            Ok(count) => {
                println!("{}: converged, {} objects, {:.1}s", result.host, count, result.elapsed.as_secs_f64());
            }
            Err(e) => {
                exit_code = 1;
                if let Some(friendly) = friendly_message(e) {
                    eprintln!("{}: Suggestion: {}", result.host, friendly);
                }
                eprintln!("{}: Error: {}", result.host, e);
            }
        }
    }
    exit_code
}

fn friendly_message(e: &DriverError) -> Option<String> {
    e.friendly_message()
}
