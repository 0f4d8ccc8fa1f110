use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single `RemoteExecutor` operation (run/mkdir/remove_tree/copy).
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("command failed: {argv}: {detail}")]
    CommandFailed { argv: String, detail: String },

    #[error("failed to spawn {argv}: {source}")]
    Spawn { argv: String, source: std::io::Error },

    #[error("{argv} exited with status {status}\n--- script body ---\n{body}")]
    ScriptFailed {
        argv: String,
        status: String,
        body: String,
    },
}

/// Failure running a shell script through the script runner.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to read script {0:?}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Failure inside the object store (§4.4 of the spec).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object {object} already declares parameter {param:?}={old:?}, but {new_source} redeclares it as {new:?} (first declared by {old_source})")]
    ParameterDiffers {
        object: String,
        param: String,
        old: String,
        new: String,
        old_source: String,
        new_source: String,
    },

    #[error("object {object}: new parameter {param:?} specified by {source} was not part of the original declaration")]
    NewParameter {
        object: String,
        param: String,
        source: String,
    },

    #[error("invalid object id {0:?}: must be non-empty after stripping a leading '/' and must not contain '..' components")]
    InvalidObjectId(String),

    #[error("io error at {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// Failure inside the type emulator shim (§4.5, §7).
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("missing required parameter --{0}")]
    MissingRequiredParameter(String),

    #[error("unknown parameter --{0}")]
    UnknownParameter(String),

    #[error("singleton type {0} does not accept a positional object id")]
    SingletonTakesNoObjectId(String),

    #[error("type {0} requires exactly one positional object id")]
    MissingObjectId(String),

    #[error("could not determine type name from argv[0]")]
    UnknownTypeName,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} is not set in the environment")]
    MissingEnv(&'static str),
}

/// Configuration-time failure: missing manifest, empty explorer set, etc.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("initial manifest not found at {0:?}")]
    MissingInitialManifest(PathBuf),

    #[error("no explorers found in {0:?}")]
    NoExplorers(PathBuf),

    #[error("type directory {0:?} is not readable: {1}")]
    UnreadableTypeDir(PathBuf, std::io::Error),

    #[error("required tool {0:?} not found on PATH")]
    MissingTool(String),
}

/// A dependency cycle detected during code-stage traversal (§4.9, §7).
#[derive(Error, Debug)]
#[error("dependency cycle detected: {}", .0.join(" -> "))]
pub struct CycleError(pub Vec<String>);

/// Top-level error for a single host's run. Aggregates every component's
/// error type via `#[from]`, mirroring the teacher's single `ZkError`
/// fed by conversions from each subsystem.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Emulator(#[from] EmulatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("convergence did not settle after {rounds} rounds ({objects} objects and still growing)")]
    ConvergenceOverflow { rounds: u32, objects: usize },
}

impl DriverError {
    /// A short, user-actionable hint for common failure modes. Returns
    /// `None` when the raw error message is already the best explanation.
    pub fn friendly_message(&self) -> Option<String> {
        match self {
            DriverError::Io(e) => {
                if e.raw_os_error() == Some(28) {
                    return Some("Disk is full. Free up space and try again.".to_string());
                }
                None
            }
            DriverError::Executor(ExecutorError::Spawn { argv, .. }) if argv.starts_with("ssh") => {
                Some("Could not reach the target host over ssh. Check connectivity and host keys.".to_string())
            }
            DriverError::Config(ConfigError::NoExplorers(_)) => {
                Some("conf/explorer/ is empty; at least one global explorer is required.".to_string())
            }
            _ => None,
        }
    }
}
