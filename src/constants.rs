//! Fixed paths and magic values shared by every component.

/// Root of the engine's world on the remote side. Fixed by convention,
/// not configurable: user types/explorers/manifests assume it.
pub const REMOTE_BASE_DIR: &str = "/var/lib/cdist";
pub const REMOTE_CONF_DIR: &str = "/var/lib/cdist/conf";
pub const REMOTE_TYPE_DIR: &str = "/var/lib/cdist/conf/type";
pub const REMOTE_GLOBAL_EXPLORER_DIR: &str = "/var/lib/cdist/conf/explorer";
pub const REMOTE_OBJECT_DIR: &str = "/var/lib/cdist/object";

/// Header every gencode output starts with. A file whose size equals
/// this header's length carries no real code and is discarded.
pub const CODE_HEADER: &str = "#!/bin/sh -e\n";

/// Marker subdirectory name that turns a directory into an object.
pub const DOT_CDIST: &str = ".cdist";

/// Every type directory name starts with this.
pub const TYPE_PREFIX: &str = "__";

/// Safety bound on convergence loop passes (Design Notes: manifests are
/// assumed monotone creators, but a pathological one must not hang the run).
pub const MAX_CONVERGENCE_ROUNDS: u32 = 64;

/// Application name, used for XDG state/config directory resolution.
pub const APP_NAME: &str = "cdist-rs";

/// Env var a re-invoked binary inspects to know it's running as the type
/// emulator rather than the CLI frontend, on platforms where argv[0]'s
/// basename alone isn't trustworthy (e.g. it was copied, not symlinked).
pub const EMULATE_ENV_MARKER: &str = "__cdist_emulate";
