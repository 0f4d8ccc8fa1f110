//! Path and scratch-directory management (spec §4.1).
//!
//! Every host run gets a fresh local scratch directory (`tempfile`) holding
//! the working object store, the emulator's `bin_dir` of type symlinks, and
//! `out_dir` (`__global`). On success the working object store is promoted
//! over the host's persistent local cache; on failure the scratch directory
//! is simply dropped and the prior cache is left untouched.

use crate::constants::TYPE_PREFIX;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct HostContext {
    pub target_host: String,
    pub remote_user: String,
    pub cdist_home: PathBuf,
    pub cache_dir: PathBuf,
    scratch: TempDir,
}

impl HostContext {
    pub fn new(
        target_host: impl Into<String>,
        remote_user: impl Into<String>,
        cdist_home: PathBuf,
        cache_base: &Path,
    ) -> io::Result<Self> {
        let target_host = target_host.into();
        let scratch = tempfile::Builder::new().prefix("cdist-rs-").tempdir()?;
        let cache_dir = cache_base.join(&target_host);
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            target_host,
            remote_user: remote_user.into(),
            cdist_home,
            cache_dir,
            scratch,
        })
    }

    pub fn type_base_dir(&self) -> PathBuf {
        self.cdist_home.join("conf").join("type")
    }

    pub fn global_explorer_dir(&self) -> PathBuf {
        self.cdist_home.join("conf").join("explorer")
    }

    pub fn default_initial_manifest(&self) -> PathBuf {
        self.cdist_home.join("conf").join("manifest").join("init")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch.path().to_path_buf()
    }

    pub fn local_out_dir(&self) -> PathBuf {
        self.scratch.path().join("out")
    }

    pub fn local_bin_dir(&self) -> PathBuf {
        self.scratch.path().join("bin")
    }

    /// The working object store for this run. Starts as a copy of the
    /// persisted cache so redeclaration checks see objects from prior runs.
    pub fn working_object_dir(&self) -> PathBuf {
        self.scratch.path().join("object")
    }

    pub fn cached_object_dir(&self) -> PathBuf {
        self.cache_dir.join("object")
    }

    /// Seed the working object store from the persisted cache, create
    /// `out_dir`, and populate `bin_dir` with one symlink per discovered
    /// type, each pointing at `binary` (the same executable, dispatching
    /// on argv[0] at runtime).
    pub fn prepare(&self, binary: &Path) -> io::Result<()> {
        fs::create_dir_all(self.local_out_dir())?;
        fs::create_dir_all(self.local_bin_dir())?;

        let working = self.working_object_dir();
        let cached = self.cached_object_dir();
        if cached.is_dir() {
            copy_tree(&cached, &working)?;
        } else {
            fs::create_dir_all(&working)?;
        }

        for type_name in self.discover_type_names()? {
            let link = self.local_bin_dir().join(&type_name);
            if link.exists() || link.symlink_metadata().is_ok() {
                fs::remove_file(&link).ok();
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(binary, &link)?;
            #[cfg(not(unix))]
            fs::copy(binary, &link)?;
        }
        Ok(())
    }

    pub fn discover_type_names(&self) -> io::Result<Vec<String>> {
        let dir = self.type_base_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(TYPE_PREFIX) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Atomically (best-effort) replace the persisted cache with this
    /// run's working object store. Only called after a fully successful
    /// run; a failed run leaves the prior cache untouched and the scratch
    /// directory is dropped with the `HostContext`.
    pub fn promote_cache(&self) -> io::Result<()> {
        let working = self.working_object_dir();
        let cached = self.cached_object_dir();
        if cached.is_dir() {
            fs::remove_dir_all(&cached)?;
        }
        if let Some(parent) = cached.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&working, &cached)
    }
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        let rel = entry.path().strip_prefix(src).expect("walked entry is under src");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_cdist_home() -> tempfile::TempDir {
        let home = tempdir().unwrap();
        let type_dir = home.path().join("conf").join("type").join("__file");
        fs::create_dir_all(&type_dir).unwrap();
        fs::create_dir_all(home.path().join("conf").join("explorer")).unwrap();
        home
    }

    #[test]
    fn test_discover_type_names_filters_prefix() {
        let home = make_cdist_home();
        fs::create_dir_all(home.path().join("conf").join("type").join("notatype")).unwrap();
        let cache_base = tempdir().unwrap();
        let ctx = HostContext::new("h1", "root", home.path().to_path_buf(), cache_base.path()).unwrap();
        let names = ctx.discover_type_names().unwrap();
        assert_eq!(names, vec!["__file".to_string()]);
    }

    #[test]
    fn test_prepare_populates_bin_dir_symlinks() {
        let home = make_cdist_home();
        let cache_base = tempdir().unwrap();
        let ctx = HostContext::new("h1", "root", home.path().to_path_buf(), cache_base.path()).unwrap();
        let fake_binary = home.path().join("cdist-bin");
        fs::write(&fake_binary, b"").unwrap();

        ctx.prepare(&fake_binary).unwrap();
        assert!(ctx.local_bin_dir().join("__file").exists());
        assert!(ctx.local_out_dir().is_dir());
        assert!(ctx.working_object_dir().is_dir());
    }

    #[test]
    fn test_promote_cache_replaces_prior_contents() {
        let home = make_cdist_home();
        let cache_base = tempdir().unwrap();
        let ctx = HostContext::new("h1", "root", home.path().to_path_buf(), cache_base.path()).unwrap();
        fs::create_dir_all(ctx.cached_object_dir().join("__file").join("stale")).unwrap();

        fs::create_dir_all(ctx.working_object_dir().join("__file").join("fresh")).unwrap();
        ctx.promote_cache().unwrap();

        assert!(ctx.cached_object_dir().join("__file").join("fresh").is_dir());
        assert!(!ctx.cached_object_dir().join("__file").join("stale").exists());
    }
}
