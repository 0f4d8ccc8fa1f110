//! The object store (spec §4.4): objects are directories on disk,
//! identified by `(type, object_id)`, persisted under
//! `<object_base_dir>/<type>/<object_id>/.cdist/`.

use crate::constants::DOT_CDIST;
use crate::error::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Strip a leading `/` and reject empty or `..`-containing ids (spec §3).
pub fn normalize_object_id(raw: &str) -> Result<String, StoreError> {
    let stripped = raw.strip_prefix('/').unwrap_or(raw);
    if stripped.is_empty() || Path::new(stripped).components().any(|c| c.as_os_str() == "..") {
        return Err(StoreError::InvalidObjectId(raw.to_string()));
    }
    Ok(stripped.to_string())
}

pub fn object_fq(type_name: &str, object_id: &str) -> String {
    format!("{}/{}", type_name, object_id)
}

/// Split a fully-qualified object id `type/rest/of/id` into its two parts.
pub fn split_fq(fq: &str) -> (&str, &str) {
    fq.split_once('/').unwrap_or((fq, ""))
}

#[derive(Debug, Clone)]
pub struct ObjectPaths {
    pub dir: PathBuf,
    pub parameter_dir: PathBuf,
    pub require_file: PathBuf,
    pub source_file: PathBuf,
    pub explorer_dir: PathBuf,
    pub changed_file: PathBuf,
    pub code_local: PathBuf,
    pub code_remote: PathBuf,
}

pub struct ObjectStore {
    object_base_dir: PathBuf,
}

impl ObjectStore {
    pub fn new(object_base_dir: PathBuf) -> Self {
        Self { object_base_dir }
    }

    pub fn object_base_dir(&self) -> &Path {
        &self.object_base_dir
    }

    pub fn paths(&self, object_fq: &str) -> ObjectPaths {
        let dir = self.object_base_dir.join(object_fq).join(DOT_CDIST);
        ObjectPaths {
            parameter_dir: dir.join("parameter"),
            require_file: dir.join("require"),
            source_file: dir.join("source"),
            explorer_dir: dir.join("explorer"),
            changed_file: dir.join("changed"),
            code_local: dir.join("code-local"),
            code_remote: dir.join("code-remote"),
            dir,
        }
    }

    pub fn exists(&self, object_fq: &str) -> bool {
        self.paths(object_fq).dir.is_dir()
    }

    /// Every object currently persisted, as `type/object_id` strings.
    /// Order-independent; callers that need determinism sort the result.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.object_base_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(&self.object_base_dir) {
            let entry = entry.map_err(|e| {
                StoreError::Io(
                    self.object_base_dir.clone(),
                    std::io::Error::other(e.to_string()),
                )
            })?;
            if entry.file_type().is_dir() && entry.file_name() == DOT_CDIST {
                let object_dir = entry.path().parent().expect("`.cdist` always has a parent");
                let rel = object_dir
                    .strip_prefix(&self.object_base_dir)
                    .expect("walked entry is under object_base_dir")
                    .to_string_lossy()
                    .replace('\\', "/");
                found.push(rel);
            }
        }
        Ok(found)
    }

    /// Create or redeclare an object (spec §4.4 redeclaration semantics).
    pub fn create(
        &self,
        type_name: &str,
        object_id: &str,
        source_manifest: &str,
        params: &[(String, String)],
    ) -> Result<(), StoreError> {
        let object_id = normalize_object_id(object_id)?;
        let fq = object_fq(type_name, &object_id);
        let paths = self.paths(&fq);

        if !paths.dir.is_dir() {
            fs::create_dir_all(&paths.parameter_dir)
                .map_err(|e| StoreError::Io(paths.parameter_dir.clone(), e))?;
            for (name, value) in params {
                let file = paths.parameter_dir.join(name);
                fs::write(&file, value).map_err(|e| StoreError::Io(file, e))?;
            }
            self.write_source(&paths, source_manifest)?;
            return Ok(());
        }

        let prior_sources = self.read_source(&paths)?;
        for (name, value) in params {
            let file = paths.parameter_dir.join(name);
            match fs::read_to_string(&file) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StoreError::NewParameter {
                        object: fq.clone(),
                        param: name.clone(),
                        source: source_manifest.to_string(),
                    });
                }
                Err(e) => return Err(StoreError::Io(file, e)),
                Ok(existing) => {
                    if existing.trim_end_matches('\n') != value.trim_end_matches('\n') {
                        return Err(StoreError::ParameterDiffers {
                            object: fq.clone(),
                            param: name.clone(),
                            old: existing,
                            new: value.clone(),
                            old_source: prior_sources.join(", "),
                            new_source: source_manifest.to_string(),
                        });
                    }
                }
            }
        }

        self.append_source(&fq, source_manifest)
    }

    pub fn append_require(&self, object_fq: &str, deps: &[String]) -> Result<(), StoreError> {
        if deps.is_empty() {
            return Ok(());
        }
        let paths = self.paths(object_fq);
        let mut content = String::new();
        for dep in deps {
            content.push_str(dep);
            content.push('\n');
        }
        self.append_file(&paths.require_file, &content)
    }

    pub fn append_source(&self, object_fq: &str, source_manifest: &str) -> Result<(), StoreError> {
        let paths = self.paths(object_fq);
        self.write_source(&paths, source_manifest)
    }

    fn write_source(&self, paths: &ObjectPaths, source_manifest: &str) -> Result<(), StoreError> {
        self.append_file(&paths.source_file, &format!("{}\n", source_manifest))
    }

    fn append_file(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        use std::io::Write;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
        f.write_all(content.as_bytes())
            .map_err(|e| StoreError::Io(path.to_path_buf(), e))
    }

    pub fn mark_changed(&self, object_fq: &str) -> Result<(), StoreError> {
        let paths = self.paths(object_fq);
        fs::write(&paths.changed_file, b"")
            .map_err(|e| StoreError::Io(paths.changed_file.clone(), e))
    }

    pub fn require_list(&self, object_fq: &str) -> Result<Vec<String>, StoreError> {
        self.read_lines(&self.paths(object_fq).require_file)
    }

    fn read_source(&self, paths: &ObjectPaths) -> Result<Vec<String>, StoreError> {
        self.read_lines(&paths.source_file)
    }

    fn read_lines(&self, path: &Path) -> Result<Vec<String>, StoreError> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(s.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(path.to_path_buf(), e)),
        }
    }
}
