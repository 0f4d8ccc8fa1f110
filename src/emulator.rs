//! The type emulator (spec §4.5, §7): the `__typename` shim invoked from
//! inside a manifest. Parses its own argv, validates parameters against
//! the type's `parameter/required` and `parameter/optional` declarations,
//! and persists the resulting object via the [`ObjectStore`].

use crate::error::EmulatorError;
use crate::store::ObjectStore;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// What a type declares about its own parameters and object-id arity.
#[derive(Debug, Clone, Default)]
pub struct TypeSignature {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub singleton: bool,
}

impl TypeSignature {
    /// Read `parameter/required`, `parameter/optional` and the presence of
    /// a `singleton` marker file from a type's directory.
    pub fn load(type_dir: &Path) -> Result<Self, EmulatorError> {
        let required = read_param_list(&type_dir.join("parameter").join("required"))?;
        let optional = read_param_list(&type_dir.join("parameter").join("optional"))?;
        let singleton = type_dir.join("singleton").is_file();
        Ok(Self {
            required,
            optional,
            singleton,
        })
    }

    fn known(&self, name: &str) -> bool {
        self.required.iter().any(|p| p == name) || self.optional.iter().any(|p| p == name)
    }
}

fn read_param_list(path: &Path) -> Result<Vec<String>, EmulatorError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(EmulatorError::Store(crate::error::StoreError::Io(
            path.to_path_buf(),
            e,
        ))),
    }
}

/// A parsed emulator invocation, before it is checked against a
/// [`TypeSignature`] and stored.
#[derive(Debug, Clone)]
pub struct ParsedInvocation {
    pub type_name: String,
    pub object_id: Option<String>,
    pub params: Vec<(String, String)>,
}

/// Parse `--<param> VALUE ... [object_id]` the way the shell-emulated type
/// binary receives it: every `--name` takes exactly one value, at most one
/// bare positional argument is allowed and it is the object id.
pub fn parse_argv(type_name: &str, args: &[String]) -> Result<ParsedInvocation, EmulatorError> {
    let mut params = Vec::new();
    let mut object_id = None;
    let mut seen: HashSet<String> = HashSet::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some(name) = arg.strip_prefix("--") {
            let value = args.get(i + 1).ok_or_else(|| EmulatorError::MissingRequiredParameter(name.to_string()))?;
            if !seen.insert(name.to_string()) {
                return Err(EmulatorError::UnknownParameter(format!(
                    "{name} (already specified)"
                )));
            }
            params.push((name.to_string(), value.clone()));
            i += 2;
        } else {
            if object_id.is_some() {
                return Err(EmulatorError::MissingObjectId(type_name.to_string()));
            }
            object_id = Some(arg.clone());
            i += 1;
        }
    }

    Ok(ParsedInvocation {
        type_name: type_name.to_string(),
        object_id,
        params,
    })
}

/// Validate a parsed invocation against its type's declared signature:
/// every required parameter present, no unknown parameters, and object-id
/// arity (singleton types take none, ordinary types take exactly one).
pub fn validate(invocation: &ParsedInvocation, sig: &TypeSignature) -> Result<(), EmulatorError> {
    for required in &sig.required {
        if !invocation.params.iter().any(|(k, _)| k == required) {
            return Err(EmulatorError::MissingRequiredParameter(required.clone()));
        }
    }
    for (name, _) in &invocation.params {
        if !sig.known(name) {
            return Err(EmulatorError::UnknownParameter(name.clone()));
        }
    }
    if sig.singleton && invocation.object_id.is_some() {
        return Err(EmulatorError::SingletonTakesNoObjectId(invocation.type_name.clone()));
    }
    if !sig.singleton && invocation.object_id.is_none() {
        return Err(EmulatorError::MissingObjectId(invocation.type_name.clone()));
    }
    Ok(())
}

/// Apply a validated invocation to the store: create/redeclare the object,
/// append `require` (the whitespace-split contents of the `__require`
/// environment variable the invoking manifest exported, if any — `require`
/// is never a CLI parameter) and stamp `source` with the manifest that
/// invoked it.
pub fn apply(
    store: &ObjectStore,
    invocation: &ParsedInvocation,
    current_manifest: &str,
    require: &[String],
) -> Result<String, EmulatorError> {
    // Singleton types carry no positional object id; cdist stores them
    // under a fixed "singleton" id segment so the store's `(type, id)`
    // identity scheme still applies uniformly.
    let raw_id = invocation.object_id.clone().unwrap_or_else(|| "singleton".to_string());
    let normalized_id = crate::store::normalize_object_id(&raw_id)?;
    let fq = crate::store::object_fq(&invocation.type_name, &normalized_id);

    store.create(&invocation.type_name, &normalized_id, current_manifest, &invocation.params)?;
    store.append_require(&fq, require)?;
    Ok(fq)
}
