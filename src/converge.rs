//! The convergence loop (spec §4.8): repeatedly run every object's type
//! manifest until no new objects are created, bounded by
//! [`MAX_CONVERGENCE_ROUNDS`] so a non-monotone manifest can't hang a run.

use crate::constants::MAX_CONVERGENCE_ROUNDS;
use crate::error::DriverError;
use crate::executor::RemoteExecutor;
use crate::explorer::ExplorerEngine;
use crate::manifest;
use crate::script::EngineEnv;
use crate::store::{ObjectStore, split_fq};
use std::fs;
use std::path::Path;

/// Run explorers and `conf/type/<type>/manifest` for every object not yet
/// processed, repeating until a round creates nothing new. Returns the
/// total number of distinct objects the store holds once the loop settles.
pub fn run<E: RemoteExecutor>(
    executor: &E,
    env: &EngineEnv,
    store: &ObjectStore,
    type_base_dir: &Path,
    explorers: &mut ExplorerEngine<'_, E>,
) -> Result<usize, DriverError> {
    let mut processed = std::collections::HashSet::new();
    let mut round = 0u32;

    loop {
        let objects = store.list()?;
        let mut pending: Vec<String> = objects
            .iter()
            .filter(|o| !processed.contains(*o))
            .cloned()
            .collect();
        pending.sort();

        if pending.is_empty() {
            return Ok(objects.len());
        }

        round += 1;
        if round > MAX_CONVERGENCE_ROUNDS {
            return Err(DriverError::ConvergenceOverflow {
                rounds: MAX_CONVERGENCE_ROUNDS,
                objects: objects.len(),
            });
        }

        for object_fq in pending {
            let (type_name, object_id) = split_fq(&object_fq);
            run_type_explorers(store, explorers, type_name, &object_fq, object_id)?;

            let type_manifest = type_base_dir.join(type_name).join("manifest");
            manifest::run_type_manifest(executor, env, store, &type_manifest, &object_fq, object_id)?;
            processed.insert(object_fq);
        }
    }
}

fn run_type_explorers<E: RemoteExecutor>(
    store: &ObjectStore,
    explorers: &mut ExplorerEngine<'_, E>,
    type_name: &str,
    object_fq: &str,
    object_id: &str,
) -> Result<(), DriverError> {
    explorers.ensure_type_transferred(type_name)?;
    explorers.transfer_object_parameter(store, object_fq)?;

    let names = explorers.list_type_explorer_names(type_name)?;
    if names.is_empty() {
        return Ok(());
    }

    let explorer_dir = store.paths(object_fq).explorer_dir;
    fs::create_dir_all(&explorer_dir)?;
    for name in names {
        let output = explorers.run_type_explorer(type_name, &name, object_fq, object_id)?;
        fs::write(explorer_dir.join(&name), output)?;
    }
    Ok(())
}
