//! Persist task records and run results.
//!
//! Task records land under `<logs>/<seed>/<outcome>/<step>-<Task>.log`, one pretty-printed
//! JSON document each. Run results land under `<output>/<seed>.json`.

use crate::{manager::ManagerResult, task::TaskResult, Error};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Directory holding every task record of `seed`.
pub fn seed_dir(logs: &Path, seed: u64) -> PathBuf {
    logs.join(seed.to_string())
}

/// Remove the task records a previous run left for `seed`.
pub fn reset(logs: &Path, seed: u64) -> Result<(), Error> {
    let dir = seed_dir(logs, seed);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            debug!(?dir, "removed previous task records");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Write one task record, returning where it was written.
pub fn dump_task(logs: &Path, result: &TaskResult) -> Result<PathBuf, Error> {
    let dir = seed_dir(logs, result.seed).join(result.outcome.as_str());
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}-{}.log", result.step, result.task));
    fs::write(&path, serde_json::to_string_pretty(result)?)?;
    Ok(path)
}

/// Write the result of one worker, returning where it was written.
pub fn dump_result(output: &Path, result: &ManagerResult) -> Result<PathBuf, Error> {
    fs::create_dir_all(output)?;
    let path = output.join(format!("{}.json", result.seed));
    fs::write(&path, serde_json::to_string_pretty(result)?)?;
    Ok(path)
}
