//! Saving and loading fitted models as JSON.
//!
//! Detection never depends on persistence: [`persist_best_effort`] logs and
//! swallows every failure.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Writes `model` to `path` as JSON.
pub fn save_model<T: Serialize>(model: &T, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, model)?;
    writer.flush()?;
    Ok(())
}

/// Reads a model previously written by [`save_model`].
pub fn load_model<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Saves `model`, returning whether it worked. Never fails.
pub fn persist_best_effort<T: Serialize>(model: &T, path: &Path) -> bool {
    match save_model(model, path) {
        Ok(()) => {
            info!(path = %path.display(), "Persisted fitted model");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to persist fitted model; continuing");
            false
        }
    }
}
