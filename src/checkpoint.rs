// Checkpoints — save/restore parameters together with optimizer state
//
// A training run can resume exactly where it left off only if the optimizer
// state (moment estimates, step counters, injected hyperparameters,
// accumulators) is restored alongside the parameters. Both are plain serde
// values, so a checkpoint is a single JSON document.
//
// Loading does not know which transformation the state belongs to. A state
// saved from a different optimizer is detected on the first update, which
// fails with a state mismatch error.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::Params;
use crate::transform::TransformState;

/// Parameters, optimizer state and the step they were taken at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: u64,
    pub params: Params,
    pub state: TransformState,
}

impl Checkpoint {
    pub fn new(step: u64, params: Params, state: TransformState) -> Self {
        Checkpoint {
            step,
            params,
            state,
        }
    }

    /// Write the checkpoint as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("saved checkpoint at step {} to {}", self.step, path.display());
        Ok(())
    }

    /// Read a checkpoint written by [`Checkpoint::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let checkpoint: Checkpoint = serde_json::from_str(&fs::read_to_string(path)?)?;
        info!(
            "loaded checkpoint at step {} from {}",
            checkpoint.step,
            path.display()
        );
        Ok(checkpoint)
    }
}

/// Write only the optimizer state.
pub fn save_state(state: &TransformState, path: impl AsRef<Path>) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

/// Read an optimizer state written by [`save_state`].
pub fn load_state(path: impl AsRef<Path>) -> Result<TransformState> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}
