// src/funscript/script.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::fs;
use crate::error::{HandyError, Result};

/// A single timestamped position instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Milliseconds from script start.
    pub at: u64,
    /// Position 0..=100.
    pub pos: i32,
}

/// A motion script in the usual `.funscript` JSON layout.
///
/// Any field other than `actions` (version, inverted, range, metadata...)
/// is carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub actions: Vec<Action>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Script {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Reads the raw script bytes; a missing file maps to `ScriptNotFound`.
pub async fn read_script_bytes(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HandyError::ScriptNotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
