use std::fs;
use std::path::PathBuf;

use um_core::report::{BlockedCounts, StoreError, TallyStore};

/// All-time totals kept in a JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TallyStore for JsonFileStore {
    fn load(&self) -> Result<BlockedCounts, StoreError> {
        if !self.path.exists() {
            return Ok(BlockedCounts::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|e| StoreError::Read(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| StoreError::Read(e.to_string()))
    }

    fn persist(&mut self, counts: &BlockedCounts) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(counts).map_err(|e| StoreError::Write(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| StoreError::Write(e.to_string()))
    }
}
