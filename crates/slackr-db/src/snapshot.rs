//! Whole-collection JSON snapshots: `{ "<key>": { <field>: <value>, ... }, ... }`.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::store::Record;

/// Reads a snapshot. `Ok(None)` when the file doesn't exist.
pub fn load(path: &Path, collection: &str) -> Result<Option<IndexMap<u64, Record>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let parsed: IndexMap<String, Record> = serde_json::from_str(&content)?;

    let mut records = IndexMap::with_capacity(parsed.len());
    for (key, record) in parsed {
        let id = key.parse::<u64>().map_err(|_| StoreError::InvalidKey {
            collection: collection.to_string(),
            key: key.clone(),
        })?;
        records.insert(id, record);
    }
    Ok(Some(records))
}

/// Writes a snapshot, creating the parent directory if needed.
pub fn save(path: &Path, records: &IndexMap<u64, Record>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(records)?;
    fs::write(path, content)?;
    Ok(())
}
