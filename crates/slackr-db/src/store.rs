use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::query::Operator;
use crate::snapshot;

/// First key handed out by a fresh store, and by a store reloaded from an
/// empty snapshot.
pub const START_ID: u64 = 1;

/// One entity instance: field name to heterogeneous JSON value.
pub type Record = serde_json::Map<String, Value>;

/// A named, keyed collection of records persisted as one JSON snapshot.
///
/// Every operation takes the store's mutex for its full duration, reads
/// included, so `query` and `list` never observe a half-applied write.
/// Use [`RecordStore::with_table`] when several steps must apply as one.
pub struct RecordStore {
    name: String,
    primary_key: String,
    snapshot_path: PathBuf,
    table: Mutex<Table>,
}

/// The records behind a [`RecordStore`]'s lock.
///
/// Iteration order is insertion order. Keys are never reused within a
/// process: `next_id` only moves forward, deletions included.
#[derive(Debug)]
pub struct Table {
    collection: String,
    primary_key: String,
    records: IndexMap<u64, Record>,
    next_id: u64,
}

impl RecordStore {
    /// Opens the collection `name`, seeding it from `<dir>/<name>.json` when
    /// that snapshot exists and starting empty otherwise.
    pub fn open(dir: &Path, name: &str, primary_key: &str) -> Result<Self> {
        let snapshot_path = dir.join(format!("{name}.json"));
        let mut table = Table::new(name, primary_key);

        if let Some(records) = snapshot::load(&snapshot_path, name)? {
            table.restore(records);
            info!(
                "Loaded {} {} records from {} (next id {})",
                table.len(),
                name,
                snapshot_path.display(),
                table.next_id
            );
        } else {
            info!("No snapshot at {}, starting {} empty", snapshot_path.display(), name);
        }

        Ok(Self {
            name: name.to_string(),
            primary_key: primary_key.to_string(),
            snapshot_path,
            table: Mutex::new(table),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field every record carries its own key in.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        self.table
            .lock()
            .map_err(|_| StoreError::Poisoned(self.name.clone()))
    }

    /// Runs `f` with the table locked. `f` may fail with any error a
    /// [`StoreError`] converts into.
    pub fn with_table<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Table) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut table = self.lock()?;
        f(&mut *table)
    }

    pub fn get(&self, key: u64) -> Result<Option<Record>> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn query(&self, field: &str, op: Operator, value: &Value) -> Result<Vec<Record>> {
        Ok(self.lock()?.query(field, op, value))
    }

    pub fn list(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.list())
    }

    pub fn add(&self, payload: Record) -> Result<u64> {
        Ok(self.lock()?.add(payload))
    }

    pub fn add_with_id(&self, payload: Record, key: u64) -> Result<u64> {
        Ok(self.lock()?.add_with_id(payload, key))
    }

    pub fn set(&self, key: u64, field: &str, value: Value) -> Result<()> {
        self.lock()?.set(key, field, value)
    }

    pub fn set_field(&self, key: u64, field: &str, value: Value) -> Result<()> {
        self.lock()?.set_field(key, field, value)
    }

    pub fn append_to_field(&self, key: u64, field: &str, value: Value) -> Result<()> {
        self.lock()?.append_to_field(key, field, value)
    }

    pub fn remove(&self, key: u64, field: &str, value: &Value) -> Result<()> {
        self.lock()?.remove(key, field, value)
    }

    pub fn delete_record(&self, key: u64) -> Result<Record> {
        self.lock()?.delete_record(key)
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Clears every record. `next_id` is left where it was.
    pub fn drop(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Writes the whole collection to its snapshot file. Last writer wins;
    /// the write is not atomic.
    pub fn save_snapshot(&self) -> Result<PathBuf> {
        let table = self.lock()?;
        snapshot::save(&self.snapshot_path, &table.records)?;
        info!(
            "Saved {} {} records to {}",
            table.len(),
            self.name,
            self.snapshot_path.display()
        );
        Ok(self.snapshot_path.clone())
    }
}

impl Table {
    fn new(collection: &str, primary_key: &str) -> Self {
        Self {
            collection: collection.to_string(),
            primary_key: primary_key.to_string(),
            records: IndexMap::new(),
            next_id: START_ID,
        }
    }

    fn restore(&mut self, mut records: IndexMap<u64, Record>) {
        for (key, record) in records.iter_mut() {
            record.insert(self.primary_key.clone(), Value::from(*key));
        }
        self.next_id = records.keys().max().map_or(START_ID, |max| max + 1);
        self.records = records;
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Key the next `add` will allocate.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.records.contains_key(&key)
    }

    pub fn get(&self, key: u64) -> Option<&Record> {
        self.records.get(&key)
    }

    /// Records holding `field` whose value satisfies `op` against `value`,
    /// in insertion order. Records without the field are skipped.
    pub fn query(&self, field: &str, op: Operator, value: &Value) -> Vec<Record> {
        self.records
            .values()
            .filter(|record| {
                record
                    .get(field)
                    .is_some_and(|current| op.matches(current, value))
            })
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }

    /// Stores `payload` under a freshly allocated key, stamping the key into
    /// its primary key field.
    pub fn add(&mut self, payload: Record) -> u64 {
        let key = self.next_id;
        self.next_id += 1;
        self.add_with_id(payload, key)
    }

    /// Stores `payload` under `key`, replacing any record already there.
    /// Does not touch `next_id`.
    pub fn add_with_id(&mut self, mut payload: Record, key: u64) -> u64 {
        payload.insert(self.primary_key.clone(), Value::from(key));
        self.records.insert(key, payload);
        key
    }

    /// Appends `value` when the field currently holds a list and replaces it
    /// otherwise. Prefer [`Table::set_field`] or [`Table::append_to_field`],
    /// which say which of the two is meant.
    pub fn set(&mut self, key: u64, field: &str, value: Value) -> Result<()> {
        match self.field_mut(key, field)? {
            Value::Array(items) => items.push(value),
            current => *current = value,
        }
        Ok(())
    }

    /// Replaces the field's value, whatever its current type.
    pub fn set_field(&mut self, key: u64, field: &str, value: Value) -> Result<()> {
        *self.field_mut(key, field)? = value;
        Ok(())
    }

    /// Pushes `value` onto a list-valued field.
    pub fn append_to_field(&mut self, key: u64, field: &str, value: Value) -> Result<()> {
        let collection = self.collection.clone();
        match self.field_mut(key, field)? {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(StoreError::TypeMismatch {
                collection,
                key,
                field: field.to_string(),
            }),
        }
    }

    /// Removes the first occurrence of `value` from a list-valued field.
    pub fn remove(&mut self, key: u64, field: &str, value: &Value) -> Result<()> {
        let collection = self.collection.clone();
        let Value::Array(items) = self.field_mut(key, field)? else {
            return Err(StoreError::TypeMismatch {
                collection,
                key,
                field: field.to_string(),
            });
        };
        let Some(index) = items.iter().position(|item| item == value) else {
            return Err(StoreError::ValueNotFound {
                collection,
                key,
                field: field.to_string(),
            });
        };
        items.remove(index);
        Ok(())
    }

    /// Removes the record, returning it.
    pub fn delete_record(&mut self, key: u64) -> Result<Record> {
        self.records
            .shift_remove(&key)
            .ok_or_else(|| self.not_found(key))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn field_mut(&mut self, key: u64, field: &str) -> Result<&mut Value> {
        let collection = &self.collection;
        let record = self.records.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            collection: collection.clone(),
            key,
        })?;
        record
            .get_mut(field)
            .ok_or_else(|| StoreError::FieldNotFound {
                collection: collection.clone(),
                key,
                field: field.to_string(),
            })
    }

    pub fn not_found(&self, key: u64) -> StoreError {
        StoreError::NotFound {
            collection: self.collection.clone(),
            key,
        }
    }
}
