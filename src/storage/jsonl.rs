//! JSONL-based storage implementation with in-memory caching.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{LoanrError, Result};

type Cache = HashMap<String, Vec<serde_json::Value>>;

/// JSONL-based storage with in-memory caching.
///
/// Every mutation happens under the cache write lock, so a conditional
/// `patch` is atomic with respect to other writers in the process.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<Cache>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn record_id(record: &serde_json::Value) -> Option<u64> {
    record.get("id").and_then(|v| v.as_u64())
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn read_collection(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| LoanrError::StorageFailure(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.write_cache()?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let records = self.read_collection(collection)?;
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    fn write_cache(&self) -> Result<RwLockWriteGuard<'_, Cache>> {
        self.cache
            .write()
            .map_err(|e| LoanrError::StorageFailure(e.to_string()))
    }

    /// Append records to the JSONL file in a single write.
    fn append_to_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// Rewrite the entire collection file via a temp file and rename.
    fn rewrite_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn next_id(records: &[serde_json::Value]) -> u64 {
        records.iter().filter_map(record_id).max().unwrap_or(0) + 1
    }

    /// Assign ids and append `records`; the caller holds the write lock.
    fn append_locked<T: Serialize + HasId>(
        &self,
        collection: &str,
        existing: &mut Vec<serde_json::Value>,
        records: &mut [T],
    ) -> Result<()> {
        let first_id = Self::next_id(existing);
        let mut values = Vec::with_capacity(records.len());
        for (offset, record) in records.iter_mut().enumerate() {
            let id = first_id + offset as u64;
            let mut value = serde_json::to_value(&*record)?;
            value
                .as_object_mut()
                .ok_or_else(|| LoanrError::StorageFailure(format!("Record for {} is not an object", collection)))?
                .insert("id".to_string(), serde_json::Value::from(id));
            values.push((id, value));
        }

        // File first (source of truth), then cache and caller's records
        let raw: Vec<serde_json::Value> = values.iter().map(|(_, v)| v.clone()).collect();
        self.append_to_file(collection, &raw)?;
        existing.extend(raw);
        for (record, (id, _)) in records.iter_mut().zip(values) {
            record.set_id(id);
        }

        Ok(())
    }
}

impl Storage for JsonlStorage {
    fn insert<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &mut T) -> Result<u64> {
        self.insert_many(collection, std::slice::from_mut(record))?;
        Ok(record.id())
    }

    fn insert_many<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, records: &mut [T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_loaded(collection)?;

        let mut cache = self.write_cache()?;
        let existing = cache
            .get_mut(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        self.append_locked(collection, existing, records)
    }

    fn insert_unless<T: Serialize + DeserializeOwned + HasId>(
        &self,
        collection: &str,
        record: &mut T,
        conflict: &[Filter],
    ) -> Result<Option<u64>> {
        self.ensure_loaded(collection)?;

        let mut cache = self.write_cache()?;
        let existing = cache
            .get_mut(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        if !conflict.is_empty() && existing.iter().any(|r| conflict.iter().all(|f| f.matches(r))) {
            return Ok(None);
        }

        self.append_locked(collection, existing, std::slice::from_mut(record))?;
        Ok(Some(record.id()))
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: u64) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| LoanrError::StorageFailure(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        match records.iter().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: u64, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.write_cache()?;
        let records = cache
            .get_mut(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| LoanrError::not_found(collection, id))?;
        let previous = std::mem::replace(slot, value);

        if let Err(e) = self.rewrite_file(collection, records) {
            if let Some(slot) = records.iter_mut().find(|r| record_id(r) == Some(id)) {
                *slot = previous;
            }
            return Err(e);
        }

        Ok(())
    }

    fn patch(
        &self,
        collection: &str,
        id: u64,
        expected: &[Filter],
        changes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        self.ensure_loaded(collection)?;

        let mut cache = self.write_cache()?;
        let records = cache
            .get_mut(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| LoanrError::not_found(collection, id))?;

        if !expected.iter().all(|f| f.matches(slot)) {
            return Ok(false);
        }

        let previous = slot.clone();
        let object = slot
            .as_object_mut()
            .ok_or_else(|| LoanrError::StorageFailure(format!("Record {} in {} is not an object", id, collection)))?;
        for (key, value) in changes {
            object.insert(key, value);
        }
        object.insert("updated_at".to_string(), serde_json::to_value(Utc::now())?);

        if let Err(e) = self.rewrite_file(collection, records) {
            if let Some(slot) = records.iter_mut().find(|r| record_id(r) == Some(id)) {
                *slot = previous;
            }
            return Err(e);
        }

        Ok(true)
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| LoanrError::StorageFailure(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| LoanrError::StorageFailure(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }

        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }
}
