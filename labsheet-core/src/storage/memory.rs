use super::{check_collection_name, Sheet, TabularStore};
use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-local store. Clones share the same collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sheets: Arc<Mutex<BTreeMap<String, Sheet>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection with a header and data rows.
    pub fn with_collection(self, collection: &str, header: &[&str], rows: Vec<Vec<Value>>) -> Self {
        if let Ok(mut sheets) = self.sheets.lock() {
            let mut sheet = Sheet::with_capacity(100, 50);
            if !header.is_empty() {
                let header: Vec<String> = header.iter().map(|c| c.to_string()).collect();
                sheet.write_header_cells(0, &header);
            }
            sheet.append_rows(rows);
            sheets.insert(collection.to_string(), sheet);
        }
        self
    }

    /// Copy of a collection's grid.
    pub fn snapshot(&self, collection: &str) -> Option<Sheet> {
        self.lock().ok()?.get(collection).cloned()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, Sheet>>> {
        self.sheets
            .lock()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".to_string()))
    }

    fn with_sheet<T>(&self, collection: &str, f: impl FnOnce(&mut Sheet) -> T) -> StoreResult<T> {
        let mut sheets = self.lock()?;
        let sheet = sheets
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(f(sheet))
    }
}

impl TabularStore for MemoryStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        Ok(self.lock()?.contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        rows: usize,
        cols: usize,
    ) -> StoreResult<()> {
        check_collection_name(collection)?;
        self.lock()?
            .entry(collection.to_string())
            .or_insert_with(|| Sheet::with_capacity(rows, cols));
        Ok(())
    }

    async fn read_header(&self, collection: &str) -> StoreResult<Vec<String>> {
        self.with_sheet(collection, |sheet| sheet.header())
    }

    async fn read_column(&self, collection: &str, index: usize) -> StoreResult<Vec<Value>> {
        self.with_sheet(collection, |sheet| sheet.column(index))
    }

    async fn write_header_cells(
        &self,
        collection: &str,
        start: usize,
        values: &[String],
    ) -> StoreResult<()> {
        self.with_sheet(collection, |sheet| sheet.write_header_cells(start, values))
    }

    async fn append_rows(&self, collection: &str, rows: Vec<Vec<Value>>) -> StoreResult<()> {
        self.with_sheet(collection, |sheet| sheet.append_rows(rows))
    }

    async fn read_rows(&self, collection: &str) -> StoreResult<Vec<Vec<Value>>> {
        self.with_sheet(collection, |sheet| sheet.grid.clone())
    }
}
