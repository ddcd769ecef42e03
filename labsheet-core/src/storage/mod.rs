pub mod memory;
pub mod opendal;

use crate::encoding::cell_text;
use crate::error::{StoreError, StoreResult};
use crate::template::validate_identifier;
use anyhow::{anyhow, Result};
use ::opendal::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use url::Url;

pub use self::memory::MemoryStore;
pub use self::opendal::OpendalStore;

/// Capability surface of the remote tabular store.
///
/// A store holds named collections, each a grid whose first row is the header.
/// Column indexes are zero-based. Implementations report a missing collection
/// as [`StoreError::CollectionNotFound`].
#[allow(async_fn_in_trait)]
pub trait TabularStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool>;

    /// Creates an empty collection with room for `rows` x `cols` cells.
    async fn create_collection(&self, collection: &str, rows: usize, cols: usize)
        -> StoreResult<()>;

    /// First row, trailing empty cells trimmed. Empty when nothing was written yet.
    async fn read_header(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// Every cell of column `index`, header cell included.
    async fn read_column(&self, collection: &str, index: usize) -> StoreResult<Vec<Value>>;

    /// Overwrites header cells starting at column `start`.
    async fn write_header_cells(
        &self,
        collection: &str,
        start: usize,
        values: &[String],
    ) -> StoreResult<()>;

    async fn append_rows(&self, collection: &str, rows: Vec<Vec<Value>>) -> StoreResult<()>;

    /// The whole grid, header row first.
    async fn read_rows(&self, collection: &str) -> StoreResult<Vec<Vec<Value>>>;
}

/// Grid contents of one collection, shared by the store implementations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub row_capacity: usize,
    pub col_capacity: usize,
    #[serde(default)]
    pub grid: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn with_capacity(rows: usize, cols: usize) -> Self {
        Self {
            row_capacity: rows,
            col_capacity: cols,
            grid: Vec::new(),
        }
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = self
            .grid
            .first()
            .map(|row| row.iter().map(cell_text).collect())
            .unwrap_or_default();
        while header.last().is_some_and(|c| c.is_empty()) {
            header.pop();
        }
        header
    }

    pub fn column(&self, index: usize) -> Vec<Value> {
        self.grid
            .iter()
            .map(|row| {
                row.get(index)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()))
            })
            .collect()
    }

    pub fn write_header_cells(&mut self, start: usize, values: &[String]) {
        if self.grid.is_empty() {
            self.grid.push(Vec::new());
        }
        let header = &mut self.grid[0];
        let end = start + values.len();
        if header.len() < end {
            header.resize(end, Value::String(String::new()));
        }
        for (offset, value) in values.iter().enumerate() {
            header[start + offset] = Value::String(value.clone());
        }
        self.col_capacity = self.col_capacity.max(end);
        self.row_capacity = self.row_capacity.max(self.grid.len());
    }

    pub fn append_rows(&mut self, rows: Vec<Vec<Value>>) {
        for row in rows {
            self.col_capacity = self.col_capacity.max(row.len());
            self.grid.push(row);
        }
        self.row_capacity = self.row_capacity.max(self.grid.len());
    }
}

pub(crate) fn check_collection_name(collection: &str) -> StoreResult<()> {
    validate_identifier(collection)
        .map_err(|_| StoreError::InvalidCollection(collection.to_string()))
}

static MEMORY_OPERATORS: OnceLock<Mutex<HashMap<String, Operator>>> = OnceLock::new();

fn memory_cache() -> &'static Mutex<HashMap<String, Operator>> {
    MEMORY_OPERATORS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolves a store or asset URI to an operator.
///
/// `memory://` operators are cached per URI so separate handles share
/// contents, and `file:///path` maps onto the local filesystem.
pub fn operator_from_uri(uri: &str) -> Result<Operator> {
    if uri.starts_with("memory://") {
        let mut cache = memory_cache()
            .lock()
            .map_err(|_| anyhow!("memory operator cache lock poisoned"))?;
        if let Some(op) = cache.get(uri) {
            return Ok(op.clone());
        }
        let op = Operator::new(::opendal::services::Memory::default())?.finish();
        cache.insert(uri.to_string(), op.clone());
        return Ok(op);
    }

    if uri.starts_with("file://") {
        let url = Url::parse(uri).map_err(|e| anyhow!("Invalid storage URI: {}", e))?;
        let builder = ::opendal::services::Fs::default().root(url.path());
        return Ok(Operator::new(builder)?.finish());
    }

    Ok(Operator::from_uri(uri)?)
}
