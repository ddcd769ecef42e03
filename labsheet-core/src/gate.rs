//! Uniqueness check and row append against a collection.
//!
//! Neither operation returns an error: store failures are folded into the
//! outcome so callers can show them directly. `check` is advisory; `append`
//! repeats the lookup before writing, but nothing locks the collection in
//! between, so two sessions submitting the same key at the same moment can
//! both pass.

use crate::encoding::{cell_text, flatten};
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, KEY_FIELD};
use crate::storage::TabularStore;
use serde::Serialize;

/// Column holding the unique record key.
pub const KEY_COLUMN: &str = KEY_FIELD;

/// Room reserved when a collection is created on first write.
pub const INITIAL_ROWS: usize = 100;
pub const INITIAL_COLS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Available,
    Taken,
    EmptyKey,
    NoCollection,
    NoKeyColumn,
    NoSpreadsheet,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub available: bool,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckOutcome {
    fn new(status: CheckStatus, message: String) -> Self {
        let available = matches!(
            status,
            CheckStatus::Available
                | CheckStatus::NoCollection
                | CheckStatus::NoKeyColumn
                | CheckStatus::NoSpreadsheet
        );
        Self {
            available,
            status,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendStatus {
    Written,
    DuplicateKey,
    NoSpreadsheet,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub ok: bool,
    pub status: AppendStatus,
    pub message: String,
    /// Columns appended to the header by this write.
    pub added_columns: Vec<String>,
}

impl AppendOutcome {
    fn failure(status: AppendStatus, message: String) -> Self {
        Self {
            ok: false,
            status,
            message,
            added_columns: Vec::new(),
        }
    }
}

enum KeyLookup {
    NoCollection,
    NoKeyColumn,
    Keys(Vec<String>),
}

impl KeyLookup {
    fn contains(&self, key: &str) -> bool {
        matches!(self, KeyLookup::Keys(keys) if keys.iter().any(|k| k == key))
    }
}

async fn existing_keys<S: TabularStore>(store: &S, collection: &str) -> StoreResult<KeyLookup> {
    if !store.collection_exists(collection).await? {
        return Ok(KeyLookup::NoCollection);
    }
    let header = match store.read_header(collection).await {
        Ok(header) => header,
        Err(StoreError::CollectionNotFound(_)) => return Ok(KeyLookup::NoCollection),
        Err(e) => return Err(e),
    };
    let Some(index) = header.iter().position(|c| c == KEY_COLUMN) else {
        return Ok(KeyLookup::NoKeyColumn);
    };
    let keys = store
        .read_column(collection, index)
        .await?
        .iter()
        .skip(1)
        .map(cell_text)
        .collect();
    Ok(KeyLookup::Keys(keys))
}

/// Whether `candidate` is still free in `collection`.
pub async fn check<S: TabularStore>(store: &S, collection: &str, candidate: &str) -> CheckOutcome {
    if candidate.is_empty() {
        return CheckOutcome::new(
            CheckStatus::EmptyKey,
            "Experiment code cannot be empty.".to_string(),
        );
    }

    let outcome = match existing_keys(store, collection).await {
        Ok(KeyLookup::NoCollection) => CheckOutcome::new(
            CheckStatus::NoCollection,
            format!(
                "Experiment code '{}' is available (collection '{}' does not exist yet).",
                candidate, collection
            ),
        ),
        Ok(KeyLookup::NoKeyColumn) => CheckOutcome::new(
            CheckStatus::NoKeyColumn,
            format!(
                "Warning: collection '{}' has no '{}' column, uniqueness cannot be verified.",
                collection, KEY_COLUMN
            ),
        ),
        Ok(lookup) if lookup.contains(candidate) => CheckOutcome::new(
            CheckStatus::Taken,
            format!(
                "Experiment code '{}' already exists in collection '{}'.",
                candidate, collection
            ),
        ),
        Ok(_) => CheckOutcome::new(
            CheckStatus::Available,
            format!(
                "Experiment code '{}' is available in collection '{}'.",
                candidate, collection
            ),
        ),
        Err(StoreError::SpreadsheetNotFound(target)) => CheckOutcome::new(
            CheckStatus::NoSpreadsheet,
            format!(
                "Warning: spreadsheet '{}' was not found, uniqueness cannot be verified.",
                target
            ),
        ),
        Err(e) => CheckOutcome::new(
            CheckStatus::Failed,
            format!("Error while checking experiment code: {}", e),
        ),
    };

    tracing::debug!(
        collection,
        candidate,
        status = ?outcome.status,
        "checked experiment code"
    );
    outcome
}

/// Appends `record` as a new row of `collection`, widening the header with
/// any keys it does not have yet.
pub async fn append<S: TabularStore>(store: &S, collection: &str, record: &Record) -> AppendOutcome {
    match try_append(store, collection, record).await {
        Ok(outcome) => outcome,
        Err(StoreError::SpreadsheetNotFound(target)) => {
            tracing::warn!(collection, %target, "append target spreadsheet not found");
            AppendOutcome::failure(
                AppendStatus::NoSpreadsheet,
                format!("Spreadsheet not found: {}", target),
            )
        }
        Err(e) => {
            tracing::warn!(collection, error = %e, "append failed");
            AppendOutcome::failure(
                AppendStatus::Failed,
                format!("Failed to write to the store: {}", e),
            )
        }
    }
}

async fn try_append<S: TabularStore>(
    store: &S,
    collection: &str,
    record: &Record,
) -> StoreResult<AppendOutcome> {
    if !store.collection_exists(collection).await? {
        store
            .create_collection(collection, INITIAL_ROWS, INITIAL_COLS)
            .await?;
        tracing::info!(collection, "created collection");
    }

    if let Some(key) = record.key() {
        if existing_keys(store, collection).await?.contains(&key) {
            tracing::info!(collection, key = %key, "rejected duplicate experiment code");
            return Ok(AppendOutcome::failure(
                AppendStatus::DuplicateKey,
                format!(
                    "Submission failed: experiment code '{}' already exists in collection '{}'.",
                    key, collection
                ),
            ));
        }
    }

    let flat = flatten(record);
    let mut header = store.read_header(collection).await?;
    let mut added_columns = Vec::new();

    if header.is_empty() {
        header = flat.columns().map(str::to_string).collect();
        store.write_header_cells(collection, 0, &header).await?;
        store.append_rows(collection, vec![flat.values()]).await?;
        added_columns = header;
    } else {
        for column in flat.columns() {
            if !header.iter().any(|c| c == column) && !added_columns.iter().any(|c| c == column) {
                added_columns.push(column.to_string());
            }
        }
        if !added_columns.is_empty() {
            store
                .write_header_cells(collection, header.len(), &added_columns)
                .await?;
            header.extend(added_columns.iter().cloned());
            tracing::info!(collection, columns = ?added_columns, "widened collection header");
        }
        store
            .append_rows(collection, vec![flat.aligned(&header)])
            .await?;
    }

    Ok(AppendOutcome {
        ok: true,
        status: AppendStatus::Written,
        message: "Record written to the store.".to_string(),
        added_columns,
    })
}
