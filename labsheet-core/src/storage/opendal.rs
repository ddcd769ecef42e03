use super::{check_collection_name, operator_from_uri, Sheet, TabularStore};
use crate::error::{StoreError, StoreResult};
use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::TryStreamExt;
use opendal::{EntryMode, ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetMeta {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

/// Tabular store kept as JSON grids behind an OpenDAL operator.
///
/// Layout under `root`:
/// - `spreadsheet.json` marks an initialised store
/// - `collections/<name>.json` holds one [`Sheet`] per collection
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    root: String,
}

impl OpendalStore {
    pub fn new(op: Operator, root: &str) -> Self {
        Self {
            op,
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(operator_from_uri(uri)?, ""))
    }

    fn path(&self, relative: &str) -> String {
        if self.root.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.root, relative)
        }
    }

    fn meta_path(&self) -> String {
        self.path("spreadsheet.json")
    }

    fn collections_dir(&self) -> String {
        self.path("collections/")
    }

    fn sheet_path(&self, collection: &str) -> String {
        self.path(&format!("collections/{}.json", collection))
    }

    fn target(&self) -> String {
        if self.root.is_empty() {
            "/".to_string()
        } else {
            self.root.clone()
        }
    }

    pub async fn create_spreadsheet(&self, title: &str) -> Result<SpreadsheetMeta> {
        let meta_path = self.meta_path();
        if self.op.exists(&meta_path).await? {
            return Err(anyhow!("Spreadsheet already exists at {}", self.target()));
        }
        let meta = SpreadsheetMeta {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.op.create_dir(&self.collections_dir()).await?;
        self.op
            .write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .await?;
        tracing::info!(location = %self.target(), title, "created spreadsheet");
        Ok(meta)
    }

    pub async fn spreadsheet(&self) -> StoreResult<SpreadsheetMeta> {
        let bytes = match self.op.read(&self.meta_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SpreadsheetNotFound(self.target()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes.to_vec())?)
    }

    async fn ensure_spreadsheet(&self) -> StoreResult<()> {
        if self.op.exists(&self.meta_path()).await? {
            Ok(())
        } else {
            Err(StoreError::SpreadsheetNotFound(self.target()))
        }
    }

    async fn load_sheet(&self, collection: &str) -> StoreResult<Sheet> {
        self.ensure_spreadsheet().await?;
        let bytes = match self.op.read(&self.sheet_path(collection)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::CollectionNotFound(collection.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes.to_vec())?)
    }

    async fn save_sheet(&self, collection: &str, sheet: &Sheet) -> StoreResult<()> {
        self.op
            .write(&self.sheet_path(collection), serde_json::to_vec(sheet)?)
            .await?;
        Ok(())
    }

    async fn update_sheet(&self, collection: &str, f: impl FnOnce(&mut Sheet)) -> StoreResult<()> {
        let mut sheet = self.load_sheet(collection).await?;
        f(&mut sheet);
        self.save_sheet(collection, &sheet).await
    }
}

impl TabularStore for OpendalStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.ensure_spreadsheet().await?;
        let dir = self.collections_dir();
        if !self.op.exists(&dir).await? {
            return Ok(vec![]);
        }

        let mut lister = self.op.lister(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            if entry.metadata().mode() != EntryMode::FILE {
                continue;
            }
            let file_name = entry.name().rsplit('/').next().unwrap_or(entry.name());
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        self.ensure_spreadsheet().await?;
        Ok(self.op.exists(&self.sheet_path(collection)).await?)
    }

    async fn create_collection(
        &self,
        collection: &str,
        rows: usize,
        cols: usize,
    ) -> StoreResult<()> {
        check_collection_name(collection)?;
        if self.collection_exists(collection).await? {
            return Ok(());
        }
        self.save_sheet(collection, &Sheet::with_capacity(rows, cols))
            .await
    }

    async fn read_header(&self, collection: &str) -> StoreResult<Vec<String>> {
        Ok(self.load_sheet(collection).await?.header())
    }

    async fn read_column(&self, collection: &str, index: usize) -> StoreResult<Vec<Value>> {
        Ok(self.load_sheet(collection).await?.column(index))
    }

    async fn write_header_cells(
        &self,
        collection: &str,
        start: usize,
        values: &[String],
    ) -> StoreResult<()> {
        self.update_sheet(collection, |sheet| sheet.write_header_cells(start, values))
            .await
    }

    async fn append_rows(&self, collection: &str, rows: Vec<Vec<Value>>) -> StoreResult<()> {
        self.update_sheet(collection, |sheet| sheet.append_rows(rows))
            .await
    }

    async fn read_rows(&self, collection: &str) -> StoreResult<Vec<Vec<Value>>> {
        Ok(self.load_sheet(collection).await?.grid)
    }
}
