use anyhow::{anyhow, Result};
use labsheet_core::config::AppConfig;
use labsheet_core::error::{StoreError, StoreResult};
use labsheet_core::export::DocumentRenderer;
use labsheet_core::storage::TabularStore;
use labsheet_core::template::Template;
use opendal::services::Memory;
use opendal::Operator;
use serde_json::{Map, Value};
use std::sync::Mutex;

#[allow(dead_code)]
pub fn setup_operator() -> Result<Operator> {
    let builder = Memory::default();
    let op = Operator::new(builder)?.finish();
    Ok(op)
}

#[allow(dead_code)]
pub const SAMPLE_CONFIG: &str = r#"{
    "google_sheet_url": "memory://labsheet-tests",
    "experimenters": ["Alice", "Bob"],
    "labels": {
        "lbl_exp_code": "Experiment code",
        "lbl_cell_type": "Cell type",
        "sub_general": "General",
        "electrochem_page_title": "Electrochemical Testing"
    },
    "templates": [
        {
            "type": "electrochem",
            "name": "Electrochemical_Testing",
            "fields": [
                {"key": "exp_code", "type": "text", "label_key": "lbl_exp_code"},
                {"key": "date", "type": "autofill"},
                {"key": "investigator", "type": "autofill"},
                {"key": "topic", "type": "autofill"},
                {"key": "voltage", "type": "number", "format": "%.2f", "step": 0.01},
                {"key": "cell_type", "type": "radio", "label_key": "lbl_cell_type", "options": ["coin", "pouch"]},
                {"key": "note", "type": "textarea", "optional": true, "default": "n/a"}
            ],
            "tables": [
                {
                    "key": "cathode_table",
                    "columns": [
                        {"key": "material", "type": "text", "required": true},
                        {"key": "weight", "type": "number", "format": "%.3f"}
                    ]
                }
            ],
            "layout": [
                {"type": "subheader", "label_key": "sub_general"},
                {"type": "field", "key": "exp_code"},
                {"type": "field", "key": "date"},
                {"type": "field", "key": "investigator"},
                {"type": "field", "key": "topic"},
                {"type": "divider"},
                {"type": "field", "key": "voltage"},
                {"type": "field", "key": "cell_type"},
                {"type": "field", "key": "note"},
                {"type": "table", "key": "cathode_table"}
            ]
        },
        {
            "type": "synthesis",
            "name": "Synthesis",
            "fields": [
                {"key": "exp_code", "type": "text"},
                {"key": "date", "type": "autofill"}
            ],
            "layout": [
                {"type": "field", "key": "exp_code"},
                {"type": "field", "key": "date"}
            ]
        }
    ]
}"#;

#[allow(dead_code)]
pub fn sample_config() -> Result<AppConfig> {
    Ok(AppConfig::parse(
        SAMPLE_CONFIG,
        labsheet_core::config::ConfigFormat::Json,
    )?)
}

#[allow(dead_code)]
pub fn sample_template() -> Result<Template> {
    sample_config()?
        .template("electrochem")
        .cloned()
        .ok_or_else(|| anyhow!("electrochem template missing"))
}

/// Store whose every call fails with the given error.
#[allow(dead_code)]
pub struct FailingStore(pub StoreError);

impl TabularStore for FailingStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Err(self.0.clone())
    }

    async fn collection_exists(&self, _collection: &str) -> StoreResult<bool> {
        Err(self.0.clone())
    }

    async fn create_collection(&self, _c: &str, _rows: usize, _cols: usize) -> StoreResult<()> {
        Err(self.0.clone())
    }

    async fn read_header(&self, _collection: &str) -> StoreResult<Vec<String>> {
        Err(self.0.clone())
    }

    async fn read_column(&self, _collection: &str, _index: usize) -> StoreResult<Vec<Value>> {
        Err(self.0.clone())
    }

    async fn write_header_cells(&self, _c: &str, _start: usize, _v: &[String]) -> StoreResult<()> {
        Err(self.0.clone())
    }

    async fn append_rows(&self, _collection: &str, _rows: Vec<Vec<Value>>) -> StoreResult<()> {
        Err(self.0.clone())
    }

    async fn read_rows(&self, _collection: &str) -> StoreResult<Vec<Vec<Value>>> {
        Err(self.0.clone())
    }
}

/// Renderer that serializes the context as JSON and remembers every call.
///
/// Templates named in `missing` have no document; a context whose
/// `exp_code` is in `failing` makes rendering fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingRenderer {
    pub missing: Vec<String>,
    pub failing: Vec<String>,
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

#[allow(dead_code)]
impl RecordingRenderer {
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DocumentRenderer for RecordingRenderer {
    async fn render(
        &self,
        template_name: &str,
        context: &Map<String, Value>,
    ) -> Result<Option<Vec<u8>>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((template_name.to_string(), context.clone()));
        }
        if self.missing.iter().any(|m| m == template_name) {
            return Ok(None);
        }
        if let Some(code) = context.get("exp_code").and_then(|v| v.as_str()) {
            if self.failing.iter().any(|f| f == code) {
                return Err(anyhow!("renderer rejected {}", code));
            }
        }
        Ok(Some(serde_json::to_vec(context)?))
    }
}
