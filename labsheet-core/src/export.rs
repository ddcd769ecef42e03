use crate::encoding::{cell_text, reconstruct, row_to_map};
use crate::record::{Record, KEY_FIELD};
use crate::storage::TabularStore;
use crate::template::Template;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Turns a record into a binary document.
///
/// `Ok(None)` means there is no document template for `template_name`.
#[allow(async_fn_in_trait)]
pub trait DocumentRenderer {
    /// File extension of the produced documents, without the dot.
    fn extension(&self) -> &str {
        "docx"
    }

    async fn render(
        &self,
        template_name: &str,
        context: &Map<String, Value>,
    ) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    /// No document template existed; `bytes` is empty and the operator
    /// should be told.
    pub template_missing: bool,
}

impl ExportedDocument {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Renders `record` with the document template named after the template's
/// display name. A missing document template yields an empty document.
pub async fn to_document<R: DocumentRenderer>(
    record: &Record,
    template_name: &str,
    renderer: &R,
) -> Result<ExportedDocument> {
    match renderer.render(template_name, record.as_map()).await? {
        Some(bytes) => Ok(ExportedDocument {
            bytes,
            template_missing: false,
        }),
        None => {
            tracing::warn!(template = template_name, "document template not found");
            Ok(ExportedDocument {
                bytes: Vec::new(),
                template_missing: true,
            })
        }
    }
}

/// Rebuilds a record from a stored row, decoding cells that look like
/// encoded lists. Cells that fail to decode are kept as text.
pub fn reconstruct_from_persisted_row(row: Map<String, Value>) -> Record {
    reconstruct(row)
}

fn name_part(record: &Record, key: &str) -> Option<String> {
    record
        .text(key)
        .filter(|v| !v.is_empty())
        .map(|v| v.replace(['/', '\\'], "_"))
}

/// `{template}_{investigator}_{date}.{ext}` for a single exported record.
pub fn document_file_name(template_name: &str, record: &Record, extension: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        template_name,
        name_part(record, "investigator").unwrap_or_else(|| "unknown".to_string()),
        name_part(record, "date").unwrap_or_else(|| "nodate".to_string()),
        extension
    )
}

/// Archive entry name for the data row at `sheet_row` (1-based, header is row 1).
pub fn batch_entry_name(
    collection: &str,
    record: &Record,
    sheet_row: usize,
    extension: &str,
) -> String {
    format!(
        "{}/{}_{}.{}",
        collection,
        name_part(record, "date").unwrap_or_else(|| "nodate".to_string()),
        name_part(record, KEY_FIELD).unwrap_or_else(|| format!("row_{}", sheet_row)),
        extension
    )
}

/// `name`, or a `_row_<n>` variant of it when an earlier row already took it.
/// Distinct keys can sanitise to the same name (`A/1` and `A_1`).
fn unique_entry_name(used: &HashSet<String>, name: String, sheet_row: usize, extension: &str) -> String {
    if !used.contains(&name) {
        return name;
    }
    let suffix = format!(".{}", extension);
    let stem = name.strip_suffix(suffix.as_str()).unwrap_or(&name).to_string();
    let mut candidate = format!("{}_row_{}{}", stem, sheet_row, suffix);
    let mut attempt = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_row_{}_{}{}", stem, sheet_row, attempt, suffix);
        attempt += 1;
    }
    candidate
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    options: SimpleFileOptions,
    bytes: &[u8],
) -> Result<()> {
    writer
        .start_file(name, options)
        .with_context(|| format!("failed to add archive entry {}", name))?;
    writer
        .write_all(bytes)
        .with_context(|| format!("failed to write archive entry {}", name))?;
    Ok(())
}

pub fn batch_archive_name(today: NaiveDate) -> String {
    format!("BatchExport_{}.zip", today.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub collection: String,
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchExport {
    pub archive: Vec<u8>,
    pub file_name: String,
    pub generated: usize,
    pub entries: Vec<String>,
    pub skipped: Vec<SkippedRow>,
}

/// Renders every stored row of every template into one zip archive.
///
/// Rows that cannot be rendered or written are reported in `skipped` and do
/// not stop the batch. Store read failures abort it.
pub async fn batch_export<S, R>(
    store: &S,
    templates: &[Template],
    renderer: &R,
    today: NaiveDate,
) -> Result<BatchExport>
where
    S: TabularStore,
    R: DocumentRenderer,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = Vec::new();
    let mut used_names = HashSet::new();
    let mut skipped = Vec::new();

    for template in templates {
        let collection = template.collection();
        if !store
            .collection_exists(collection)
            .await
            .with_context(|| format!("failed to look up collection {}", collection))?
        {
            continue;
        }
        let grid = store
            .read_rows(collection)
            .await
            .with_context(|| format!("failed to read collection {}", collection))?;
        let Some((header_row, data_rows)) = grid.split_first() else {
            continue;
        };
        let header: Vec<String> = header_row.iter().map(cell_text).collect();

        for (idx, cells) in data_rows.iter().enumerate() {
            let sheet_row = idx + 2;
            if cells.iter().all(|c| cell_text(c).is_empty()) {
                continue;
            }
            let record = reconstruct_from_persisted_row(row_to_map(&header, cells));
            let reason = match to_document(&record, &template.name, renderer).await {
                Ok(doc) if !doc.template_missing => {
                    let name = unique_entry_name(
                        &used_names,
                        batch_entry_name(collection, &record, sheet_row, renderer.extension()),
                        sheet_row,
                        renderer.extension(),
                    );
                    let written = write_entry(&mut writer, &name, options, &doc.bytes);
                    used_names.insert(name.clone());
                    match written {
                        Ok(()) => {
                            entries.push(name);
                            continue;
                        }
                        Err(e) => format!("{:#}", e),
                    }
                }
                Ok(_) => format!("no document template for '{}'", template.name),
                Err(e) => format!("{:#}", e),
            };
            tracing::warn!(collection, row = sheet_row, reason = %reason, "skipped row in batch export");
            skipped.push(SkippedRow {
                collection: collection.to_string(),
                row: sheet_row,
                reason,
            });
        }
    }

    let archive = writer.finish()?.into_inner();
    tracing::info!(
        generated = entries.len(),
        skipped = skipped.len(),
        "batch export finished"
    );
    Ok(BatchExport {
        archive,
        file_name: batch_archive_name(today),
        generated: entries.len(),
        entries,
        skipped,
    })
}
