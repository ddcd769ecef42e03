use crate::config::Labels;
use crate::error::FormError;
use crate::export::{document_file_name, to_document, DocumentRenderer, ExportedDocument};
use crate::gate::{self, AppendOutcome, CheckOutcome};
use crate::record::{Record, KEY_FIELD};
use crate::storage::TabularStore;
use crate::template::{
    AutofillSource, ColumnDef, ColumnKind, FieldDef, FieldKind, LayoutItem, TableDef, Template,
};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type TableRow = Map<String, Value>;

/// Environment the autofill fields derive from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormContext {
    pub today: NaiveDate,
    pub operator: String,
}

impl FormContext {
    pub fn new(today: NaiveDate, operator: impl Into<String>) -> Self {
        Self {
            today,
            operator: operator.into(),
        }
    }

    pub fn now(operator: impl Into<String>) -> Self {
        Self::new(Local::now().date_naive(), operator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedForm {
    pub template_type: String,
    pub title: String,
    pub items: Vec<RenderedItem>,
}

impl RenderedForm {
    pub fn field(&self, key: &str) -> Option<&RenderedField> {
        self.items.iter().find_map(|item| match item {
            RenderedItem::Field(field) if field.key == key => Some(field),
            _ => None,
        })
    }

    pub fn table(&self, key: &str) -> Option<&RenderedTable> {
        self.items.iter().find_map(|item| match item {
            RenderedItem::Table(table) if table.key == key => Some(table),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderedItem {
    Subheader { label: String },
    Divider,
    Field(RenderedField),
    Table(RenderedTable),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub optional: bool,
    pub editable: bool,
    pub value: Value,
    /// Last uniqueness check, only on the key field.
    pub check: Option<CheckOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedTable {
    pub key: String,
    pub label: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<TableRow>,
}

/// In-progress record for one template, owned by a user session.
#[derive(Debug, Clone)]
pub struct FormSession {
    id: Uuid,
    template_type: String,
    record: Record,
    tables: BTreeMap<String, Vec<TableRow>>,
    last_check: Option<CheckOutcome>,
}

impl FormSession {
    pub fn new(template: &Template) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_type: template.template_type.clone(),
            record: Record::new(),
            tables: BTreeMap::new(),
            last_check: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn template_type(&self) -> &str {
        &self.template_type
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn last_check(&self) -> Option<&CheckOutcome> {
        self.last_check.as_ref()
    }

    pub fn table_rows(&self, table: &str) -> &[TableRow] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn ensure_template(&self, template: &Template) -> Result<(), FormError> {
        if template.template_type == self.template_type {
            Ok(())
        } else {
            Err(FormError::TemplateMismatch {
                expected: self.template_type.clone(),
                found: template.template_type.clone(),
            })
        }
    }

    /// Recomputes every value the layout shows: autofill fields, defaults,
    /// radio corrections and table row sets.
    fn sync(&mut self, template: &Template, ctx: &FormContext) {
        for item in &template.layout {
            match item {
                LayoutItem::Field { key } => {
                    if let Some(field) = template.field(key) {
                        let value = self.derive_value(field, template, ctx);
                        self.record.insert(field.key.clone(), value);
                    }
                }
                LayoutItem::Table { key } => {
                    let rows = self.tables.entry(key.clone()).or_default().clone();
                    let rows = rows.into_iter().map(Value::Object).collect();
                    self.record.insert(key.clone(), Value::Array(rows));
                }
                LayoutItem::Subheader { .. } | LayoutItem::Divider => {}
            }
        }
    }

    fn derive_value(&self, field: &FieldDef, template: &Template, ctx: &FormContext) -> Value {
        let current = self.record.get(&field.key);
        match &field.kind {
            FieldKind::Autofill { .. } => match field.autofill_source() {
                Some(AutofillSource::Date) => {
                    Value::String(ctx.today.format("%Y-%m-%d").to_string())
                }
                Some(AutofillSource::Investigator) => Value::String(ctx.operator.clone()),
                Some(AutofillSource::Topic) => Value::String(template.name.clone()),
                None => current.cloned().unwrap_or(Value::Null),
            },
            FieldKind::Text | FieldKind::Textarea => match current {
                Some(Value::String(text)) => Value::String(text.clone()),
                _ => match &field.default {
                    Some(Value::String(text)) => Value::String(text.clone()),
                    Some(Value::Null) | None => Value::String(String::new()),
                    Some(other) => Value::String(other.to_string()),
                },
            },
            // A cleared number stays cleared; the default only fills an unset key.
            FieldKind::Number { .. } => match current {
                Some(Value::Number(n)) => Value::Number(n.clone()),
                Some(_) => Value::Null,
                None => match &field.default {
                    Some(Value::Number(n)) => Value::Number(n.clone()),
                    _ => Value::Null,
                },
            },
            FieldKind::Radio { options } => {
                let chosen = current
                    .or(field.default.as_ref())
                    .and_then(|v| v.as_str())
                    .filter(|v| options.iter().any(|o| o.as_str() == *v));
                match chosen.or_else(|| options.first().map(String::as_str)) {
                    Some(option) => Value::String(option.to_string()),
                    None => Value::Null,
                }
            }
        }
    }

    /// Brings the record up to date and returns the view of the form in
    /// layout order.
    pub fn render(
        &mut self,
        template: &Template,
        ctx: &FormContext,
        labels: &Labels,
    ) -> Result<RenderedForm, FormError> {
        self.ensure_template(template)?;
        self.sync(template, ctx);

        let mut items = Vec::with_capacity(template.layout.len());
        for item in &template.layout {
            match item {
                LayoutItem::Subheader { label_key } => items.push(RenderedItem::Subheader {
                    label: labels.resolve(Some(label_key.as_str()), label_key),
                }),
                LayoutItem::Divider => items.push(RenderedItem::Divider),
                LayoutItem::Field { key } => {
                    let Some(field) = template.field(key) else {
                        continue;
                    };
                    items.push(RenderedItem::Field(RenderedField {
                        key: field.key.clone(),
                        label: labels.resolve(field.label_key.as_deref(), &field.key),
                        kind: field.kind.clone(),
                        optional: field.optional,
                        editable: field.is_editable(),
                        value: self.record.get(&field.key).cloned().unwrap_or(Value::Null),
                        check: if field.key == KEY_FIELD {
                            self.last_check.clone()
                        } else {
                            None
                        },
                    }));
                }
                LayoutItem::Table { key } => {
                    let Some(table) = template.table(key) else {
                        continue;
                    };
                    items.push(RenderedItem::Table(RenderedTable {
                        key: table.key.clone(),
                        label: labels.resolve(table.label_key.as_deref(), &title_case(&table.key)),
                        columns: table.columns.clone(),
                        rows: self.table_rows(&table.key).to_vec(),
                    }));
                }
            }
        }

        Ok(RenderedForm {
            template_type: template.template_type.clone(),
            title: labels.resolve(
                Some(format!("{}_page_title", template.template_type).as_str()),
                &template.name,
            ),
            items,
        })
    }

    fn editable_field<'t>(&self, template: &'t Template, key: &str) -> Result<&'t FieldDef, FormError> {
        self.ensure_template(template)?;
        let field = template
            .field(key)
            .ok_or_else(|| FormError::UnknownField(key.to_string()))?;
        if !field.is_editable() {
            return Err(FormError::ReadOnly(key.to_string()));
        }
        Ok(field)
    }

    pub fn set_text(&mut self, template: &Template, key: &str, text: &str) -> Result<(), FormError> {
        let field = self.editable_field(template, key)?;
        match field.kind {
            FieldKind::Text | FieldKind::Textarea => {
                self.record.insert(key, Value::String(text.to_string()));
                Ok(())
            }
            _ => Err(FormError::WrongKind {
                key: key.to_string(),
                kind: field.kind.name(),
            }),
        }
    }

    pub fn set_number(
        &mut self,
        template: &Template,
        key: &str,
        value: Option<f64>,
    ) -> Result<(), FormError> {
        let field = self.editable_field(template, key)?;
        if !matches!(field.kind, FieldKind::Number { .. }) {
            return Err(FormError::WrongKind {
                key: key.to_string(),
                kind: field.kind.name(),
            });
        }
        let value = match value {
            None => Value::Null,
            Some(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| FormError::NotFinite(key.to_string()))?,
        };
        self.record.insert(key, value);
        Ok(())
    }

    pub fn select_option(
        &mut self,
        template: &Template,
        key: &str,
        option: &str,
    ) -> Result<(), FormError> {
        let field = self.editable_field(template, key)?;
        let FieldKind::Radio { options } = &field.kind else {
            return Err(FormError::WrongKind {
                key: key.to_string(),
                kind: field.kind.name(),
            });
        };
        if !options.iter().any(|o| o == option) {
            return Err(FormError::OptionNotAllowed {
                key: key.to_string(),
                value: option.to_string(),
            });
        }
        self.record.insert(key, Value::String(option.to_string()));
        Ok(())
    }

    fn table_def<'t>(&self, template: &'t Template, table: &str) -> Result<&'t TableDef, FormError> {
        self.ensure_template(template)?;
        template
            .table(table)
            .ok_or_else(|| FormError::UnknownTable(table.to_string()))
    }

    /// Appends an empty row and returns its index.
    pub fn add_row(&mut self, template: &Template, table: &str) -> Result<usize, FormError> {
        let def = self.table_def(template, table)?;
        let row: TableRow = def
            .columns
            .iter()
            .map(|c| (c.key.clone(), Value::Null))
            .collect();
        let rows = self.tables.entry(table.to_string()).or_default();
        rows.push(row);
        Ok(rows.len() - 1)
    }

    pub fn remove_row(
        &mut self,
        template: &Template,
        table: &str,
        index: usize,
    ) -> Result<TableRow, FormError> {
        self.table_def(template, table)?;
        let rows = self.tables.entry(table.to_string()).or_default();
        if index >= rows.len() {
            return Err(FormError::RowOutOfRange {
                table: table.to_string(),
                index,
                len: rows.len(),
            });
        }
        Ok(rows.remove(index))
    }

    pub fn set_cell(
        &mut self,
        template: &Template,
        table: &str,
        index: usize,
        column: &str,
        value: Value,
    ) -> Result<(), FormError> {
        let def = self.table_def(template, table)?;
        let column_def = def.column(column).ok_or_else(|| FormError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;
        match (&value, column_def.kind) {
            (Value::Null, _) if column_def.required => {
                return Err(FormError::RequiredCell {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
            (Value::Null, _)
            | (Value::Number(_), ColumnKind::Number)
            | (Value::String(_), ColumnKind::Text) => {}
            (_, ColumnKind::Number) => {
                return Err(FormError::CellType {
                    table: table.to_string(),
                    column: column.to_string(),
                    expected: "number",
                });
            }
            (_, ColumnKind::Text) => {
                return Err(FormError::CellType {
                    table: table.to_string(),
                    column: column.to_string(),
                    expected: "text",
                });
            }
        }

        let rows = self.tables.entry(table.to_string()).or_default();
        let len = rows.len();
        let row = rows.get_mut(index).ok_or_else(|| FormError::RowOutOfRange {
            table: table.to_string(),
            index,
            len,
        })?;
        row.insert(column.to_string(), value);
        Ok(())
    }

    /// Runs the uniqueness check for the current key and caches the outcome
    /// until the next check.
    pub async fn check_key<S: TabularStore>(
        &mut self,
        store: &S,
        template: &Template,
    ) -> Result<CheckOutcome, FormError> {
        self.ensure_template(template)?;
        let candidate = self.record.text(KEY_FIELD).unwrap_or_default();
        let outcome = gate::check(store, template.collection(), &candidate).await;
        self.last_check = Some(outcome.clone());
        Ok(outcome)
    }

    /// Writes the record with its then-current derived values. The in-memory
    /// record is kept for export either way.
    pub async fn submit<S: TabularStore>(
        &mut self,
        store: &S,
        template: &Template,
        ctx: &FormContext,
    ) -> Result<AppendOutcome, FormError> {
        self.ensure_template(template)?;
        self.sync(template, ctx);
        Ok(gate::append(store, template.collection(), &self.record).await)
    }

    /// Renders the in-memory record; returns the suggested file name too.
    pub async fn export<R: DocumentRenderer>(
        &self,
        template: &Template,
        renderer: &R,
    ) -> Result<(String, ExportedDocument)> {
        self.ensure_template(template)?;
        let document = to_document(&self.record, &template.name, renderer).await?;
        let file_name = document_file_name(&template.name, &self.record, renderer.extension());
        Ok((file_name, document))
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
