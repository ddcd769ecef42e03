use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Declarative description of one record type.
///
/// `template_type` doubles as the page route and the name of the collection
/// the records are written to, so it has to be unique across the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "type")]
    pub template_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label_key: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub layout: Vec<LayoutItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Autofill {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<AutofillSource>,
    },
    Text,
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Textarea,
    Radio {
        options: Vec<String>,
    },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Autofill { .. } => "autofill",
            FieldKind::Text => "text",
            FieldKind::Number { .. } => "number",
            FieldKind::Textarea => "textarea",
            FieldKind::Radio { .. } => "radio",
        }
    }
}

/// Where an autofill field takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutofillSource {
    /// Today's date, `YYYY-MM-DD`.
    Date,
    /// The operator selected for the session.
    Investigator,
    /// The template's display name.
    Topic,
}

impl AutofillSource {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "date" => Some(AutofillSource::Date),
            "investigator" => Some(AutofillSource::Investigator),
            "topic" => Some(AutofillSource::Topic),
            _ => None,
        }
    }
}

impl FieldDef {
    /// Explicit `source`, else inferred from the well-known keys.
    pub fn autofill_source(&self) -> Option<AutofillSource> {
        match &self.kind {
            FieldKind::Autofill { source } => source.or_else(|| AutofillSource::from_key(&self.key)),
            _ => None,
        }
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self.kind, FieldKind::Autofill { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, key: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutItem {
    Subheader { label_key: String },
    Divider,
    Field { key: String },
    Table { key: String },
}

impl Template {
    pub fn field(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn table(&self, key: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.key == key)
    }

    /// Collection identifier in the tabular store.
    pub fn collection(&self) -> &str {
        &self.template_type
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.template_type)?;

        let mut keys = HashSet::new();
        for field in &self.fields {
            if !keys.insert(field.key.as_str()) {
                return Err(self.duplicate_key(&field.key));
            }
            match &field.kind {
                FieldKind::Radio { options } if options.is_empty() => {
                    return Err(ConfigError::RadioWithoutOptions {
                        template: self.template_type.clone(),
                        key: field.key.clone(),
                    });
                }
                FieldKind::Autofill { .. } if field.autofill_source().is_none() => {
                    return Err(ConfigError::UnknownAutofillSource {
                        template: self.template_type.clone(),
                        key: field.key.clone(),
                    });
                }
                _ => {}
            }
        }

        for table in &self.tables {
            if !keys.insert(table.key.as_str()) {
                return Err(self.duplicate_key(&table.key));
            }
            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.key.as_str()) {
                    return Err(ConfigError::DuplicateColumn {
                        template: self.template_type.clone(),
                        table: table.key.clone(),
                        column: column.key.clone(),
                    });
                }
            }
        }

        for item in &self.layout {
            match item {
                LayoutItem::Field { key } if self.field(key).is_none() => {
                    return Err(self.unknown_reference("field", key));
                }
                LayoutItem::Table { key } if self.table(key).is_none() => {
                    return Err(self.unknown_reference("table", key));
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn duplicate_key(&self, key: &str) -> ConfigError {
        ConfigError::DuplicateKey {
            template: self.template_type.clone(),
            key: key.to_string(),
        }
    }

    fn unknown_reference(&self, kind: &'static str, key: &str) -> ConfigError {
        ConfigError::UnknownLayoutReference {
            template: self.template_type.clone(),
            kind,
            key: key.to_string(),
        }
    }
}

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier regex must compile")
    })
}

pub fn validate_identifier(value: &str) -> Result<(), ConfigError> {
    if identifier_regex().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(value.to_string()))
    }
}

/// Validates every template and the uniqueness of their types.
pub fn validate_templates(templates: &[Template]) -> Result<(), ConfigError> {
    let mut types = HashSet::new();
    for template in templates {
        template.validate()?;
        if !types.insert(template.template_type.as_str()) {
            return Err(ConfigError::DuplicateTemplateType(
                template.template_type.clone(),
            ));
        }
    }
    Ok(())
}
