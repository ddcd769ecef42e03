mod common;
use common::sample_template;
use labsheet_core::template::{
    validate_identifier, validate_templates, AutofillSource, ColumnKind, FieldKind, LayoutItem,
};
use labsheet_core::{ConfigError, Template};
use serde_json::json;

fn parse(value: serde_json::Value) -> anyhow::Result<Template> {
    Ok(serde_json::from_value(value)?)
}

#[test]
fn test_template_parses_field_kinds_and_tables() -> anyhow::Result<()> {
    let template = sample_template()?;
    assert_eq!(template.collection(), "electrochem");
    assert_eq!(template.name, "Electrochemical_Testing");

    let voltage = template.field("voltage").expect("voltage field");
    assert_eq!(
        voltage.kind,
        FieldKind::Number {
            format: Some("%.2f".to_string()),
            step: Some(0.01)
        }
    );
    assert!(voltage.is_editable());

    let date = template.field("date").expect("date field");
    assert!(!date.is_editable());
    assert_eq!(date.autofill_source(), Some(AutofillSource::Date));

    let note = template.field("note").expect("note field");
    assert!(note.optional);
    assert_eq!(note.default, Some(json!("n/a")));

    let table = template.table("cathode_table").expect("cathode table");
    let material = table.column("material").expect("material column");
    assert_eq!(material.kind, ColumnKind::Text);
    assert!(material.required);
    assert_eq!(table.column("weight").map(|c| c.kind), Some(ColumnKind::Number));

    assert_eq!(template.layout.first(), Some(&LayoutItem::Subheader {
        label_key: "sub_general".to_string()
    }));
    assert!(template.layout.contains(&LayoutItem::Divider));
    template.validate()?;
    Ok(())
}

#[test]
fn test_template_explicit_autofill_source_overrides_key() -> anyhow::Result<()> {
    let template = parse(json!({
        "type": "synthesis",
        "name": "Synthesis",
        "fields": [{"key": "run_date", "type": "autofill", "source": "date"}],
        "layout": [{"type": "field", "key": "run_date"}]
    }))?;
    let field = template.field("run_date").expect("run_date field");
    assert_eq!(field.autofill_source(), Some(AutofillSource::Date));
    template.validate()?;
    Ok(())
}

#[test]
fn test_template_validation_errors() -> anyhow::Result<()> {
    let bad_type = parse(json!({"type": "electro chem", "name": "E"}))?;
    assert_eq!(
        bad_type.validate(),
        Err(ConfigError::InvalidIdentifier("electro chem".to_string()))
    );

    let duplicate_key = parse(json!({
        "type": "electrochem",
        "name": "E",
        "fields": [{"key": "notes", "type": "text"}],
        "tables": [{"key": "notes", "columns": []}]
    }))?;
    assert!(matches!(
        duplicate_key.validate(),
        Err(ConfigError::DuplicateKey { key, .. }) if key == "notes"
    ));

    let no_options = parse(json!({
        "type": "electrochem",
        "name": "E",
        "fields": [{"key": "cell_type", "type": "radio", "options": []}]
    }))?;
    assert!(matches!(
        no_options.validate(),
        Err(ConfigError::RadioWithoutOptions { .. })
    ));

    let unknown_autofill = parse(json!({
        "type": "electrochem",
        "name": "E",
        "fields": [{"key": "batch", "type": "autofill"}]
    }))?;
    assert!(matches!(
        unknown_autofill.validate(),
        Err(ConfigError::UnknownAutofillSource { .. })
    ));

    let duplicate_column = parse(json!({
        "type": "electrochem",
        "name": "E",
        "tables": [{"key": "t", "columns": [
            {"key": "a", "type": "text"},
            {"key": "a", "type": "number"}
        ]}]
    }))?;
    assert!(matches!(
        duplicate_column.validate(),
        Err(ConfigError::DuplicateColumn { column, .. }) if column == "a"
    ));

    let dangling = parse(json!({
        "type": "electrochem",
        "name": "E",
        "layout": [{"type": "table", "key": "anode_table"}]
    }))?;
    assert_eq!(
        dangling.validate(),
        Err(ConfigError::UnknownLayoutReference {
            template: "electrochem".to_string(),
            kind: "table",
            key: "anode_table".to_string(),
        })
    );
    Ok(())
}

#[test]
fn test_template_unknown_field_type_is_rejected() {
    let result = parse(json!({
        "type": "electrochem",
        "name": "E",
        "fields": [{"key": "photo", "type": "image"}]
    }));
    assert!(result.is_err());
}

#[test]
fn test_template_catalog_rejects_duplicate_types() -> anyhow::Result<()> {
    let template = sample_template()?;
    let result = validate_templates(&[template.clone(), template]);
    assert_eq!(
        result,
        Err(ConfigError::DuplicateTemplateType("electrochem".to_string()))
    );
    assert!(validate_identifier("cycle-test_2").is_ok());
    assert!(validate_identifier("").is_err());
    Ok(())
}
