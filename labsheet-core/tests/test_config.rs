mod common;
use common::{sample_config, setup_operator, SAMPLE_CONFIG};
use labsheet_core::config::{ConfigFormat, SettingsUpdate, PLACEHOLDER_STORE_TARGET};
use labsheet_core::{AppConfig, ConfigError, Labels};

#[test]
fn test_config_parses_legacy_store_key_and_catalog() -> anyhow::Result<()> {
    let config = sample_config()?;
    assert_eq!(config.store_uri, "memory://labsheet-tests");
    assert_eq!(config.experimenters, vec!["Alice", "Bob"]);
    assert_eq!(config.default_operator(), Some("Alice"));
    assert_eq!(config.templates.len(), 2);
    assert!(config.template("synthesis").is_some());
    assert!(config.template("unknown").is_none());
    assert_eq!(config.labels.get("lbl_exp_code"), Some("Experiment code"));
    Ok(())
}

#[test]
fn test_config_store_target_validation() -> anyhow::Result<()> {
    let mut config = sample_config()?;
    assert_eq!(config.store_target()?, "memory://labsheet-tests");

    config.store_uri = "   ".to_string();
    assert_eq!(config.store_target(), Err(ConfigError::StoreTargetMissing));

    config.store_uri = PLACEHOLDER_STORE_TARGET.to_string();
    assert!(matches!(
        config.store_target(),
        Err(ConfigError::InvalidStoreTarget { reason, .. }) if reason == "placeholder value"
    ));

    config.store_uri = "not a uri".to_string();
    assert!(matches!(
        config.store_target(),
        Err(ConfigError::InvalidStoreTarget { .. })
    ));
    Ok(())
}

#[test]
fn test_config_parse_rejects_invalid_catalog() {
    let broken = SAMPLE_CONFIG.replace(r#""type": "synthesis""#, r#""type": "electrochem""#);
    assert_eq!(
        AppConfig::parse(&broken, ConfigFormat::Json),
        Err(ConfigError::DuplicateTemplateType("electrochem".to_string()))
    );
    assert!(matches!(
        AppConfig::parse("{not json", ConfigFormat::Json),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_config_apply_settings_trims_roster_lines() -> anyhow::Result<()> {
    let mut config = sample_config()?;
    config.apply_settings(SettingsUpdate {
        store_uri: Some("  memory://other  ".to_string()),
        experimenters: Some("  Carol \n\n Dave\n   \n".to_string()),
    });
    assert_eq!(config.experimenters, vec!["Carol", "Dave"]);
    assert_eq!(config.store_uri, "memory://other");

    config.apply_settings(SettingsUpdate::default());
    assert_eq!(config.experimenters, vec!["Carol", "Dave"]);
    Ok(())
}

#[test]
fn test_config_labels_fall_back() {
    let mut labels = Labels::new();
    labels.insert("lbl_weight", "Weight (mg)");
    assert_eq!(labels.resolve(Some("lbl_weight"), "weight"), "Weight (mg)");
    assert_eq!(labels.resolve(Some("lbl_missing"), "weight"), "weight");
    assert_eq!(labels.resolve(None, "weight"), "weight");
}

#[tokio::test]
async fn test_config_save_and_load_json_and_yaml() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let mut config = sample_config()?;
    config.experimenters.push("Carol".to_string());

    config.save(&op, "config.json").await?;
    assert_eq!(AppConfig::load(&op, "config.json").await?, config);

    config.save(&op, "config.yaml").await?;
    let from_yaml = AppConfig::load(&op, "config.yaml").await?;
    assert_eq!(from_yaml, config);
    assert_eq!(ConfigFormat::from_path("config.yml"), ConfigFormat::Yaml);

    assert!(AppConfig::load(&op, "absent.json").await.is_err());
    Ok(())
}
