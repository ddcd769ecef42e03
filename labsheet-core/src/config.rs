use crate::error::ConfigError;
use crate::template::{validate_templates, Template};
use anyhow::{Context, Result};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Value shipped in sample configs before a real store is chosen.
pub const PLACEHOLDER_STORE_TARGET: &str = "YOUR_GOOGLE_SHEET_URL_HERE";

/// Display texts keyed by `label_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(HashMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.0.insert(key.into(), text.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn resolve(&self, key: Option<&str>, fallback: &str) -> String {
        key.and_then(|k| self.get(k))
            .unwrap_or(fallback)
            .to_string()
    }
}

/// The configuration document: store target, operator roster and the
/// template catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, alias = "google_sheet_url")]
    pub store_uri: String,
    #[serde(default)]
    pub experimenters: Vec<String>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub store_uri: Option<String>,
    /// One operator per line.
    pub experimenters: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".yaml") || path.ends_with(".yml") {
            ConfigFormat::Yaml
        } else {
            ConfigFormat::Json
        }
    }
}

impl AppConfig {
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: AppConfig = match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_templates(&self.templates)
    }

    pub async fn load(op: &Operator, path: &str) -> Result<Self> {
        let bytes = op
            .read(path)
            .await
            .with_context(|| format!("Config {} not found", path))?;
        let content = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("Config {} is not UTF-8", path))?;
        let config = Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Invalid config {}", path))?;
        tracing::debug!(path, templates = config.templates.len(), "loaded configuration");
        Ok(config)
    }

    pub async fn save(&self, op: &Operator, path: &str) -> Result<()> {
        self.validate()?;
        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_vec_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?.into_bytes(),
        };
        op.write(path, content).await?;
        tracing::info!(path, "saved configuration");
        Ok(())
    }

    pub fn template(&self, template_type: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.template_type == template_type)
    }

    /// The configured store URI, rejected when unset or left at the placeholder.
    pub fn store_target(&self) -> Result<&str, ConfigError> {
        let target = self.store_uri.trim();
        if target.is_empty() {
            return Err(ConfigError::StoreTargetMissing);
        }
        if target.contains(PLACEHOLDER_STORE_TARGET) {
            return Err(ConfigError::InvalidStoreTarget {
                target: target.to_string(),
                reason: "placeholder value".to_string(),
            });
        }
        Url::parse(target).map_err(|e| ConfigError::InvalidStoreTarget {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
        Ok(target)
    }

    /// First configured operator, used until the session picks another.
    pub fn default_operator(&self) -> Option<&str> {
        self.experimenters.first().map(String::as_str)
    }

    pub fn apply_settings(&mut self, update: SettingsUpdate) {
        if let Some(text) = update.experimenters {
            self.experimenters = text
                .lines()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(uri) = update.store_uri {
            self.store_uri = uri.trim().to_string();
        }
    }
}
