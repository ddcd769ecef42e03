use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::form::{FormContext, FormSession};
use crate::template::Template;
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

/// State of one signed-in user: the selected operator and the forms they
/// have open, one per template type.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    operator: Option<String>,
    forms: HashMap<String, FormSession>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            operator: None,
            forms: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn select_operator(&mut self, config: &AppConfig, name: &str) -> Result<(), ConfigError> {
        if !config.experimenters.iter().any(|e| e == name) {
            return Err(ConfigError::UnknownOperator(name.to_string()));
        }
        self.operator = Some(name.to_string());
        Ok(())
    }

    /// Selected operator, else the first one configured, else empty.
    pub fn operator<'a>(&'a self, config: &'a AppConfig) -> &'a str {
        self.operator
            .as_deref()
            .or_else(|| config.default_operator())
            .unwrap_or("")
    }

    pub fn context(&self, config: &AppConfig, today: NaiveDate) -> FormContext {
        FormContext::new(today, self.operator(config))
    }

    /// Form for `template`, created empty on first open.
    pub fn open_form(&mut self, template: &Template) -> &mut FormSession {
        self.forms
            .entry(template.template_type.clone())
            .or_insert_with(|| FormSession::new(template))
    }

    pub fn form(&self, template_type: &str) -> Option<&FormSession> {
        self.forms.get(template_type)
    }

    pub fn form_mut(&mut self, template_type: &str) -> Option<&mut FormSession> {
        self.forms.get_mut(template_type)
    }

    /// Discards the in-progress form, as when the user navigates away.
    pub fn close_form(&mut self, template_type: &str) -> Option<FormSession> {
        self.forms.remove(template_type)
    }

    pub fn open_forms(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }
}
