use crate::export::DocumentRenderer;
use anyhow::{Context, Result};
use handlebars::Handlebars;
use opendal::{ErrorKind, Operator};
use serde_json::{Map, Value};

/// Renders `template_<name>.hbs` sources read through an operator.
///
/// Table fields reach the template as arrays of row objects, so
/// `{{#each cathode_table}}{{material}}{{/each}}` iterates them.
pub struct HandlebarsRenderer {
    op: Operator,
    root: String,
    extension: String,
}

impl HandlebarsRenderer {
    pub fn new(op: Operator, root: &str) -> Self {
        Self {
            op,
            root: root.trim_end_matches('/').to_string(),
            extension: "md".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn template_path(&self, template_name: &str) -> String {
        let file = format!("template_{}.hbs", template_name);
        if self.root.is_empty() {
            file
        } else {
            format!("{}/{}", self.root, file)
        }
    }
}

impl DocumentRenderer for HandlebarsRenderer {
    fn extension(&self) -> &str {
        &self.extension
    }

    async fn render(
        &self,
        template_name: &str,
        context: &Map<String, Value>,
    ) -> Result<Option<Vec<u8>>> {
        let path = self.template_path(template_name);
        let source = match self.op.read(&path).await {
            Ok(bytes) => String::from_utf8(bytes.to_vec())
                .with_context(|| format!("document template {} is not UTF-8", path))?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(format!("failed to read document template {}", path)),
        };

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        let rendered = registry
            .render_template(&source, context)
            .with_context(|| format!("failed to render document template {}", path))?;
        Ok(Some(rendered.into_bytes()))
    }
}
