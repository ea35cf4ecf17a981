//! Template transformer.
//!
//! Config: `{"template": "..."}`. Placeholders: `{content}`, `{author}`,
//! `{curator}`, `{note}`, `{id}`. Defaults to `{content}`.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::distribution::plugin::Transformer;
use crate::error::PluginError;
use crate::pipeline::types::Submission;

const DEFAULT_TEMPLATE: &str = "{content}";

pub struct TemplateTransformer {
    template: RwLock<String>,
}

impl TemplateTransformer {
    pub fn new() -> Self {
        Self {
            template: RwLock::new(DEFAULT_TEMPLATE.to_string()),
        }
    }

    fn render(template: &str, submission: &Submission) -> String {
        template
            .replace("{content}", &submission.content)
            .replace("{author}", &submission.author_handle)
            .replace("{curator}", &submission.curator_handle)
            .replace("{note}", submission.curator_note.as_deref().unwrap_or(""))
            .replace("{id}", &submission.id.to_string())
    }

    fn poisoned(&self) -> PluginError {
        PluginError::TransformFailed {
            name: self.name().to_string(),
            reason: "template lock poisoned".into(),
        }
    }
}

impl Default for TemplateTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transformer for TemplateTransformer {
    fn name(&self) -> &str {
        "template-transform"
    }

    async fn initialize(&self, config: &serde_json::Value) -> Result<(), PluginError> {
        let template = match config.get("template") {
            None | Some(serde_json::Value::Null) => DEFAULT_TEMPLATE.to_string(),
            Some(serde_json::Value::String(t)) if !t.trim().is_empty() => t.clone(),
            Some(other) => {
                return Err(PluginError::InitFailed {
                    name: self.name().to_string(),
                    reason: format!("`template` must be a non-empty string, got {other}"),
                });
            }
        };
        *self.template.write().map_err(|_| self.poisoned())? = template;
        Ok(())
    }

    async fn transform(&self, submission: &Submission) -> Result<String, PluginError> {
        let template = self.template.read().map_err(|_| self.poisoned())?.clone();
        Ok(Self::render(&template, submission))
    }
}
