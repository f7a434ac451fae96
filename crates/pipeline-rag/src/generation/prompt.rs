//! Prompt construction from a handlebars template

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{Map, Value};

use crate::config::PromptConfig;
use crate::error::{Error, Result};
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};

const TEMPLATE_NAME: &str = "prompt";

/// The template variable that receives retrieved documents
pub const DOCUMENTS_VARIABLE: &str = "documents";

/// Renders the configured template. `documents` is bound to a list of documents,
/// every other variable to a string.
pub struct PromptBuilder {
    registry: Handlebars<'static>,
    variables: Vec<String>,
    required_variables: Vec<String>,
}

impl PromptBuilder {
    /// Compile the template; fails on syntax errors or unknown required variables
    pub fn new(config: &PromptConfig) -> Result<Self> {
        for required in &config.required_variables {
            if !config.variables.contains(required) {
                return Err(Error::config(format!(
                    "prompt.required_variables lists '{}' which is not in prompt.variables",
                    required
                )));
            }
        }

        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, &config.template)
            .map_err(|e| Error::Template(e.to_string()))?;

        Ok(Self {
            registry,
            variables: config.variables.clone(),
            required_variables: config.required_variables.clone(),
        })
    }

    /// Whether the template takes `name` as an input
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    fn port_type(variable: &str) -> PortType {
        if variable == DOCUMENTS_VARIABLE {
            PortType::Documents
        } else {
            PortType::Text
        }
    }

    /// Render with an explicit variable map
    pub fn render(&self, context: &Map<String, Value>) -> Result<String> {
        for required in &self.required_variables {
            if !context.contains_key(required) {
                return Err(Error::Template(format!(
                    "missing required variable '{}'",
                    required
                )));
            }
        }
        self.registry
            .render(TEMPLATE_NAME, context)
            .map_err(|e| Error::Template(e.to_string()))
    }
}

#[async_trait]
impl Stage for PromptBuilder {
    fn type_name(&self) -> &'static str {
        "PromptBuilder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        self.variables
            .iter()
            .map(|name| {
                let port_type = Self::port_type(name);
                if self.required_variables.contains(name) {
                    PortSpec::required(name.as_str(), port_type)
                } else {
                    PortSpec::optional(name.as_str(), port_type)
                }
            })
            .collect()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("prompt", PortType::Text)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let mut context = Map::new();
        for name in &self.variables {
            if !inputs.contains(name) {
                continue;
            }
            let value = if name == DOCUMENTS_VARIABLE {
                serde_json::to_value(inputs.take_documents(name)?)?
            } else {
                Value::String(inputs.take_text(name)?)
            };
            context.insert(name.clone(), value);
        }

        let prompt = self.render(&context)?;
        tracing::debug!("Built prompt ({} chars)", prompt.len());
        Ok(PortValues::new().with("prompt", PortValue::Text(prompt)))
    }
}
