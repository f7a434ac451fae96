//! LLM completion stage

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::providers::LlmProvider;

/// Sends the rendered prompt to the configured LLM
pub struct Generator {
    llm: Arc<dyn LlmProvider>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for Generator {
    fn type_name(&self) -> &'static str {
        "Generator"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("prompt", PortType::Text)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::required("replies", PortType::Replies),
            PortSpec::required("meta", PortType::Json),
        ]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let prompt = inputs.take_text("prompt")?;
        let generation = self.llm.generate(&prompt).await?;

        if generation.replies.is_empty() {
            tracing::warn!("{} ({}) returned no replies", self.llm.name(), self.llm.model());
        }

        Ok(PortValues::new()
            .with("replies", PortValue::Replies(generation.replies))
            .with("meta", PortValue::Json(serde_json::Value::Array(generation.meta))))
    }
}
