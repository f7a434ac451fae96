//! Answer generation: prompt templating and LLM completion

mod generator;
mod prompt;

pub use generator::Generator;
pub use prompt::{PromptBuilder, DOCUMENTS_VARIABLE};
