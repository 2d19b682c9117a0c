use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::error::{AgentError, Result};
use super::inference::LanguageModel;
use super::toolkit::{OperationRegistry, ToolResponse};

const CLASSIFIER_PROMPT: &str =
    "You are a function classifier that extracts structured parameters from queries.";

/// Maps a free-text instruction to one registered operation via LLM
/// classification and invokes it.
pub struct Dispatcher {
    model: Arc<dyn LanguageModel>,
    registry: Arc<OperationRegistry>,
}

impl Dispatcher {
    pub fn new(model: Arc<dyn LanguageModel>, registry: Arc<OperationRegistry>) -> Self {
        Self { model, registry }
    }

    pub async fn dispatch(&self, instruction: &str) -> Result<ToolResponse> {
        info!("Classifying task: {}", instruction);

        let specs = self.registry.specs();
        let classification = self
            .model
            .classify(CLASSIFIER_PROMPT, instruction, &specs)
            .await?;

        let action = classification
            .action
            .ok_or(AgentError::Classification(classification.raw_text))?;

        let tool = self
            .registry
            .find(&action.name)
            .ok_or_else(|| {
                AgentError::Dispatch(format!(
                    "classifier selected unknown operation '{}'",
                    action.name
                ))
            })?
            .clone();

        let args: Value = serde_json::from_str(&action.arguments)
            .map_err(|e| AgentError::InvalidArguments(e.to_string()))?;

        info!("Calling operation {} with arguments {}", tool.name(), args);
        let response = self.registry.safe_invoke(&tool, &args).await;
        info!(
            "Operation {} finished with status {:?}",
            tool.name(),
            response.status
        );
        Ok(response)
    }
}
