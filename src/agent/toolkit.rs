use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Uniform result envelope returned by every operation.
///
/// `message` is populated only for errors; `data` carries auxiliary
/// outputs and never signals failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ToolStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ToolResponse {
    pub fn success() -> Self {
        Self {
            status: ToolStatus::Success,
            message: String::new(),
            data: Map::new(),
        }
    }

    pub fn success_with(data: Map<String, Value>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: String::new(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            data: Map::new(),
        }
    }
}

/// A registered operation: a named capability with a declared parameter
/// schema and a uniform invocation contract.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the named parameters this operation accepts.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: &Value) -> Result<ToolResponse>;
}

/// LLM-facing function spec for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed, ordered set of operations built at startup. Never mutated
/// afterwards; lookup order is insertion order.
pub struct OperationRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl OperationRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        for tool in &tools {
            info!("Registered operation: {}", tool.name());
        }
        Self { tools }
    }

    pub fn list(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Invoke an operation, converting any internal error into an
    /// error-status response so no raw fault escapes the boundary.
    pub async fn safe_invoke(&self, tool: &Arc<dyn Tool>, args: &Value) -> ToolResponse {
        match tool.execute(args).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Operation '{}' failed: {}", tool.name(), err);
                ToolResponse::error(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::error::AgentError;

    struct TestTool {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl Tool for TestTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "A test operation"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "test_param": {"type": "string"}
                },
                "required": ["test_param"]
            })
        }

        async fn execute(&self, _args: &Value) -> Result<ToolResponse> {
            if self.fail {
                Err(AgentError::Model("boom".to_string()))
            } else {
                Ok(ToolResponse::success())
            }
        }
    }

    fn registry() -> OperationRegistry {
        OperationRegistry::new(vec![
            Arc::new(TestTool {
                name: "first".to_string(),
                fail: false,
            }),
            Arc::new(TestTool {
                name: "second".to_string(),
                fail: true,
            }),
        ])
    }

    #[test]
    fn find_returns_registered_operations() {
        let registry = registry();
        for tool in registry.list() {
            let found = registry.find(tool.name()).expect("registered");
            assert_eq!(found.name(), tool.name());
        }
        assert!(registry.find("nonexistent").is_none());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let registry = registry();
        let names: Vec<&str> = registry.list().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn safe_invoke_converts_errors_to_responses() {
        let registry = registry();
        let failing = registry.find("second").unwrap().clone();
        let response = registry
            .safe_invoke(&failing, &serde_json::json!({}))
            .await;
        assert_eq!(response.status, ToolStatus::Error);
        assert!(!response.message.is_empty());
    }
}
