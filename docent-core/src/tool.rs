//! The callable tool contract.
//!
//! Tools are registered explicitly at startup (no runtime discovery) and are
//! routed to by the embedding classifier. The solver hands the selected tool
//! to the model layer, which invokes it with JSON arguments.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ToolError;

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// Example user utterances this tool should answer; the classifier embeds
    /// them together with the description.
    fn examples(&self) -> Vec<String> {
        Vec::new()
    }

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// Execute the tool with the given arguments.
    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Text the classifier embeds for a tool: the description followed by its
/// example utterances.
pub fn embedding_text(tool: &dyn Tool) -> String {
    let mut text = tool.description().to_string();
    let examples = tool.examples();
    if !examples.is_empty() {
        text.push_str("\nExample queries:\n");
        for example in &examples {
            text.push_str("- ");
            text.push_str(example);
            text.push('\n');
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the input text back"
        }

        fn examples(&self) -> Vec<String> {
            vec!["repeat after me".into()]
        }

        async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
            Ok(args
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string())
        }
    }

    #[tokio::test]
    async fn test_invoke() {
        let tool = EchoTool;
        let out = tool
            .invoke(serde_json::json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_embedding_text_includes_examples() {
        let text = embedding_text(&EchoTool);
        assert!(text.starts_with("Echoes the input text back"));
        assert!(text.contains("Example queries:"));
        assert!(text.contains("- repeat after me"));
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(EchoTool.timeout(), Duration::from_secs(30));
    }
}
