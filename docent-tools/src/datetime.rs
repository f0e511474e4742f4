//! Current date/time tool.

use async_trait::async_trait;
use chrono::{Local, SecondsFormat};
use serde_json::Value;

use docent_core::error::ToolError;
use docent_core::tool::Tool;

/// Returns the current date and time in ISO 8601.
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Returns the current date and time in ISO 8601 format"
    }

    fn examples(&self) -> Vec<String> {
        vec![
            "what time is it now".into(),
            "what is today's date".into(),
            "какое сегодня число".into(),
        ]
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        Ok(Local::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
