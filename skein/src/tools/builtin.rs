//! Built-in tools registered by the CLI.

use chrono::Utc;
use serde_json::json;

use crate::message::Tool;
use crate::tools::{tool_fn, ToolError, ToolHandler, ToolOutput, ToolRegistry};

/// Name of the clock tool.
pub const TOOL_CURRENT_TIME: &str = "current_time";

/// Definition and handler for the clock tool.
///
/// Arguments: `{"format": "<chrono strftime>"}`, optional; defaults to
/// RFC 3339.
pub fn current_time_tool() -> (Tool, ToolHandler) {
    let definition = Tool::new(TOOL_CURRENT_TIME)
        .with_description("Returns the current UTC time")
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime format; RFC 3339 when omitted"
                }
            }
        }));
    let handler = tool_fn(|args| async move {
        use std::fmt::Write;

        let now = Utc::now();
        let text = match args.get("format").and_then(|v| v.as_str()) {
            Some(format) => {
                let mut text = String::new();
                // An invalid strftime spec fails at render time.
                if write!(text, "{}", now.format(format)).is_err() {
                    return Ok(ToolOutput::error(format!("invalid time format: {format}")));
                }
                text
            }
            None => now.to_rfc3339(),
        };
        Ok(ToolOutput::ok(text))
    });
    (definition, handler)
}

/// Registers every built-in tool.
pub async fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), ToolError> {
    let (definition, handler) = current_time_tool();
    registry.register(definition, handler).await
}
