use serde::{Deserialize, Serialize};

/// Vendor-neutral definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON Schema object for the function parameters
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back with the tool result
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments as a raw JSON string, returned as received
    pub arguments: String,
}

impl ToolCall {
    /// Parse the arguments as JSON
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model must call at least one tool
    Required,
    /// Model will not call any tools
    None,
    /// Model must call the named tool
    Tool {
        /// Name of the tool to call
        name: String,
    },
}
