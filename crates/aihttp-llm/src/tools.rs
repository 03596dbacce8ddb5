//! Tool definitions and tool calls between the unified and vendor shapes

use aihttp_config::ProviderKind;
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicResponse, AnthropicResponseBlock, AnthropicTool, AnthropicToolChoice};
use crate::protocol::gemini::{
    GeminiCandidate, GeminiFunctionCallingConfig, GeminiFunctionDeclaration, GeminiResponse, GeminiTool,
    GeminiToolConfig,
};
use crate::protocol::openai::{OpenAiFunction, OpenAiResponse, OpenAiTool, OpenAiToolCall};
use crate::types::{ToolCall, ToolCallDelta, ToolChoice, ToolDefinition};

/// Render a tool definition in a vendor's request shape
pub fn to_provider_format(tool: &ToolDefinition, kind: ProviderKind) -> Value {
    let rendered = match kind {
        ProviderKind::Openai | ProviderKind::Grok | ProviderKind::Openrouter => serde_json::to_value(openai_tool(tool)),
        ProviderKind::Anthropic => serde_json::to_value(anthropic_tool(tool)),
        ProviderKind::Gemini => serde_json::to_value(GeminiTool {
            function_declarations: vec![gemini_declaration(tool)],
        }),
    };

    // Every field is a string or an already-valid JSON value
    rendered.unwrap_or(Value::Null)
}

/// Pull tool calls out of a raw non-streaming vendor response
pub fn extract_tool_calls(raw: &Value, kind: ProviderKind) -> Result<Vec<ToolCall>, LlmError> {
    let provider = kind.as_str();
    match kind {
        ProviderKind::Openai | ProviderKind::Grok | ProviderKind::Openrouter => {
            let response: OpenAiResponse =
                serde_json::from_value(raw.clone()).map_err(|e| LlmError::parse(provider, e))?;
            Ok(response
                .choices
                .first()
                .and_then(|c| c.message.tool_calls.as_deref())
                .map(openai_calls)
                .unwrap_or_default())
        }
        ProviderKind::Anthropic => {
            let response: AnthropicResponse =
                serde_json::from_value(raw.clone()).map_err(|e| LlmError::parse(provider, e))?;
            Ok(anthropic_calls(&response.content))
        }
        ProviderKind::Gemini => {
            let response: GeminiResponse =
                serde_json::from_value(raw.clone()).map_err(|e| LlmError::parse(provider, e))?;
            Ok(response.candidates.first().map(gemini_calls).unwrap_or_default())
        }
    }
}

pub(crate) fn openai_tool(tool: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        tool_type: "function".to_owned(),
        function: OpenAiFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

pub(crate) fn anthropic_tool(tool: &ToolDefinition) -> AnthropicTool {
    AnthropicTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

pub(crate) fn gemini_declaration(tool: &ToolDefinition) -> GeminiFunctionDeclaration {
    GeminiFunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: gemini_parameters(&tool.parameters),
    }
}

/// Gemini only accepts an object schema with `type`, `properties` and `required`
fn gemini_parameters(schema: &Value) -> Value {
    let properties = schema.get("properties").cloned().unwrap_or_else(|| json!({}));
    let required = schema
        .get("required")
        .filter(|r| r.is_array())
        .cloned()
        .unwrap_or_else(|| json!([]));

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub(crate) fn openai_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Required => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({ "type": "function", "function": { "name": name } }),
    }
}

/// `None` means tools must be omitted from the request entirely
pub(crate) fn anthropic_tool_choice(choice: &ToolChoice) -> Option<AnthropicToolChoice> {
    let (choice_type, name) = match choice {
        ToolChoice::None => return None,
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Tool { name } => ("tool", Some(name.clone())),
    };

    Some(AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    })
}

pub(crate) fn gemini_tool_config(choice: &ToolChoice) -> GeminiToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Tool { name } => ("ANY", Some(vec![name.clone()])),
    };

    GeminiToolConfig {
        function_calling_config: GeminiFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names,
        },
    }
}

pub(crate) fn openai_calls(calls: &[OpenAiToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .map(|call| ToolCall {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        })
        .collect()
}

pub(crate) fn anthropic_calls(blocks: &[AnthropicResponseBlock]) -> Vec<ToolCall> {
    blocks
        .iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: encode_arguments(input),
            }),
            _ => None,
        })
        .collect()
}

/// Call ids are optional in Gemini responses; positions stand in when absent
pub(crate) fn gemini_calls(candidate: &GeminiCandidate) -> Vec<ToolCall> {
    candidate
        .content
        .parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: call.id.clone().unwrap_or_else(|| format!("call_{index}")),
            name: call.name.clone(),
            arguments: encode_arguments(&call.args),
        })
        .collect()
}

/// Serialize structured tool input back to the raw JSON string form
pub(crate) fn encode_arguments(input: &Value) -> String {
    match input {
        Value::Null => "{}".to_owned(),
        other => other.to_string(),
    }
}

/// Reassembles streamed tool call fragments
///
/// Fragments join on call id when one is known and on index otherwise.
/// Argument text is concatenated verbatim and never validated, so invalid
/// JSON at the end of a stream is returned as received.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PartialCall>,
}

#[derive(Debug)]
struct PartialCall {
    index: u32,
    id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the matching call
    pub fn push(&mut self, delta: &ToolCallDelta) {
        let position = match &delta.id {
            Some(id) => self
                .calls
                .iter()
                .position(|c| c.id.as_deref() == Some(id))
                .or_else(|| self.calls.iter().position(|c| c.index == delta.index && c.id.is_none())),
            None => self.calls.iter().rposition(|c| c.index == delta.index),
        };

        let call = match position {
            Some(position) => &mut self.calls[position],
            None => {
                self.calls.push(PartialCall {
                    index: delta.index,
                    id: None,
                    name: String::new(),
                    arguments: String::new(),
                });
                let last = self.calls.len() - 1;
                &mut self.calls[last]
            }
        };

        if call.id.is_none() {
            call.id.clone_from(&delta.id);
        }
        if let Some(name) = &delta.name
            && call.name.is_empty()
        {
            call.name.clone_from(name);
        }
        call.arguments.push_str(&delta.arguments);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in first-seen order
    ///
    /// A call that never received argument text gets `{}`.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", call.index)),
                name: call.name,
                arguments: if call.arguments.is_empty() {
                    "{}".to_owned()
                } else {
                    call.arguments
                },
            })
            .collect()
    }
}

/// Named tool definitions a client offers to models
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, returning the definition it replaced
    pub fn register(&mut self, tool: ToolDefinition) -> Option<ToolDefinition> {
        self.tools.insert(tool.name.clone(), tool)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ToolDefinition> {
        self.tools.shift_remove(name)
    }

    /// Definitions in registration order, ready for a request
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
