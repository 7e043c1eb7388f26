use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Content parts ────────────────────────────────────────────────────────────

/// A single content part inside a message item.
///
/// Assistant messages carry `Text` parts (and occasionally a `Refusal`);
/// user/developer/system messages carry `Text` parts only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Refusal { refusal: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

// ─── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Developer,
    System,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Developer => "developer",
            Role::System => "system",
            Role::Assistant => "assistant",
        }
    }
}

// ─── Hosted tool kinds ────────────────────────────────────────────────────────

/// The hosted tool families executed by the model backend itself.
///
/// The loop records calls to these verbatim; it never invokes local code
/// for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostedToolKind {
    WebSearch,
    FileSearch,
    CodeInterpreter,
    ImageGeneration,
    ComputerUse,
    LocalShell,
    HostedMcp,
}

impl HostedToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostedToolKind::WebSearch => "web_search",
            HostedToolKind::FileSearch => "file_search",
            HostedToolKind::CodeInterpreter => "code_interpreter",
            HostedToolKind::ImageGeneration => "image_generation",
            HostedToolKind::ComputerUse => "computer_use",
            HostedToolKind::LocalShell => "local_shell",
            HostedToolKind::HostedMcp => "hosted_mcp",
        }
    }
}

// ─── Wire items ───────────────────────────────────────────────────────────────

/// One item in the conversation, in the shape exchanged with the model.
///
/// The same closed set is used for input (history + caller items) and for
/// model output. Provider-assigned ids are carried through untouched so a
/// round-trip preserves the raw wire representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        role: Role,
        content: Vec<ContentPart>,
    },
    Reasoning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        summary: Vec<String>,
    },
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        name: String,
        /// JSON-encoded argument object, exactly as the model produced it.
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
    HostedToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        kind: HostedToolKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    McpApprovalRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        server_label: String,
        name: String,
        arguments: String,
    },
    McpApprovalResponse {
        approval_request_id: String,
        approve: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    McpListTools {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        server_label: String,
        tools: Vec<McpToolInfo>,
    },
}

/// Tool metadata carried by an [`ResponseItem::McpListTools`] item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResponseItem {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::Message {
            id: None,
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn system_message(text: impl Into<String>) -> Self {
        Self::Message {
            id: None,
            role: Role::System,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn assistant_message(text: impl Into<String>) -> Self {
        Self::Message {
            id: None,
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::FunctionCall {
            id: None,
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// The concatenated text of a message item; `None` for all other kinds.
    pub fn message_text(&self) -> Option<String> {
        match self {
            Self::Message { content, .. } => Some(
                content
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Refusal { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            _ => None,
        }
    }

    /// The role of a message item; `None` for all other kinds.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// The call id this item carries, when it is a call or a call output.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { call_id, .. } | Self::FunctionCallOutput { call_id, .. } => {
                Some(call_id)
            }
            _ => None,
        }
    }
}

// ─── Tool wire descriptors ────────────────────────────────────────────────────

/// A tool as described to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function {
        name: String,
        description: String,
        /// JSON Schema of the argument object.
        parameters: Value,
        strict: bool,
    },
    Hosted {
        kind: HostedToolKind,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        config: Value,
    },
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        match self {
            Self::Function { name, .. } => name,
            Self::Hosted { kind, .. } => kind.as_str(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
