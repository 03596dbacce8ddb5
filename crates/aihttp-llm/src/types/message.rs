use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    /// Lowercase wire name shared by every provider that keeps roles as strings
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl Message {
    /// Create a message from any content
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// System instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    /// User message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// Assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Text and file parts for multimodal input
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Extract text content, joining text parts and skipping files
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::File { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// File parts contained in this content
    pub fn files(&self) -> impl Iterator<Item = &FileRef> {
        let parts = match self {
            Self::Text(_) => &[][..],
            Self::Parts(parts) => parts.as_slice(),
        };
        parts.iter().filter_map(|p| match p {
            ContentPart::File { file } => Some(file),
            ContentPart::Text { .. } => None,
        })
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// File attachment
    File {
        /// Where the file lives and what it is
        file: FileRef,
    },
}

impl ContentPart {
    /// Text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// File part
    pub fn file(source: FileSource, mime_type: impl Into<String>) -> Self {
        Self::File {
            file: FileRef {
                source,
                mime_type: mime_type.into(),
            },
        }
    }
}

/// Reference to a file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// File location or inline data
    pub source: FileSource,
    /// MIME type, e.g. `image/png` or `application/pdf`
    pub mime_type: String,
}

impl FileRef {
    /// Whether the file is an image
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Where a file's bytes come from
///
/// Local paths are resolved by the provider before the request is
/// normalized: Gemini uploads them and references the returned URI, the
/// other providers inline them as base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// Local filesystem path
    Path(PathBuf),
    /// Remote or provider-hosted URI
    Uri(String),
    /// Base64-encoded bytes
    Data(String),
}
