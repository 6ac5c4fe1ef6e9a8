use serde::{Deserialize, Serialize};

/// Prefix carried by assistant messages that report a failed question.
pub const ERROR_PREFIX: &str = "Error: ";

/// A server-side indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Opaque server identifier, the only stable key.
    pub name: String,
    /// Human label, usually the uploaded file name. Not unique.
    pub display_name: String,
    #[serde(default)]
    pub vectors_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Ephemeral handle, only set on in-flight placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub loading: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    /// Source pages the answer was drawn from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<u32>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            id: None,
            loading: false,
            error: false,
            pages: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            id: None,
            loading: false,
            error: false,
            pages: Vec::new(),
        }
    }

    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            id: Some(id.into()),
            loading: true,
            error: false,
            pages: Vec::new(),
        }
    }

    pub fn with_pages(mut self, pages: Vec<u32>) -> Self {
        self.pages = pages;
        self
    }

    /// Assistant message reporting a failure, tagged and prefixed so it never
    /// reads like a normal answer.
    pub fn failure(reason: impl std::fmt::Display) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("{}{}", ERROR_PREFIX, reason),
            id: None,
            loading: false,
            error: true,
            pages: Vec::new(),
        }
    }
}

/// Reply to a question: the generated text and the pages it cites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    pub pages: Vec<u32>,
}

impl Answer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            pages: Vec::new(),
        }
    }
}

/// One conversation as persisted for a display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub messages: Vec<ChatMessage>,
    pub collection_name: Option<String>,
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// What an upload indexes: a local file or a remote page.
#[derive(Debug, Clone)]
pub enum UploadSource {
    File(UploadFile),
    Url(String),
}

impl UploadSource {
    pub fn display_name(&self) -> &str {
        match self {
            UploadSource::File(file) => &file.name,
            UploadSource::Url(url) => url,
        }
    }
}

/// Result of a successful index call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub display_name: String,
    pub collection_name: String,
}
