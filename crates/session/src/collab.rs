//! The external services an editing session talks to. Hosts plug in their
//! own implementations; nothing here knows about transports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service error: {0}")]
    Service(String),
}

pub type CollabResult<T> = Result<T, CollabError>;

/// Where task documents live, as persisted markup.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, task_id: &str) -> CollabResult<String>;

    async fn save(&self, task_id: &str, markup: &str) -> CollabResult<()>;
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnhanceMode {
    #[default]
    Polish,
    Concise,
    Detailed,
    Actionable,
}

impl EnhanceMode {
    pub fn label(self) -> &'static str {
        match self {
            EnhanceMode::Polish => "Polish",
            EnhanceMode::Concise => "Concise",
            EnhanceMode::Detailed => "Detailed",
            EnhanceMode::Actionable => "Actionable",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EnhanceMode::Polish => "Fix grammar & clarity",
            EnhanceMode::Concise => "Make it shorter",
            EnhanceMode::Detailed => "Add more context",
            EnhanceMode::Actionable => "Convert to steps",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    pub plain_text: String,
    pub mode: EnhanceMode,
    pub task_title: String,
}

/// Rewrites a whole description. Answers in plain text.
#[async_trait]
pub trait EnhanceService: Send + Sync {
    async fn enhance(&self, request: EnhanceRequest) -> CollabResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub task_title: String,
    pub task_content: String,
}

/// Answers an inline prompt with markup or plain text.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> CollabResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Stores an image and returns a URL it can be loaded from.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, file: ImageFile) -> CollabResult<String>;
}
