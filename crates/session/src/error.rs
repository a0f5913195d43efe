use blockpad_core::{ApplyError, PromptInputError};
use thiserror::Error;

use crate::collab::CollabError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to load task {task_id}: {source}")]
    Load { task_id: String, source: CollabError },

    #[error("failed to save task {task_id}: {source}")]
    Save { task_id: String, source: CollabError },

    #[error("there is nothing to enhance yet")]
    EmptyDocument,

    #[error("enhancement failed: {0}")]
    Enhance(CollabError),

    #[error("{0} is not an image")]
    NotAnImage(String),

    #[error("upload failed: {0}")]
    Upload(CollabError),

    #[error(transparent)]
    Prompt(#[from] PromptInputError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

pub type SessionResult<T> = Result<T, SessionError>;
