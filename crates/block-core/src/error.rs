use thiserror::Error;

use crate::kind::BlockKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("position {pos} is outside the document (size {size})")]
    OutOfRange { pos: usize, size: usize },

    #[error("position {0} does not point at a block")]
    NotABlock(usize),

    #[error("position {0} is inside text, expected a boundary between nodes")]
    InsideText(usize),

    #[error("position {0} is not inside a text block")]
    NotInTextblock(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("normalization did not converge after {0} passes")]
    NormalizeDidNotConverge(usize),

    #[error("expected {expected} at position {pos}, found {found}")]
    WrongKind {
        pos: usize,
        expected: BlockKind,
        found: BlockKind,
    },
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug)]
pub struct PathError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptInputError {
    #[error("please enter a prompt")]
    Empty,

    #[error("a prompt request is already running")]
    AlreadyLoading,
}
