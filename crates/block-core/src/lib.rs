mod core;
mod draft;
mod error;
mod kind;
mod normalize;
mod ops;
mod position;

pub mod blocks;
pub mod drag;
pub mod markup;
pub mod nodes;
pub mod plain_text;
pub mod slash;
pub mod task;

pub use crate::blocks::{block_at_y, BlockLayout, BlockOutcome, NoOpReason, TurnIntoTarget};
pub use crate::core::*;
pub use crate::draft::Draft;
pub use crate::drag::{DragController, DragState};
pub use crate::error::*;
pub use crate::kind::*;
pub use crate::normalize::{normalize_document, NormalizePass};
pub use crate::ops::*;
pub use crate::position::*;
pub use crate::slash::{filter_commands, KeyResult, SlashCommand, SlashKey, SlashMenu, SlashOutcome, SlashState};
pub use crate::task::{TaskPriority, TaskRecord, TaskStatus, TaskUpdate};
