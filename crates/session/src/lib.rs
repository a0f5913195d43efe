//! Editing sessions for task descriptions: debounced autosave, external
//! updates, and the AI and upload round trips around a `blockpad-core`
//! editor.

pub mod autosave;
pub mod collab;
mod config;
mod error;
mod session;

pub use crate::autosave::SaveDebouncer;
pub use crate::collab::*;
pub use crate::config::SessionConfig;
pub use crate::error::*;
pub use crate::session::{EditorSession, EnhanceOutcome, ExternalUpdate, SaveOutcome, SaveRequest};
