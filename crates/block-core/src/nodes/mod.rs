//! Controllers for the interactive inline nodes. Each keeps its transient UI
//! state to itself and touches the document only at its commit points.

mod ai_prompt;
mod callout;
mod image;
mod toggle;

pub use ai_prompt::*;
pub use callout::*;
pub use image::*;
pub use toggle::*;

use crate::core::{Block, Document};
use crate::error::ApplyError;
use crate::kind::BlockKind;

/// The block at `pos`, provided it is a `kind` block.
pub(crate) fn block_of_kind(doc: &Document, pos: usize, kind: BlockKind) -> Result<&Block, ApplyError> {
    let block = doc.block_at(pos)?;
    if block.kind != kind {
        return Err(ApplyError::WrongKind {
            pos,
            expected: kind,
            found: block.kind,
        });
    }
    Ok(block)
}
