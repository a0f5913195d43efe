//! Drag-to-reorder for sibling blocks.
//!
//! The host reports the rendered extents of the draggable blocks in document
//! order. While dragging, the pointer picks a gap between blocks: gap `i`
//! sits right before block `i`, gap `len` after the last one. Nothing touches
//! the document until [`DragController::drop_on`] runs with a resolved gap.

use tracing::debug;

use crate::blocks::{carry_selection, BlockLayout, BlockOutcome, NoOpReason};
use crate::core::Editor;
use crate::position::Assoc;

#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        from: usize,
        blocks: Vec<BlockLayout>,
        gap: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragController {
    state: DragState,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Starts dragging the block at `pos`. Returns false when `pos` is not
    /// one of `blocks`.
    pub fn start(&mut self, blocks: Vec<BlockLayout>, pos: usize) -> bool {
        let Some(from) = blocks.iter().position(|b| b.pos == pos) else {
            debug!(pos, "drag start on a block that is not laid out");
            self.state = DragState::Idle;
            return false;
        };
        self.state = DragState::Dragging {
            from,
            blocks,
            gap: None,
        };
        true
    }

    /// Updates the drop gap from the pointer's vertical position: the gap
    /// sits after every block whose midpoint is above `y`.
    pub fn hover(&mut self, y: f32) -> Option<usize> {
        let DragState::Dragging { blocks, gap, .. } = &mut self.state else {
            return None;
        };
        let next = blocks.iter().filter(|b| b.midpoint() < y).count();
        *gap = Some(next);
        Some(next)
    }

    /// The pointer left every valid target.
    pub fn leave(&mut self) {
        if let DragState::Dragging { gap, .. } = &mut self.state {
            *gap = None;
        }
    }

    /// Position of the boundary the current gap stands for, if any.
    pub fn drop_target(&self, editor: &Editor) -> Option<usize> {
        let DragState::Dragging { blocks, gap, .. } = &self.state else {
            return None;
        };
        gap_position(editor, blocks, (*gap)?)
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Moves the dragged block to the resolved gap. Ends the drag either way.
    pub fn drop_on(&mut self, editor: &mut Editor) -> BlockOutcome {
        let DragState::Dragging { from, blocks, gap } = std::mem::replace(&mut self.state, DragState::Idle)
        else {
            return BlockOutcome::NoOp(NoOpReason::NoTarget);
        };
        let Some(gap) = gap else {
            return BlockOutcome::NoOp(NoOpReason::NoTarget);
        };
        if gap == from || gap == from + 1 {
            debug!(from, gap, "dropped next to itself");
            return BlockOutcome::NoOp(NoOpReason::SameBoundary);
        }

        let source = blocks[from].pos;
        let Some(target) = gap_position(editor, &blocks, gap) else {
            return BlockOutcome::NoOp(NoOpReason::StalePosition);
        };
        let Ok(block) = editor.doc().block_at(source) else {
            return BlockOutcome::NoOp(NoOpReason::StalePosition);
        };
        let size = block.size();
        let selection = *editor.selection();

        let result = editor.change("block.drag", |draft| {
            let node = draft.delete_node(source)?;
            let at = draft.mapping().map(target, Assoc::Left);
            draft.insert_nodes(at, vec![node])?;
            if let Some(selection) = carry_selection(selection, source, size, at) {
                draft.set_selection(selection);
            }
            Ok(at)
        });
        match result {
            Ok(change) => BlockOutcome::Moved { pos: change.value },
            Err(err) => {
                debug!(%err, "drop target went stale");
                BlockOutcome::NoOp(NoOpReason::StalePosition)
            }
        }
    }
}

fn gap_position(editor: &Editor, blocks: &[BlockLayout], gap: usize) -> Option<usize> {
    if let Some(block) = blocks.get(gap) {
        return Some(block.pos);
    }
    let last = blocks.last()?;
    match editor.doc().block_at(last.pos) {
        Ok(block) => Some(last.pos + block.size()),
        Err(err) => {
            debug!(%err, "last laid out block is gone");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, Node, Selection};

    fn layouts(editor: &Editor) -> Vec<BlockLayout> {
        editor
            .doc()
            .child_positions(&[])
            .into_iter()
            .enumerate()
            .map(|(ix, pos)| BlockLayout {
                pos,
                top: ix as f32 * 20.0,
                height: 20.0,
            })
            .collect()
    }

    #[test]
    fn dropping_around_self_is_a_noop() {
        let doc = Document::new(vec![
            Node::paragraph("A"),
            Node::paragraph("B"),
            Node::paragraph("C"),
        ]);
        let mut editor = Editor::new(doc, Selection::collapsed(1));
        let before = editor.to_markup();
        for y in [15.0, 35.0] {
            let mut drag = DragController::new();
            assert!(drag.start(layouts(&editor), 3));
            drag.hover(y);
            assert_eq!(
                drag.drop_on(&mut editor),
                BlockOutcome::NoOp(NoOpReason::SameBoundary)
            );
        }
        assert_eq!(editor.to_markup(), before);
    }

    #[test]
    fn drop_without_target_leaves_document() {
        let doc = Document::new(vec![Node::paragraph("A"), Node::paragraph("B")]);
        let mut editor = Editor::new(doc, Selection::collapsed(1));
        let mut drag = DragController::new();
        assert!(drag.start(layouts(&editor), 0));
        drag.hover(100.0);
        drag.leave();
        assert_eq!(
            drag.drop_on(&mut editor),
            BlockOutcome::NoOp(NoOpReason::NoTarget)
        );
        assert_eq!(editor.to_markup(), "<p>A</p><p>B</p>");
    }
}
