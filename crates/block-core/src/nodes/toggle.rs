use serde_json::Value;
use tracing::debug;

use super::block_of_kind;
use crate::core::{Block, Editor, Node};
use crate::error::ApplyError;
use crate::kind::BlockKind;

pub fn is_open(block: &Block) -> bool {
    block.attr_bool("isOpen").unwrap_or(true)
}

/// Flips `isOpen` on the toggle at `pos` and returns the new state.
pub fn toggle_open(editor: &mut Editor, pos: usize) -> Result<bool, ApplyError> {
    let open = !is_open(block_of_kind(editor.doc(), pos, BlockKind::Toggle)?);
    editor.change("toggle.open", |draft| draft.set_attr(pos, "isOpen", Value::Bool(open)))?;
    debug!(pos, open, "toggle flipped");
    Ok(open)
}

/// Children a renderer shows: everything when open, only the header when
/// closed.
pub fn visible_children(block: &Block) -> &[Node] {
    if is_open(block) {
        &block.children
    } else {
        &block.children[..block.children.len().min(1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, Selection};

    #[test]
    fn closed_toggle_shows_only_its_header() {
        let doc = Document::new(vec![Node::toggle(vec![
            Node::paragraph("Header"),
            Node::paragraph("Body"),
        ])]);
        let mut editor = Editor::new(doc, Selection::collapsed(2));

        assert_eq!(toggle_open(&mut editor, 0), Ok(false));
        let block = editor.doc().block_at(0).expect("toggle at 0");
        assert_eq!(visible_children(block).len(), 1);
        assert!(editor.to_markup().contains("<p>Body</p>"));

        assert_eq!(toggle_open(&mut editor, 0), Ok(true));
        let block = editor.doc().block_at(0).expect("toggle at 0");
        assert_eq!(visible_children(block).len(), 2);
    }

    #[test]
    fn toggling_a_paragraph_is_rejected() {
        let mut editor = Editor::from_markup("<p>plain</p>");
        let before = editor.to_markup();
        assert!(matches!(
            toggle_open(&mut editor, 0),
            Err(ApplyError::WrongKind { .. })
        ));
        assert_eq!(editor.to_markup(), before);
    }
}
