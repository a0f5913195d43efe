use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::block_of_kind;
use crate::core::{AttrPatch, Block, Editor};
use crate::error::ApplyError;
use crate::kind::{BlockKind, DEFAULT_CALLOUT_EMOJI};

/// The emoji picker's fixed palette.
pub const CALLOUT_EMOJIS: [&str; 10] = ["💡", "⚠️", "ℹ️", "✅", "❌", "🔥", "⭐", "📝", "🎯", "💬"];

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CalloutKind {
    #[default]
    Info,
    Warning,
    Tip,
    Error,
}

/// A callout's attributes with the fallbacks applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalloutStyle {
    pub emoji: String,
    pub kind: CalloutKind,
}

impl CalloutStyle {
    pub fn of(block: &Block) -> Self {
        let emoji = block
            .attr_str("emoji")
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_CALLOUT_EMOJI)
            .to_string();
        let kind = block
            .attr_str("calloutKind")
            .and_then(|k| k.parse().ok())
            .unwrap_or_default();
        Self { emoji, kind }
    }
}

/// Open/closed state of one callout's emoji picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmojiPicker {
    open: bool,
}

impl EmojiPicker {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Writes the picked emoji to the callout at `pos` and closes the picker.
    pub fn pick(&mut self, editor: &mut Editor, pos: usize, emoji: &str) -> Result<(), ApplyError> {
        set_callout_emoji(editor, pos, emoji)?;
        self.open = false;
        Ok(())
    }
}

pub fn set_callout_emoji(editor: &mut Editor, pos: usize, emoji: &str) -> Result<(), ApplyError> {
    block_of_kind(editor.doc(), pos, BlockKind::Callout)?;
    editor.change("callout.emoji", |draft| draft.set_attr(pos, "emoji", emoji))?;
    Ok(())
}

pub fn set_callout_kind(editor: &mut Editor, pos: usize, kind: CalloutKind) -> Result<(), ApplyError> {
    block_of_kind(editor.doc(), pos, BlockKind::Callout)?;
    editor.change("callout.kind", |draft| {
        draft.set_attrs(pos, AttrPatch::set("calloutKind", kind.to_string()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Node, Selection};

    #[test]
    fn missing_attributes_fall_back() {
        let mut block = Block::new(BlockKind::Callout);
        block.attrs.clear();
        assert_eq!(
            CalloutStyle::of(&block),
            CalloutStyle {
                emoji: "💡".into(),
                kind: CalloutKind::Info,
            }
        );
    }

    #[test]
    fn picking_an_emoji_updates_the_node_and_closes() {
        let doc = crate::core::Document::new(vec![Node::callout("Heads up")]);
        let mut editor = Editor::new(doc, Selection::collapsed(1));
        let mut picker = EmojiPicker::default();
        picker.toggle();
        assert!(picker.is_open());

        picker.pick(&mut editor, 0, CALLOUT_EMOJIS[1]).expect("callout at 0");
        assert!(!picker.is_open());
        let block = editor.doc().block_at(0).expect("callout at 0");
        assert_eq!(CalloutStyle::of(block).emoji, "⚠️");

        set_callout_kind(&mut editor, 0, CalloutKind::Warning).expect("callout at 0");
        assert!(editor.to_markup().contains(r#"data-callout-kind="warning""#));
    }
}
