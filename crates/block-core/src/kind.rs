use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::core::Attrs;

/// Every block type the editor knows about. The set is closed: markup that
/// names anything else is mapped onto one of these while parsing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum BlockKind {
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    TaskList,
    TaskItem,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    CodeBlock,
    Blockquote,
    HorizontalRule,
    Image,
    Callout,
    Toggle,
    AiPrompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentModel {
    /// Marked text runs (paragraph, heading, callout).
    Inline,
    /// Unmarked text only (code block).
    PlainText,
    /// Child blocks, restricted by [`BlockKind::allows_child`].
    Blocks,
    /// No content at all; the block is a single atomic position.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    pub content: ContentModel,
    pub atomic: bool,
    /// Containers that are meaningless once empty are removed instead of
    /// being refilled with a paragraph.
    pub remove_when_empty: bool,
}

pub const MIN_HEADING_LEVEL: u64 = 1;
pub const MAX_HEADING_LEVEL: u64 = 3;

pub const DEFAULT_CALLOUT_EMOJI: &str = "💡";
pub const DEFAULT_CALLOUT_KIND: &str = "info";
pub const DEFAULT_IMAGE_WIDTH: &str = "100%";

impl BlockKind {
    pub fn spec(self) -> NodeSpec {
        use BlockKind::*;
        let (content, remove_when_empty) = match self {
            Paragraph | Heading | Callout => (ContentModel::Inline, false),
            CodeBlock => (ContentModel::PlainText, false),
            BulletList | OrderedList | TaskList | Table | TableRow => (ContentModel::Blocks, true),
            ListItem | TaskItem | TableHeader | TableCell | Blockquote | Toggle => {
                (ContentModel::Blocks, false)
            }
            HorizontalRule | Image | AiPrompt => (ContentModel::Empty, false),
        };
        NodeSpec {
            content,
            atomic: content == ContentModel::Empty,
            remove_when_empty,
        }
    }

    pub fn is_atomic(self) -> bool {
        self.spec().atomic
    }

    /// Blocks whose content is text (inline runs or a code block's plain text).
    pub fn is_textblock(self) -> bool {
        matches!(
            self.spec().content,
            ContentModel::Inline | ContentModel::PlainText
        )
    }

    pub fn holds_blocks(self) -> bool {
        self.spec().content == ContentModel::Blocks
    }

    /// Blocks that may sit directly in the document or any general container.
    pub fn is_flow(self) -> bool {
        !matches!(
            self,
            BlockKind::ListItem
                | BlockKind::TaskItem
                | BlockKind::TableRow
                | BlockKind::TableHeader
                | BlockKind::TableCell
        )
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            BlockKind::BulletList | BlockKind::OrderedList | BlockKind::TaskList
        )
    }

    pub fn is_table_cell(self) -> bool {
        matches!(self, BlockKind::TableHeader | BlockKind::TableCell)
    }

    /// Whether `child` may appear directly inside a block of this kind.
    pub fn allows_child(self, child: BlockKind) -> bool {
        use BlockKind::*;
        match self {
            BulletList | OrderedList => child == ListItem,
            TaskList => child == TaskItem,
            Table => child == TableRow,
            TableRow => child.is_table_cell(),
            ListItem | TaskItem | TableHeader | TableCell | Blockquote | Toggle => child.is_flow(),
            Paragraph | Heading | Callout | CodeBlock | HorizontalRule | Image | AiPrompt => false,
        }
    }

    /// The wrapper a flow block needs before it can live inside `self`.
    pub fn item_wrapper(self) -> Option<BlockKind> {
        match self {
            BlockKind::BulletList | BlockKind::OrderedList => Some(BlockKind::ListItem),
            BlockKind::TaskList => Some(BlockKind::TaskItem),
            BlockKind::Table => Some(BlockKind::TableRow),
            BlockKind::TableRow => Some(BlockKind::TableCell),
            _ => None,
        }
    }

    pub fn default_attrs(self) -> Attrs {
        let mut attrs = Attrs::new();
        match self {
            BlockKind::Heading => {
                attrs.insert("level".to_string(), Value::from(MIN_HEADING_LEVEL));
            }
            BlockKind::OrderedList => {
                attrs.insert("start".to_string(), Value::from(1u64));
            }
            BlockKind::TaskItem => {
                attrs.insert("checked".to_string(), Value::Bool(false));
            }
            BlockKind::Image => {
                attrs.insert("width".to_string(), Value::from(DEFAULT_IMAGE_WIDTH));
            }
            BlockKind::Callout => {
                attrs.insert("emoji".to_string(), Value::from(DEFAULT_CALLOUT_EMOJI));
                attrs.insert("calloutKind".to_string(), Value::from(DEFAULT_CALLOUT_KIND));
            }
            BlockKind::Toggle => {
                attrs.insert("isOpen".to_string(), Value::Bool(true));
            }
            _ => {}
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_camel_case() {
        assert_eq!(BlockKind::TaskItem.to_string(), "taskItem");
        assert_eq!(BlockKind::AiPrompt.to_string(), "aiPrompt");
        assert_eq!(
            "horizontalRule".parse::<BlockKind>().ok(),
            Some(BlockKind::HorizontalRule)
        );
    }

    #[test]
    fn table_parts_only_fit_their_parents() {
        assert!(BlockKind::Table.allows_child(BlockKind::TableRow));
        assert!(!BlockKind::Table.allows_child(BlockKind::Paragraph));
        assert!(BlockKind::TableRow.allows_child(BlockKind::TableHeader));
        assert!(!BlockKind::Blockquote.allows_child(BlockKind::TableCell));
        assert!(!BlockKind::Toggle.allows_child(BlockKind::ListItem));
    }
}
