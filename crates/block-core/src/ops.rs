//! The primitive edits every document change is made of. Ops address nodes
//! by child-index path; `Draft` turns position-based edits into them and
//! records their inverses for undo.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{AttrPatch, Marks, Node, Selection};

/// Child indices from the document root down to a node.
pub type Path = Vec<usize>;

/// Text offsets and ranges count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Op {
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Path,
        range: Range<usize>,
    },
    /// `path` names the slot the node lands in; later siblings shift right.
    InsertNode {
        path: Path,
        node: Node,
    },
    RemoveNode {
        path: Path,
    },
    SetNodeAttrs {
        path: Path,
        patch: AttrPatch,
    },
    /// Replaces the marks of the text leaf at `path` wholesale.
    SetTextMarks {
        path: Path,
        marks: Marks,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetNodeAttrs { path, .. }
            | Op::SetTextMarks { path, .. } => path,
        }
    }

    /// Adds or removes a node, as opposed to editing one in place.
    pub fn is_structural(&self) -> bool {
        matches!(self, Op::InsertNode { .. } | Op::RemoveNode { .. })
    }
}

/// A batch of ops handed to `Editor::apply` as one atomic, undoable step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    /// What produced the change ("typing", "slash.table", ...). Only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            ..Self::default()
        }
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn selection_after(mut self, selection: Selection) -> Self {
        self.selection_after = Some(selection);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_are_tagged_by_type() {
        let op = Op::RemoveText {
            path: vec![0, 1],
            range: 2..4,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "removeText");
        assert_eq!(json["path"], serde_json::json!([0, 1]));

        let back: Op = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
        assert_eq!(back.path(), &[0, 1]);
        assert!(!back.is_structural());
    }

    #[test]
    fn transaction_builder_fills_optional_fields() {
        let mut tx = Transaction::new(Vec::new());
        assert!(tx.is_empty());
        tx.push(Op::RemoveNode { path: vec![2] });

        let tx = tx.selection_after(Selection::collapsed(1)).source("test");
        assert!(tx.ops[0].is_structural());
        assert_eq!(tx.source.as_deref(), Some("test"));
        assert_eq!(tx.selection_after, Some(Selection::collapsed(1)));
    }
}
