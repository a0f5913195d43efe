use serde_json::Value;

use crate::core::{apply_op, AttrPatch, Document, MarkKind, Node, Selection, TextNode};
use crate::error::{ApplyError, PositionError};
use crate::normalize;
use crate::ops::Op;
use crate::position::{Assoc, Mapping};

/// A private working copy handed to [`crate::Editor::change`]. Every helper
/// applies its ops right away, so positions read back from [`Draft::doc`]
/// always describe the current copy; positions taken earlier must go through
/// [`Draft::mapping`].
pub struct Draft {
    doc: Document,
    selection: Selection,
    mapping: Mapping,
    inverse: Vec<Op>,
}

impl Draft {
    pub(crate) fn new(doc: Document, selection: Selection) -> Self {
        Self {
            doc,
            selection,
            mapping: Mapping::new(),
            inverse: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Document, Selection, Mapping, Vec<Op>) {
        (self.doc, self.selection, self.mapping, self.inverse)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Maps positions from before this change into the current copy.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn apply(&mut self, op: Op) -> Result<(), ApplyError> {
        let (inverse, map) = apply_op(&mut self.doc, op)?;
        self.selection = Selection {
            anchor: map.map(self.selection.anchor, Assoc::Right),
            head: map.map(self.selection.head, Assoc::Right),
        };
        self.mapping.push(map);
        self.inverse.push(inverse);
        Ok(())
    }

    pub(crate) fn normalize(&mut self, max_iterations: usize) -> Result<(), ApplyError> {
        normalize::normalize_draft(self, max_iterations)
    }

    /// Inserts `nodes` at the block boundary `pos`. Returns the position
    /// right after the last inserted node.
    pub fn insert_nodes(&mut self, pos: usize, nodes: Vec<Node>) -> Result<usize, ApplyError> {
        let resolved = self.doc.resolve(pos)?;
        if resolved.text_offset > 0 {
            return Err(PositionError::InsideText(pos).into());
        }
        if resolved
            .parent(&self.doc)
            .is_some_and(|parent| parent.kind.is_textblock() || parent.kind.is_atomic())
        {
            return Err(PositionError::InsideText(pos).into());
        }

        let mut end = pos;
        let mut path = resolved.path;
        path.push(resolved.index);
        for node in nodes {
            end += node.size();
            self.apply(Op::InsertNode {
                path: path.clone(),
                node,
            })?;
            if let Some(last) = path.last_mut() {
                *last += 1;
            }
        }
        Ok(end)
    }

    /// Removes the block starting at `pos` with its whole subtree.
    pub fn delete_node(&mut self, pos: usize) -> Result<Node, ApplyError> {
        let path = self.doc.block_path_at(pos)?;
        let node = self
            .doc
            .node_at_path(&path)
            .cloned()
            .ok_or(PositionError::NotABlock(pos))?;
        self.apply(Op::RemoveNode { path })?;
        Ok(node)
    }

    /// Swaps the block at `pos` for `nodes`, returning the end of the
    /// replacement.
    pub fn replace_node(&mut self, pos: usize, nodes: Vec<Node>) -> Result<usize, ApplyError> {
        self.delete_node(pos)?;
        self.insert_nodes(pos, nodes)
    }

    pub fn set_attrs(&mut self, pos: usize, patch: AttrPatch) -> Result<(), ApplyError> {
        if patch.is_empty() {
            return Ok(());
        }
        let path = self.doc.block_path_at(pos)?;
        self.apply(Op::SetNodeAttrs { path, patch })
    }

    pub fn set_attr(
        &mut self,
        pos: usize,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ApplyError> {
        self.set_attrs(pos, AttrPatch::set(key, value))
    }

    /// Inserts plain text at `pos`, which must be inside a textblock. Text
    /// typed at the end of a run takes that run's marks.
    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<usize, ApplyError> {
        if text.is_empty() {
            return Ok(pos);
        }
        let range = self.doc.textblock_at(pos)?;
        let resolved = self.doc.resolve(pos)?;
        let children = self
            .doc
            .children_at(&range.path)
            .ok_or(PositionError::NotInTextblock(pos))?;

        let (index, offset) = if resolved.text_offset > 0 {
            (Some(resolved.index), resolved.text_offset)
        } else if resolved.index > 0 {
            let prev = resolved.index - 1;
            (Some(prev), children[prev].size())
        } else if !children.is_empty() {
            (Some(0), 0)
        } else {
            (None, 0)
        };

        let mut path = range.path;
        match index {
            Some(ix) => {
                path.push(ix);
                self.apply(Op::InsertText {
                    path,
                    offset,
                    text: text.to_string(),
                })?;
            }
            None => {
                path.push(0);
                self.apply(Op::InsertNode {
                    path,
                    node: Node::text(text),
                })?;
            }
        }
        Ok(pos + text.chars().count())
    }

    /// Deletes the text between `from` and `to`; both must lie in the same
    /// textblock.
    pub fn delete_text(&mut self, from: usize, to: usize) -> Result<(), ApplyError> {
        let (from, to) = (from.min(to), from.max(to));
        if from == to {
            return Ok(());
        }
        let range = self.doc.textblock_at(from)?;
        if to > range.end {
            return Err(PositionError::NotInTextblock(to).into());
        }

        for (ix, leaf_start, leaf_end) in self.leaves(&range.path, range.start).into_iter().rev() {
            let a = from.max(leaf_start);
            let b = to.min(leaf_end);
            if a >= b {
                continue;
            }
            let mut path = range.path.clone();
            path.push(ix);
            self.apply(Op::RemoveText {
                path,
                range: (a - leaf_start)..(b - leaf_start),
            })?;
        }
        Ok(())
    }

    /// Adds the mark to every text character in `from..to`, or removes it
    /// when every character there already carries it. Returns whether the
    /// mark is now on.
    pub fn toggle_mark(&mut self, from: usize, to: usize, mark: MarkKind) -> Result<bool, ApplyError> {
        let (from, to) = (from.min(to), from.max(to));
        let spans = self.text_spans(from, to);
        let all_marked = !spans.is_empty()
            && spans.iter().all(|(path, _, _)| {
                self.doc
                    .node_at_path(path)
                    .and_then(Node::as_text)
                    .is_some_and(|t| t.marks.has(mark))
            });
        let on = !all_marked;
        self.set_mark(from, to, mark, on)?;
        Ok(on)
    }

    /// Sets or clears `mark` over `from..to`, splitting runs at the edges.
    /// Positions do not move.
    pub fn set_mark(&mut self, from: usize, to: usize, mark: MarkKind, on: bool) -> Result<(), ApplyError> {
        for (path, a, b) in self.text_spans(from, to).into_iter().rev() {
            let Some(leaf) = self.doc.node_at_path(&path).and_then(Node::as_text).cloned() else {
                continue;
            };
            if leaf.marks.has(mark) == on {
                continue;
            }
            let mut marks = leaf.marks;
            marks.set(mark, on);
            if a == 0 && b == leaf.len() {
                self.apply(Op::SetTextMarks { path, marks })?;
                continue;
            }

            let chars: Vec<char> = leaf.text.chars().collect();
            let pieces = [
                (chars[..a].iter().collect::<String>(), leaf.marks),
                (chars[a..b].iter().collect::<String>(), marks),
                (chars[b..].iter().collect::<String>(), leaf.marks),
            ];
            self.apply(Op::RemoveNode { path: path.clone() })?;
            let mut insert_at = path;
            for (text, marks) in pieces {
                if text.is_empty() {
                    continue;
                }
                self.apply(Op::InsertNode {
                    path: insert_at.clone(),
                    node: Node::Text(TextNode { text, marks }),
                })?;
                if let Some(last) = insert_at.last_mut() {
                    *last += 1;
                }
            }
        }
        Ok(())
    }

    /// Replaces the whole inline content of the textblock holding `pos`.
    pub fn set_inline_content(&mut self, pos: usize, runs: Vec<TextNode>) -> Result<(), ApplyError> {
        let range = self.doc.textblock_at(pos)?;
        let count = self
            .doc
            .children_at(&range.path)
            .map(<[Node]>::len)
            .unwrap_or(0);
        for ix in (0..count).rev() {
            let mut path = range.path.clone();
            path.push(ix);
            self.apply(Op::RemoveNode { path })?;
        }
        for (ix, run) in runs.into_iter().enumerate() {
            let mut path = range.path.clone();
            path.push(ix);
            self.apply(Op::InsertNode {
                path,
                node: Node::Text(run),
            })?;
        }
        Ok(())
    }

    /// `(child index, start, end)` for every text leaf of a textblock.
    fn leaves(&self, path: &[usize], content_start: usize) -> Vec<(usize, usize, usize)> {
        let mut out = Vec::new();
        let Some(children) = self.doc.children_at(path) else {
            return out;
        };
        let mut offset = content_start;
        for (ix, child) in children.iter().enumerate() {
            let size = child.size();
            if matches!(child, Node::Text(_)) {
                out.push((ix, offset, offset + size));
            }
            offset += size;
        }
        out
    }

    /// Text leaves overlapping `from..to`, with the covered char range of each.
    fn text_spans(&self, from: usize, to: usize) -> Vec<(Vec<usize>, usize, usize)> {
        let mut spans = Vec::new();
        for range in self.doc.textblocks() {
            if range.end < from || range.start > to {
                continue;
            }
            for (ix, start, end) in self.leaves(&range.path, range.start) {
                let a = from.max(start);
                let b = to.min(end);
                if a < b {
                    let mut path = range.path.clone();
                    path.push(ix);
                    spans.push((path, a - start, b - start));
                }
            }
        }
        spans
    }
}

