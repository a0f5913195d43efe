use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::draft::Draft;
use crate::error::{ApplyError, PathError};
use crate::kind::BlockKind;
use crate::normalize;
use crate::ops::{Op, Transaction};
use crate::position::{Mapping, StepMap};

pub type Attrs = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// The smallest valid document: a single empty paragraph.
    pub fn empty() -> Self {
        Self {
            children: vec![Node::paragraph("")],
        }
    }

    pub fn content_size(&self) -> usize {
        self.children.iter().map(Node::size).sum()
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for &ix in rest {
            node = match node {
                Node::Block(block) => block.children.get(ix)?,
                Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    pub fn block_at_path(&self, path: &[usize]) -> Option<&Block> {
        self.node_at_path(path).and_then(Node::as_block)
    }

    /// Children of the container at `path`; the empty path is the document.
    pub fn children_at(&self, path: &[usize]) -> Option<&[Node]> {
        if path.is_empty() {
            return Some(&self.children);
        }
        self.block_at_path(path).map(|b| b.children.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Block(Block),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::plain(text))
    }

    pub fn styled(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    pub fn block(kind: BlockKind, children: Vec<Node>) -> Self {
        Node::Block(Block::with_children(kind, children))
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::block(BlockKind::Paragraph, vec![Node::text(text)])
    }

    pub fn paragraph_with(runs: Vec<TextNode>) -> Self {
        Node::block(
            BlockKind::Paragraph,
            runs.into_iter().map(Node::Text).collect(),
        )
    }

    pub fn heading(level: u64, text: impl Into<String>) -> Self {
        let mut block = Block::with_children(BlockKind::Heading, vec![Node::text(text)]);
        block.attrs.insert("level".to_string(), Value::from(level));
        Node::Block(block)
    }

    pub fn divider() -> Self {
        Node::Block(Block::new(BlockKind::HorizontalRule))
    }

    pub fn image(src: impl Into<String>) -> Self {
        let mut block = Block::new(BlockKind::Image);
        block.attrs.insert("src".to_string(), Value::String(src.into()));
        Node::Block(block)
    }

    pub fn code_block(text: impl Into<String>, language: Option<&str>) -> Self {
        let mut block = Block::with_children(BlockKind::CodeBlock, vec![Node::text(text)]);
        if let Some(language) = language {
            block
                .attrs
                .insert("language".to_string(), Value::from(language));
        }
        Node::Block(block)
    }

    pub fn callout(text: impl Into<String>) -> Self {
        Node::block(BlockKind::Callout, vec![Node::text(text)])
    }

    pub fn toggle(children: Vec<Node>) -> Self {
        Node::block(BlockKind::Toggle, children)
    }

    pub fn ai_prompt(id: Uuid) -> Self {
        let mut block = Block::new(BlockKind::AiPrompt);
        block
            .attrs
            .insert("promptId".to_string(), Value::String(id.to_string()));
        Node::Block(block)
    }

    /// A list of the given kind with one item per paragraph text.
    pub fn list<I, S>(kind: BlockKind, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item_kind = kind.item_wrapper().unwrap_or(BlockKind::ListItem);
        Node::block(
            kind,
            items
                .into_iter()
                .map(|text| Node::block(item_kind, vec![Node::paragraph(text)]))
                .collect(),
        )
    }

    /// Number of positions this node occupies in the flattened address space.
    pub fn size(&self) -> usize {
        match self {
            Node::Text(t) => t.len(),
            Node::Block(b) => b.size(),
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Block(_) => None,
        }
    }

    pub fn kind(&self) -> Option<BlockKind> {
        self.as_block().map(|b| b.kind)
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Block(b) => b.text_content(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            attrs: kind.default_attrs(),
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: BlockKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            attrs: kind.default_attrs(),
            children,
        }
    }

    pub fn size(&self) -> usize {
        if self.kind.is_atomic() {
            1
        } else {
            2 + self.content_size()
        }
    }

    pub fn content_size(&self) -> usize {
        self.children.iter().map(Node::size).sum()
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attrs.get(key).and_then(Value::as_bool)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(Value::as_u64)
    }

    pub fn heading_level(&self) -> Option<u64> {
        (self.kind == BlockKind::Heading).then(|| self.attr_u64("level").unwrap_or(1))
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }

    /// Clones of the direct text children (the inline content of a textblock).
    pub fn inline_runs(&self) -> Vec<TextNode> {
        self.children
            .iter()
            .filter_map(|n| n.as_text().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextNode {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    /// Length in characters, which is also its size in positions.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strike: bool,
    #[serde(default)]
    pub highlight: bool,
    #[serde(default)]
    pub code: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Strike,
    Highlight,
    Code,
}

impl Marks {
    pub fn has(&self, mark: MarkKind) -> bool {
        match mark {
            MarkKind::Bold => self.bold,
            MarkKind::Italic => self.italic,
            MarkKind::Strike => self.strike,
            MarkKind::Highlight => self.highlight,
            MarkKind::Code => self.code,
        }
    }

    pub fn set(&mut self, mark: MarkKind, on: bool) {
        match mark {
            MarkKind::Bold => self.bold = on,
            MarkKind::Italic => self.italic = on,
            MarkKind::Strike => self.strike = on,
            MarkKind::Highlight => self.highlight = on,
            MarkKind::Code => self.code = on,
        }
    }

    pub fn with(mut self, mark: MarkKind) -> Self {
        self.set(mark, true);
        self
    }

    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }
}

/// A selection expressed as two document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn collapsed(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, Default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

/// Result of a committed change: whatever the closure produced, plus the
/// mapping that carries positions taken before the change to positions in
/// the new document.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub value: T,
    pub mapping: Mapping,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection) -> Self {
        Self::with_config(doc, selection, EditorConfig::default())
    }

    pub fn with_config(doc: Document, selection: Selection, config: EditorConfig) -> Self {
        let config = config.with_defaults();
        let doc = normalize_or_keep(doc, config.max_normalize_iterations);
        let selection = normalize_selection(&doc, &selection);
        Self {
            doc,
            selection,
            config,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Document::empty(), Selection::collapsed(1))
    }

    /// Builds an editor from persisted markup. Never fails: anything the
    /// parser cannot place ends up as paragraphs.
    pub fn from_markup(markup: &str) -> Self {
        Self::new(crate::markup::parse(markup), Selection::collapsed(1))
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = normalize_selection(&self.doc, &selection);
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn to_markup(&self) -> String {
        crate::markup::serialize(&self.doc)
    }

    pub fn to_plain_text(&self) -> String {
        crate::plain_text::to_plain_text(&self.doc)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Runs `f` against a private copy of the document. Ops it applies take
    /// effect on the copy immediately; the copy replaces the document only if
    /// `f` and the normalization that follows both succeed.
    pub fn change<T>(
        &mut self,
        source: &str,
        f: impl FnOnce(&mut Draft) -> Result<T, ApplyError>,
    ) -> Result<Change<T>, ApplyError> {
        let selection_before = self.selection;
        let mut draft = Draft::new(self.doc.clone(), self.selection);

        let value = match f(&mut draft) {
            Ok(value) => value,
            Err(err) => {
                debug!(source, %err, "change rejected, document untouched");
                return Err(err);
            }
        };
        draft.normalize(self.config.max_normalize_iterations)?;

        let (doc, selection, mapping, mut inverse_ops) = draft.into_parts();
        if inverse_ops.is_empty() {
            return Ok(Change { value, mapping });
        }
        inverse_ops.reverse();

        self.doc = doc;
        self.selection = normalize_selection(&self.doc, &selection);
        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: self.selection,
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
        trace!(source, "change committed");

        Ok(Change { value, mapping })
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<Mapping, ApplyError> {
        let Transaction {
            ops,
            selection_after,
            source,
        } = tx;
        let source = source.unwrap_or_else(|| "apply".to_string());
        self.change(&source, |draft| {
            for op in ops {
                draft.apply(op)?;
            }
            if let Some(selection) = selection_after {
                draft.set_selection(selection);
            }
            Ok(())
        })
        .map(|change| change.mapping)
    }

    /// Toggles `mark` over the current selection. A collapsed selection has
    /// nothing to mark and is left alone.
    pub fn toggle_mark(&mut self, mark: MarkKind) -> Result<bool, ApplyError> {
        let selection = self.selection;
        if selection.is_collapsed() {
            return Ok(false);
        }
        let change = self.change("mark.toggle", |draft| {
            draft.toggle_mark(selection.from(), selection.to(), mark)
        })?;
        Ok(change.value)
    }

    /// Swaps in a whole new document, e.g. one pushed by an external sync.
    /// History is dropped because it describes a document that no longer
    /// exists.
    pub fn replace_document(&mut self, doc: Document, selection: Selection) {
        self.doc = normalize_or_keep(doc, self.config.max_normalize_iterations);
        self.selection = normalize_selection(&self.doc, &selection);
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let Some((doc, redo_ops)) = self.replay(inverse_ops, selection_before) else {
            return false;
        };
        self.doc = doc;
        self.selection = normalize_selection(&self.doc, &selection_before);

        self.redo_stack.push(UndoRecord {
            inverse_ops: redo_ops,
            selection_before,
            selection_after,
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let Some((doc, undo_ops)) = self.replay(inverse_ops, selection_after) else {
            return false;
        };
        self.doc = doc;
        self.selection = normalize_selection(&self.doc, &selection_after);

        self.undo_stack.push(UndoRecord {
            inverse_ops: undo_ops,
            selection_before,
            selection_after,
        });
        true
    }

    fn replay(&mut self, ops: Vec<Op>, selection: Selection) -> Option<(Document, Vec<Op>)> {
        let mut draft = Draft::new(self.doc.clone(), selection);
        for op in ops {
            if let Err(err) = draft.apply(op) {
                // History no longer matches the document; keep the document.
                warn!(%err, "history replay failed, clearing history");
                self.undo_stack.clear();
                self.redo_stack.clear();
                return None;
            }
        }
        let (doc, _, _, mut inverse) = draft.into_parts();
        inverse.reverse();
        Some((doc, inverse))
    }
}

fn normalize_or_keep(doc: Document, max_iterations: usize) -> Document {
    match normalize::normalize_document(doc.clone(), max_iterations) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(%err, "normalization failed, keeping document as loaded");
            if doc.children.is_empty() {
                Document::empty()
            } else {
                doc
            }
        }
    }
}

/// Moves both ends of `selection` onto the nearest position inside text.
pub fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    Selection {
        anchor: doc.nearest_text_pos(selection.anchor),
        head: doc.nearest_text_pos(selection.head),
    }
}

pub(crate) fn apply_op(doc: &mut Document, op: Op) -> Result<(Op, StepMap), ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let base = text_base(doc, &path)?;
            let text_node = node_text_mut(doc, &path)?;
            let offset = offset.min(text_node.len());
            let byte = byte_offset(&text_node.text, offset);
            text_node.text.insert_str(byte, &text);
            let len = text.chars().count();
            Ok((
                Op::RemoveText {
                    path,
                    range: offset..offset + len,
                },
                StepMap::new(base + offset, 0, len),
            ))
        }
        Op::RemoveText { path, range } => {
            let base = text_base(doc, &path)?;
            let text_node = node_text_mut(doc, &path)?;
            let len = text_node.len();
            let start = range.start.min(len);
            let end = range.end.min(len);
            if start >= end {
                return Ok((
                    Op::InsertText {
                        path,
                        offset: start,
                        text: String::new(),
                    },
                    StepMap::identity(),
                ));
            }
            let start_byte = byte_offset(&text_node.text, start);
            let end_byte = byte_offset(&text_node.text, end);
            let removed = text_node.text[start_byte..end_byte].to_string();
            text_node.text.replace_range(start_byte..end_byte, "");
            Ok((
                Op::InsertText {
                    path,
                    offset: start,
                    text: removed,
                },
                StepMap::new(base + start, end - start, 0),
            ))
        }
        Op::InsertNode { path, node } => {
            let pos = doc
                .pos_of_path(&path)
                .ok_or_else(|| PathError(format!("insert path {path:?} does not resolve")))?;
            let size = node.size();
            insert_node(doc, &path, node)?;
            Ok((Op::RemoveNode { path }, StepMap::new(pos, 0, size)))
        }
        Op::RemoveNode { path } => {
            let pos = doc
                .pos_of_path(&path)
                .ok_or_else(|| PathError(format!("remove path {path:?} does not resolve")))?;
            let removed = remove_node(doc, &path)?;
            let size = removed.size();
            Ok((
                Op::InsertNode {
                    path,
                    node: removed,
                },
                StepMap::new(pos, size, 0),
            ))
        }
        Op::SetNodeAttrs { path, patch } => {
            let old = match node_mut(doc, &path)? {
                Node::Block(block) => patch_apply(&mut block.attrs, &patch),
                Node::Text(_) => return Err(ApplyError::InvalidPath("text leaves carry no attributes".into())),
            };
            Ok((Op::SetNodeAttrs { path, patch: old }, StepMap::identity()))
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok((Op::SetTextMarks { path, marks: old }, StepMap::identity()))
        }
    }
}

fn text_base(doc: &Document, path: &[usize]) -> Result<usize, PathError> {
    doc.pos_of_path(path)
        .ok_or_else(|| PathError(format!("no text leaf at {path:?}")))
}

/// Byte index of the `char_ix`-th character, clamped to the string end.
pub(crate) fn byte_offset(s: &str, char_ix: usize) -> usize {
    s.char_indices()
        .nth(char_ix)
        .map(|(ix, _)| ix)
        .unwrap_or(s.len())
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| PathError("empty path".into()))?;
    let len = doc.children.len();
    let mut node = doc.children.get_mut(*first).ok_or_else(|| {
        PathError(format!("child {first} out of range at depth 0 ({len} children)"))
    })?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Block(block) => {
                let len = block.children.len();
                match block.children.get_mut(ix) {
                    Some(child) => child,
                    None => {
                        return Err(PathError(format!(
                            "child {ix} out of range at depth {} ({len} children)",
                            depth + 1
                        )));
                    }
                }
            }
            Node::Text(_) => {
                return Err(PathError(format!("text leaf at depth {depth} has no children")));
            }
        };
    }
    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        Node::Block(_) => Err(PathError("expected a text leaf".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Block(block) if !block.kind.is_atomic() => Ok(&mut block.children),
        _ => Err(PathError("parent cannot hold children".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let (index, parent_path) = path
        .split_last()
        .ok_or_else(|| PathError("empty insert path".into()))?;
    let children = children_mut(doc, parent_path)?;
    if *index > children.len() {
        return Err(PathError(format!(
            "insert index {index} past the end ({} children)",
            children.len()
        )));
    }
    children.insert(*index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let (index, parent_path) = path
        .split_last()
        .ok_or_else(|| PathError("empty remove path".into()))?;
    let children = children_mut(doc, parent_path)?;
    if *index >= children.len() {
        return Err(PathError(format!(
            "remove index {index} out of range ({} children)",
            children.len()
        )));
    }
    Ok(children.remove(*index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl AttrPatch {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut set = Attrs::new();
        set.insert(key.into(), value.into());
        Self {
            set,
            remove: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}
