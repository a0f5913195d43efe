//! Structural repair passes, run to a fixed point after every change.
//!
//! Each pass looks at an immutable document and returns ops that are valid
//! when applied in order. Passes walk right to left and fix a node's children
//! after its subtree so earlier ops never shift the paths of later ones.

use serde_json::Value;
use tracing::trace;

use crate::core::{AttrPatch, Block, Document, Marks, Node, Selection, TextNode};
use crate::draft::Draft;
use crate::error::ApplyError;
use crate::kind::{
    BlockKind, ContentModel, DEFAULT_CALLOUT_EMOJI, DEFAULT_CALLOUT_KIND, DEFAULT_IMAGE_WIDTH,
    MAX_HEADING_LEVEL, MIN_HEADING_LEVEL,
};
use crate::ops::Op;

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

const PASSES: &[&dyn NormalizePass] = &[
    &EnsureNonEmptyDocument,
    &RepairChildren,
    &FillEmptyBlocks,
    &NormalizeTextLeaves,
    &NormalizeBlockAttrs,
];

pub(crate) fn normalize_draft(draft: &mut Draft, max_iterations: usize) -> Result<(), ApplyError> {
    'iterations: for _ in 0..max_iterations {
        for pass in PASSES {
            let ops = pass.run(draft.doc());
            if ops.is_empty() {
                continue;
            }
            trace!(pass = pass.id(), ops = ops.len(), "normalize");
            for op in ops {
                draft.apply(op)?;
            }
            continue 'iterations;
        }
        return Ok(());
    }
    Err(ApplyError::NormalizeDidNotConverge(max_iterations))
}

/// Normalizes a detached document, e.g. one fresh out of the parser.
pub fn normalize_document(doc: Document, max_iterations: usize) -> Result<Document, ApplyError> {
    let mut draft = Draft::new(doc, Selection::collapsed(0));
    normalize_draft(&mut draft, max_iterations)?;
    let (doc, ..) = draft.into_parts();
    Ok(doc)
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

enum Repair {
    Remove,
    Replace(Vec<Node>),
}

/// Puts every child where its parent allows it: wraps, unwraps or drops.
struct RepairChildren;

impl RepairChildren {
    fn repair(parent: Option<&Block>, child: &Node) -> Option<Repair> {
        let Some(parent) = parent else {
            return match child {
                Node::Text(t) => Some(Repair::Replace(vec![Node::paragraph_with(vec![t.clone()])])),
                Node::Block(b) if b.kind.is_flow() => None,
                Node::Block(b) => Some(Repair::Replace(flatten(b))),
            };
        };

        match parent.kind.spec().content {
            ContentModel::Empty => Some(Repair::Remove),
            ContentModel::Inline | ContentModel::PlainText => match child {
                Node::Text(_) => None,
                Node::Block(b) => {
                    let text = b.text_content();
                    if text.is_empty() {
                        Some(Repair::Remove)
                    } else {
                        Some(Repair::Replace(vec![Node::text(text)]))
                    }
                }
            },
            ContentModel::Blocks => match child {
                Node::Text(t) => {
                    let paragraph = Node::paragraph_with(vec![t.clone()]);
                    Some(Repair::Replace(vec![wrap_for(parent.kind, paragraph)]))
                }
                Node::Block(b) if parent.kind.allows_child(b.kind) => None,
                Node::Block(b) => Some(Repair::Replace(Self::fit(parent.kind, b))),
            },
        }
    }

    fn fit(parent: BlockKind, child: &Block) -> Vec<Node> {
        use BlockKind::*;
        match (parent, child.kind) {
            (BulletList | OrderedList, TaskItem) => vec![retag(child, ListItem)],
            (TaskList, ListItem) => vec![retag(child, TaskItem)],
            (Table, TableHeader | TableCell) => {
                vec![Node::block(TableRow, vec![Node::Block(child.clone())])]
            }
            (_, kind) if kind.is_flow() => vec![wrap_for(parent, Node::Block(child.clone()))],
            _ => flatten(child),
        }
    }
}

impl NormalizePass for RepairChildren {
    fn id(&self) -> &'static str {
        "core.repair_children"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(parent: Option<&Block>, children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, child) in children.iter().enumerate().rev() {
                path.push(ix);
                match RepairChildren::repair(parent, child) {
                    Some(Repair::Remove) => ops.push(Op::RemoveNode { path: path.clone() }),
                    Some(Repair::Replace(nodes)) => {
                        ops.push(Op::RemoveNode { path: path.clone() });
                        for (offset, node) in nodes.into_iter().enumerate() {
                            let mut at = path.clone();
                            if let Some(last) = at.last_mut() {
                                *last += offset;
                            }
                            ops.push(Op::InsertNode { path: at, node });
                        }
                    }
                    None => {
                        if let Node::Block(block) = child {
                            walk(Some(block), &block.children, path, ops);
                        }
                    }
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(None, &doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Wraps a flow node in whatever item the container needs.
fn wrap_for(parent: BlockKind, node: Node) -> Node {
    match parent {
        BlockKind::Table => Node::block(
            BlockKind::TableRow,
            vec![Node::block(BlockKind::TableCell, vec![node])],
        ),
        kind => match kind.item_wrapper() {
            Some(wrapper) => Node::block(wrapper, vec![node]),
            None => node,
        },
    }
}

fn retag(block: &Block, kind: BlockKind) -> Node {
    Node::Block(Block::with_children(kind, block.children.clone()))
}

/// The flow content of a misplaced container, with the container peeled off.
fn flatten(block: &Block) -> Vec<Node> {
    let mut out = Vec::new();
    for child in &block.children {
        match child {
            Node::Block(b) if b.kind.is_flow() => out.push(child.clone()),
            Node::Block(b) => out.extend(flatten(b)),
            Node::Text(t) => out.push(Node::paragraph_with(vec![t.clone()])),
        }
    }
    out
}

/// Empty containers either disappear or get an empty paragraph; textblocks
/// always keep at least one text leaf.
struct FillEmptyBlocks;

impl NormalizePass for FillEmptyBlocks {
    fn id(&self) -> &'static str {
        "core.fill_empty_blocks"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, child) in children.iter().enumerate().rev() {
                let Node::Block(block) = child else {
                    continue;
                };
                path.push(ix);
                let spec = block.kind.spec();
                if block.children.is_empty() {
                    match spec.content {
                        ContentModel::Blocks if spec.remove_when_empty => {
                            ops.push(Op::RemoveNode { path: path.clone() });
                        }
                        ContentModel::Blocks => {
                            let mut at = path.clone();
                            at.push(0);
                            ops.push(Op::InsertNode {
                                path: at,
                                node: Node::paragraph(""),
                            });
                        }
                        ContentModel::Inline | ContentModel::PlainText => {
                            let mut at = path.clone();
                            at.push(0);
                            ops.push(Op::InsertNode {
                                path: at,
                                node: Node::text(""),
                            });
                        }
                        ContentModel::Empty => {}
                    }
                } else {
                    walk(&block.children, path, ops);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Merges neighbouring runs with equal marks, drops empty runs that have
/// company, and strips marks inside code blocks.
struct NormalizeTextLeaves;

impl NormalizeTextLeaves {
    fn canonical(block: &Block) -> Vec<TextNode> {
        let strip = block.kind.spec().content == ContentModel::PlainText;
        let mut runs: Vec<TextNode> = Vec::new();
        for run in block.inline_runs() {
            let marks = if strip { Marks::default() } else { run.marks };
            if run.text.is_empty() {
                continue;
            }
            match runs.last_mut() {
                Some(last) if last.marks == marks => last.text.push_str(&run.text),
                _ => runs.push(TextNode {
                    text: run.text,
                    marks,
                }),
            }
        }
        if runs.is_empty() {
            let marks = match block.children.first() {
                Some(Node::Text(t)) if !strip => t.marks,
                _ => Marks::default(),
            };
            runs.push(TextNode {
                text: String::new(),
                marks,
            });
        }
        runs
    }
}

impl NormalizePass for NormalizeTextLeaves {
    fn id(&self) -> &'static str {
        "core.normalize_text_leaves"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();
        for range in doc.textblocks().into_iter().rev() {
            let Some(block) = doc.block_at_path(&range.path) else {
                continue;
            };
            if block.children.is_empty() || block.children.iter().any(|n| n.as_text().is_none()) {
                continue;
            }
            let runs = Self::canonical(block);
            let current = block.inline_runs();
            if runs == current {
                continue;
            }
            for ix in (0..current.len()).rev() {
                let mut path = range.path.clone();
                path.push(ix);
                ops.push(Op::RemoveNode { path });
            }
            for (ix, run) in runs.into_iter().enumerate() {
                let mut path = range.path.clone();
                path.push(ix);
                ops.push(Op::InsertNode {
                    path,
                    node: Node::Text(run),
                });
            }
        }
        ops
    }
}

/// Fills missing attributes and clamps the ones with a closed range.
struct NormalizeBlockAttrs;

impl NormalizeBlockAttrs {
    fn patch(block: &Block) -> AttrPatch {
        let mut patch = AttrPatch::default();
        for (key, value) in block.kind.default_attrs() {
            if !block.attrs.contains_key(&key) {
                patch.set.insert(key, value);
            }
        }

        match block.kind {
            BlockKind::Heading => {
                let level = block.attrs.get("level").and_then(Value::as_u64);
                let clamped = level
                    .unwrap_or(MIN_HEADING_LEVEL)
                    .clamp(MIN_HEADING_LEVEL, MAX_HEADING_LEVEL);
                if level != Some(clamped) {
                    patch.set.insert("level".into(), Value::from(clamped));
                }
            }
            BlockKind::OrderedList => {
                if block.attrs.get("start").and_then(Value::as_u64).is_none() {
                    patch.set.insert("start".into(), Value::from(1u64));
                }
            }
            BlockKind::TaskItem => {
                if block.attr_bool("checked").is_none() {
                    patch.set.insert("checked".into(), Value::Bool(false));
                }
            }
            BlockKind::Toggle => {
                if block.attr_bool("isOpen").is_none() {
                    patch.set.insert("isOpen".into(), Value::Bool(true));
                }
            }
            BlockKind::Callout => {
                if block.attr_str("emoji").is_none_or(str::is_empty) {
                    patch.set.insert("emoji".into(), Value::from(DEFAULT_CALLOUT_EMOJI));
                }
                if block.attr_str("calloutKind").is_none_or(str::is_empty) {
                    patch
                        .set
                        .insert("calloutKind".into(), Value::from(DEFAULT_CALLOUT_KIND));
                }
            }
            BlockKind::Image => {
                if block.attr_str("width").is_none_or(str::is_empty) {
                    patch.set.insert("width".into(), Value::from(DEFAULT_IMAGE_WIDTH));
                }
            }
            _ => {}
        }
        patch
    }
}

impl NormalizePass for NormalizeBlockAttrs {
    fn id(&self) -> &'static str {
        "core.normalize_block_attrs"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, child) in children.iter().enumerate() {
                let Node::Block(block) = child else {
                    continue;
                };
                path.push(ix);
                let patch = NormalizeBlockAttrs::patch(block);
                if !patch.is_empty() {
                    ops.push(Op::SetNodeAttrs {
                        path: path.clone(),
                        patch,
                    });
                }
                walk(&block.children, path, ops);
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(children: Vec<Node>) -> Document {
        match normalize_document(Document::new(children), 100) {
            Ok(doc) => doc,
            Err(err) => panic!("normalize failed: {err}"),
        }
    }

    #[test]
    fn empty_document_gets_a_paragraph() {
        let doc = normalized(Vec::new());
        assert_eq!(doc, Document::empty());
    }

    #[test]
    fn paragraph_inside_list_is_wrapped_in_item() {
        let doc = normalized(vec![Node::block(
            BlockKind::BulletList,
            vec![Node::paragraph("loose")],
        )]);
        let list = doc.block_at_path(&[0]).map(|b| b.kind);
        let item = doc.block_at_path(&[0, 0]).map(|b| b.kind);
        assert_eq!(list, Some(BlockKind::BulletList));
        assert_eq!(item, Some(BlockKind::ListItem));
        assert_eq!(doc.children[0].text_content(), "loose");
    }

    #[test]
    fn empty_list_is_removed_and_heading_level_clamped() {
        let mut heading = Block::with_children(BlockKind::Heading, vec![Node::text("Big")]);
        heading.attrs.insert("level".into(), Value::from(6u64));
        let doc = normalized(vec![
            Node::block(BlockKind::OrderedList, Vec::new()),
            Node::Block(heading),
        ]);
        assert_eq!(doc.children.len(), 1);
        assert_eq!(doc.block_at_path(&[0]).and_then(Block::heading_level), Some(3));
    }

    #[test]
    fn code_block_runs_lose_their_marks() {
        let doc = normalized(vec![Node::block(
            BlockKind::CodeBlock,
            vec![
                Node::styled("let ", Marks::default().with(crate::MarkKind::Bold)),
                Node::text("x"),
            ],
        )]);
        let block = doc.block_at_path(&[0]);
        let runs = block.map(Block::inline_runs).unwrap_or_default();
        assert_eq!(runs, vec![TextNode::plain("let x")]);
    }
}
