//! Block-level operations addressed by the position right before a block.
//!
//! Every operation runs as one editor change, so it either lands completely
//! or leaves the document as it was. Problems with the request itself (stale
//! position, nothing to swap with) come back as [`BlockOutcome::NoOp`].

use tracing::debug;
use uuid::Uuid;

use crate::core::{Block, Editor, Node, Selection, TextNode};
use crate::draft::Draft;
use crate::error::{ApplyError, PositionError};
use crate::kind::{BlockKind, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL};

/// Vertical extent of a rendered block, reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLayout {
    pub pos: usize,
    pub top: f32,
    pub height: f32,
}

impl BlockLayout {
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn midpoint(&self) -> f32 {
        self.top + self.height / 2.0
    }

    fn distance_to(&self, y: f32) -> f32 {
        if y < self.top {
            self.top - y
        } else if y > self.bottom() {
            y - self.bottom()
        } else {
            0.0
        }
    }
}

/// The block under `y`, or the nearest one when `y` falls between blocks.
pub fn block_at_y(layouts: &[BlockLayout], y: f32) -> Option<usize> {
    layouts
        .iter()
        .min_by(|a, b| a.distance_to(y).total_cmp(&b.distance_to(y)))
        .map(|layout| layout.pos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnIntoTarget {
    Paragraph,
    Heading(u8),
    BulletList,
    OrderedList,
    TaskList,
    Blockquote,
    CodeBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    AtStart,
    AtEnd,
    StalePosition,
    Unsupported,
    SameBoundary,
    NoTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Moved { pos: usize },
    Duplicated { pos: usize },
    Deleted { pos: usize },
    Turned { pos: usize },
    NoOp(NoOpReason),
}

impl BlockOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, BlockOutcome::NoOp(_))
    }
}

fn stale(err: ApplyError) -> BlockOutcome {
    debug!(%err, "block operation hit a stale position");
    BlockOutcome::NoOp(NoOpReason::StalePosition)
}

/// Keeps a selection that sat inside a moved block inside it.
pub(crate) fn carry_selection(selection: Selection, from: usize, size: usize, to: usize) -> Option<Selection> {
    let inside = |p: usize| p > from && p < from + size;
    let shift = |p: usize| p - from + to;
    match (inside(selection.anchor), inside(selection.head)) {
        (true, true) => Some(Selection::new(shift(selection.anchor), shift(selection.head))),
        (false, true) => Some(Selection::collapsed(shift(selection.head))),
        (true, false) => Some(Selection::collapsed(shift(selection.anchor))),
        (false, false) => None,
    }
}

pub fn move_up(editor: &mut Editor, pos: usize) -> BlockOutcome {
    let doc = editor.doc();
    let Ok(path) = doc.block_path_at(pos) else {
        return BlockOutcome::NoOp(NoOpReason::StalePosition);
    };
    let Some((&index, parent)) = path.split_last() else {
        return BlockOutcome::NoOp(NoOpReason::StalePosition);
    };
    if index == 0 {
        debug!(pos, "move up at start, nothing to do");
        return BlockOutcome::NoOp(NoOpReason::AtStart);
    }
    let target = doc.child_positions(parent)[index - 1];
    let size = doc.node_at_path(&path).map(Node::size).unwrap_or(0);
    let carried = carry_selection(*editor.selection(), pos, size, target);

    let result = editor.change("block.move_up", |draft| {
        let node = draft.delete_node(pos)?;
        draft.insert_nodes(target, vec![node])?;
        if let Some(selection) = carried {
            draft.set_selection(selection);
        }
        Ok(())
    });
    match result {
        Ok(_) => BlockOutcome::Moved { pos: target },
        Err(err) => stale(err),
    }
}

pub fn move_down(editor: &mut Editor, pos: usize) -> BlockOutcome {
    let doc = editor.doc();
    let Ok(path) = doc.block_path_at(pos) else {
        return BlockOutcome::NoOp(NoOpReason::StalePosition);
    };
    let Some((&index, parent)) = path.split_last() else {
        return BlockOutcome::NoOp(NoOpReason::StalePosition);
    };
    let siblings = doc.children_at(parent).map(<[Node]>::len).unwrap_or(0);
    if index + 1 >= siblings {
        debug!(pos, "move down at end, nothing to do");
        return BlockOutcome::NoOp(NoOpReason::AtEnd);
    }
    let mut next_path = parent.to_vec();
    next_path.push(index + 1);
    let next_size = doc.node_at_path(&next_path).map(Node::size).unwrap_or(0);
    let size = doc.node_at_path(&path).map(Node::size).unwrap_or(0);
    let target = pos + next_size;
    let carried = carry_selection(*editor.selection(), pos, size, target);

    let result = editor.change("block.move_down", |draft| {
        let node = draft.delete_node(pos)?;
        draft.insert_nodes(target, vec![node])?;
        if let Some(selection) = carried {
            draft.set_selection(selection);
        }
        Ok(())
    });
    match result {
        Ok(_) => BlockOutcome::Moved { pos: target },
        Err(err) => stale(err),
    }
}

pub fn duplicate(editor: &mut Editor, pos: usize) -> BlockOutcome {
    let result = editor.change("block.duplicate", |draft| {
        let path = draft.doc().block_path_at(pos)?;
        let mut node = draft
            .doc()
            .node_at_path(&path)
            .cloned()
            .ok_or(PositionError::NotABlock(pos))?;
        let at = pos + node.size();
        refresh_prompt_ids(&mut node);
        draft.insert_nodes(at, vec![node])?;
        Ok(at)
    });
    match result {
        Ok(change) => BlockOutcome::Duplicated { pos: change.value },
        Err(err) => stale(err),
    }
}

/// Prompt nodes are matched to responses by id, so clones need their own.
pub(crate) fn refresh_prompt_ids(node: &mut Node) {
    if let Node::Block(block) = node {
        if block.kind == BlockKind::AiPrompt {
            block
                .attrs
                .insert("promptId".into(), Uuid::new_v4().to_string().into());
        }
        for child in &mut block.children {
            refresh_prompt_ids(child);
        }
    }
}

/// Removes the block and its subtree. Removing the last block leaves an
/// empty paragraph behind.
pub fn delete(editor: &mut Editor, pos: usize) -> BlockOutcome {
    let result = editor.change("block.delete", |draft| {
        draft.delete_node(pos)?;
        Ok(())
    });
    match result {
        Ok(_) => BlockOutcome::Deleted { pos },
        Err(err) => stale(err),
    }
}

pub fn turn_into(editor: &mut Editor, pos: usize, target: TurnIntoTarget) -> BlockOutcome {
    let result = editor.change("block.turn_into", |draft| turn_into_in(draft, pos, target));
    match result {
        Ok(change) if change.value => BlockOutcome::Turned { pos },
        Ok(_) => {
            debug!(pos, ?target, "block cannot be turned into target");
            BlockOutcome::NoOp(NoOpReason::Unsupported)
        }
        Err(err) => stale(err),
    }
}

/// Replaces the block at `pos` with `target`, carrying its inline content.
/// Returns false when the block has no inline content to carry.
pub(crate) fn turn_into_in(draft: &mut Draft, pos: usize, target: TurnIntoTarget) -> Result<bool, ApplyError> {
    let block = draft.doc().block_at(pos)?.clone();
    let Some(lines) = inline_lines(&block) else {
        return Ok(false);
    };
    if already_is(&block, target) {
        return Ok(true);
    }

    let cursor = cursor_line(draft, pos, &block);
    let line_lens: Vec<usize> = lines
        .iter()
        .map(|line| line.iter().map(TextNode::len).sum())
        .collect();
    let merged = matches!(
        target,
        TurnIntoTarget::Paragraph | TurnIntoTarget::Heading(_) | TurnIntoTarget::CodeBlock
    );
    draft.replace_node(pos, vec![build_target(target, lines)])?;

    let ranges: Vec<_> = draft
        .doc()
        .textblocks()
        .into_iter()
        .filter(|r| r.start > pos)
        .collect();
    let head = match cursor {
        Some((line, offset)) if merged => {
            let before: usize = line_lens.iter().take(line).map(|len| len + 1).sum();
            ranges.first().map(|r| (r.start + before + offset).min(r.end))
        }
        Some((line, offset)) => ranges.get(line).map(|r| (r.start + offset).min(r.end)),
        None => None,
    };
    if let Some(head) = head.or_else(|| ranges.first().map(|r| r.start)) {
        draft.set_selection(Selection::collapsed(head));
    }
    Ok(true)
}

/// The inline runs of every textblock in the block, one entry per line.
/// `None` for blocks with nothing that can be carried over.
fn inline_lines(block: &Block) -> Option<Vec<Vec<TextNode>>> {
    match block.kind {
        BlockKind::Paragraph | BlockKind::Heading | BlockKind::Callout => {
            Some(vec![block.inline_runs()])
        }
        BlockKind::CodeBlock => Some(
            block
                .text_content()
                .split('\n')
                .map(|line| vec![TextNode::plain(line)])
                .collect(),
        ),
        BlockKind::Blockquote
        | BlockKind::BulletList
        | BlockKind::OrderedList
        | BlockKind::TaskList
        | BlockKind::ListItem
        | BlockKind::TaskItem => {
            let mut lines = Vec::new();
            collect_lines(block, &mut lines);
            (!lines.is_empty()).then_some(lines)
        }
        _ => None,
    }
}

fn collect_lines(block: &Block, out: &mut Vec<Vec<TextNode>>) {
    for child in block.children.iter().filter_map(Node::as_block) {
        if child.kind.is_textblock() {
            if let Some(lines) = inline_lines(child) {
                out.extend(lines);
            }
        } else if !child.kind.is_atomic() {
            collect_lines(child, out);
        }
    }
}

fn already_is(block: &Block, target: TurnIntoTarget) -> bool {
    match target {
        TurnIntoTarget::Paragraph => block.kind == BlockKind::Paragraph,
        TurnIntoTarget::Heading(level) => block.heading_level() == Some(clamp_level(level)),
        TurnIntoTarget::BulletList => block.kind == BlockKind::BulletList,
        TurnIntoTarget::OrderedList => block.kind == BlockKind::OrderedList,
        TurnIntoTarget::TaskList => block.kind == BlockKind::TaskList,
        TurnIntoTarget::Blockquote => block.kind == BlockKind::Blockquote,
        TurnIntoTarget::CodeBlock => block.kind == BlockKind::CodeBlock,
    }
}

fn clamp_level(level: u8) -> u64 {
    u64::from(level).clamp(MIN_HEADING_LEVEL, MAX_HEADING_LEVEL)
}

/// Lines joined into a single run list, separated by soft breaks.
fn merged_runs(lines: Vec<Vec<TextNode>>) -> Vec<Node> {
    let mut runs = Vec::new();
    for (ix, line) in lines.into_iter().enumerate() {
        if ix > 0 {
            runs.push(Node::text("\n"));
        }
        runs.extend(line.into_iter().map(Node::Text));
    }
    runs
}

fn build_target(target: TurnIntoTarget, lines: Vec<Vec<TextNode>>) -> Node {
    match target {
        TurnIntoTarget::Paragraph => Node::block(BlockKind::Paragraph, merged_runs(lines)),
        TurnIntoTarget::Heading(level) => {
            let mut block = Block::with_children(BlockKind::Heading, merged_runs(lines));
            block
                .attrs
                .insert("level".into(), clamp_level(level).into());
            Node::Block(block)
        }
        TurnIntoTarget::BulletList | TurnIntoTarget::OrderedList | TurnIntoTarget::TaskList => {
            let (list, item) = match target {
                TurnIntoTarget::OrderedList => (BlockKind::OrderedList, BlockKind::ListItem),
                TurnIntoTarget::TaskList => (BlockKind::TaskList, BlockKind::TaskItem),
                _ => (BlockKind::BulletList, BlockKind::ListItem),
            };
            Node::block(
                list,
                lines
                    .into_iter()
                    .map(|line| Node::block(item, vec![Node::paragraph_with(line)]))
                    .collect(),
            )
        }
        TurnIntoTarget::Blockquote => Node::block(
            BlockKind::Blockquote,
            lines.into_iter().map(Node::paragraph_with).collect(),
        ),
        TurnIntoTarget::CodeBlock => {
            let text = lines
                .iter()
                .map(|line| line.iter().map(|run| run.text.as_str()).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n");
            Node::code_block(text, None)
        }
    }
}

/// Which line of the block holds the cursor, and how far into it.
fn cursor_line(draft: &Draft, pos: usize, block: &Block) -> Option<(usize, usize)> {
    let head = draft.selection().head;
    if head <= pos || head >= pos + block.size() {
        return None;
    }
    if block.kind == BlockKind::CodeBlock {
        let offset = head - (pos + 1);
        let text = block.text_content();
        let before: String = text.chars().take(offset).collect();
        let line = before.matches('\n').count();
        let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
        return Some((line, col));
    }
    draft
        .doc()
        .textblocks()
        .into_iter()
        .filter(|r| r.start > pos && r.end < pos + block.size())
        .enumerate()
        .find(|(_, r)| head >= r.start && head <= r.end)
        .map(|(line, r)| (line, head - r.start))
}
