//! Flattened position addressing.
//!
//! Text contributes one position per character, an atomic block is a single
//! position, and every other block adds an opening and a closing position
//! around its content. Position 0 is the start of the document content.

use crate::core::{Block, Document, Node};
use crate::error::PositionError;

/// A position resolved against one particular document. It is only valid for
/// that document; after any change, map the raw position and resolve again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPos {
    pub pos: usize,
    /// Path of the innermost block whose content holds `pos`. Empty when the
    /// position sits directly in the document.
    pub path: Vec<usize>,
    /// Index of the child `pos` points into or sits before.
    pub index: usize,
    /// Offset into the text leaf at `index`, when `pos` is inside text.
    pub text_offset: usize,
    starts: Vec<usize>,
    ends: Vec<usize>,
}

impl ResolvedPos {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Content start of the ancestor at `depth` (0 is the document).
    pub fn start(&self, depth: usize) -> usize {
        self.starts[depth.min(self.depth())]
    }

    /// Content end of the ancestor at `depth`.
    pub fn end(&self, depth: usize) -> usize {
        self.ends[depth.min(self.depth())]
    }

    /// Position right before the ancestor block at `depth` (`depth >= 1`).
    pub fn before(&self, depth: usize) -> usize {
        self.start(depth.max(1)) - 1
    }

    /// Position right after the ancestor block at `depth` (`depth >= 1`).
    pub fn after(&self, depth: usize) -> usize {
        self.end(depth.max(1)) + 1
    }

    /// Offset of `pos` within the content of its parent block.
    pub fn parent_offset(&self) -> usize {
        self.pos - self.start(self.depth())
    }

    pub fn node_path(&self, depth: usize) -> &[usize] {
        &self.path[..depth.min(self.depth())]
    }

    pub fn parent<'a>(&self, doc: &'a Document) -> Option<&'a Block> {
        doc.block_at_path(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextblockRange {
    pub path: Vec<usize>,
    pub start: usize,
    pub end: usize,
}

impl Document {
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, PositionError> {
        let size = self.content_size();
        if pos > size {
            return Err(PositionError::OutOfRange { pos, size });
        }

        let mut path = Vec::new();
        let mut starts = vec![0];
        let mut ends = vec![size];
        let mut children: &[Node] = &self.children;
        let mut start = 0;

        'descend: loop {
            let mut offset = start;
            for (ix, child) in children.iter().enumerate() {
                if pos == offset {
                    return Ok(ResolvedPos {
                        pos,
                        path,
                        index: ix,
                        text_offset: 0,
                        starts,
                        ends,
                    });
                }
                let child_size = child.size();
                if pos < offset + child_size {
                    match child {
                        Node::Text(_) => {
                            return Ok(ResolvedPos {
                                pos,
                                path,
                                index: ix,
                                text_offset: pos - offset,
                                starts,
                                ends,
                            });
                        }
                        Node::Block(block) => {
                            path.push(ix);
                            start = offset + 1;
                            starts.push(start);
                            ends.push(start + block.content_size());
                            children = &block.children;
                            continue 'descend;
                        }
                    }
                }
                offset += child_size;
            }
            return Ok(ResolvedPos {
                pos,
                path,
                index: children.len(),
                text_offset: 0,
                starts,
                ends,
            });
        }
    }

    /// Position right before the node at `path`. A path one past the last
    /// child of a container yields that container's content end.
    pub fn pos_of_path(&self, path: &[usize]) -> Option<usize> {
        let (last, parents) = path.split_last()?;
        let mut pos = 0;
        let mut children: &[Node] = &self.children;
        for &ix in parents {
            let node = children.get(ix)?;
            pos += children[..ix].iter().map(Node::size).sum::<usize>() + 1;
            match node {
                Node::Block(block) if !block.kind.is_atomic() => children = &block.children,
                _ => return None,
            }
        }
        if *last > children.len() {
            return None;
        }
        Some(pos + children[..*last].iter().map(Node::size).sum::<usize>())
    }

    /// Path of the block that starts exactly at `pos`.
    pub fn block_path_at(&self, pos: usize) -> Result<Vec<usize>, PositionError> {
        let resolved = self.resolve(pos)?;
        if resolved.text_offset > 0 {
            return Err(PositionError::InsideText(pos));
        }
        let children = self
            .children_at(&resolved.path)
            .ok_or(PositionError::NotABlock(pos))?;
        match children.get(resolved.index) {
            Some(Node::Block(_)) => {
                let mut path = resolved.path;
                path.push(resolved.index);
                Ok(path)
            }
            _ => Err(PositionError::NotABlock(pos)),
        }
    }

    pub fn block_at(&self, pos: usize) -> Result<&Block, PositionError> {
        let path = self.block_path_at(pos)?;
        self.block_at_path(&path)
            .ok_or(PositionError::NotABlock(pos))
    }

    /// The textblock whose content holds `pos`.
    pub fn textblock_at(&self, pos: usize) -> Result<TextblockRange, PositionError> {
        let resolved = self.resolve(pos)?;
        match resolved.parent(self) {
            Some(block) if block.kind.is_textblock() => {
                let depth = resolved.depth();
                Ok(TextblockRange {
                    start: resolved.start(depth),
                    end: resolved.end(depth),
                    path: resolved.path,
                })
            }
            _ => Err(PositionError::NotInTextblock(pos)),
        }
    }

    /// Content ranges of every textblock, in document order.
    pub fn textblocks(&self) -> Vec<TextblockRange> {
        fn walk(children: &[Node], start: usize, path: &mut Vec<usize>, out: &mut Vec<TextblockRange>) {
            let mut offset = start;
            for (ix, child) in children.iter().enumerate() {
                if let Node::Block(block) = child {
                    if block.kind.is_textblock() {
                        path.push(ix);
                        out.push(TextblockRange {
                            path: path.clone(),
                            start: offset + 1,
                            end: offset + 1 + block.content_size(),
                        });
                        path.pop();
                    } else if !block.kind.is_atomic() {
                        path.push(ix);
                        walk(&block.children, offset + 1, path, out);
                        path.pop();
                    }
                }
                offset += child.size();
            }
        }

        let mut out = Vec::new();
        walk(&self.children, 0, &mut Vec::new(), &mut out);
        out
    }

    /// The closest position that lies inside a textblock.
    pub fn nearest_text_pos(&self, pos: usize) -> usize {
        let mut best: Option<(usize, usize)> = None;
        for range in self.textblocks() {
            let candidate = pos.clamp(range.start, range.end);
            let distance = candidate.abs_diff(pos);
            if distance == 0 {
                return candidate;
            }
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        best.map(|(p, _)| p)
            .unwrap_or_else(|| pos.min(self.content_size()))
    }

    /// Start positions of the direct children of the container at `path`.
    pub fn child_positions(&self, path: &[usize]) -> Vec<usize> {
        let Some(children) = self.children_at(path) else {
            return Vec::new();
        };
        let base = if path.is_empty() {
            0
        } else {
            match self.pos_of_path(path) {
                Some(pos) => pos + 1,
                None => return Vec::new(),
            }
        };
        let mut offset = base;
        children
            .iter()
            .map(|child| {
                let start = offset;
                offset += child.size();
                start
            })
            .collect()
    }
}

/// Which side a position sticks to when content is inserted right at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    /// The position was strictly inside a removed range.
    pub deleted: bool,
}

/// One replaced range: `old_len` positions at `start` became `new_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMap {
    pub start: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl StepMap {
    pub fn new(start: usize, old_len: usize, new_len: usize) -> Self {
        Self {
            start,
            old_len,
            new_len,
        }
    }

    pub fn identity() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }

    pub fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let end = self.start + self.old_len;
        if pos < self.start {
            return MapResult { pos, deleted: false };
        }
        if pos > end {
            return MapResult {
                pos: pos - self.old_len + self.new_len,
                deleted: false,
            };
        }
        let side = if self.old_len == 0 {
            assoc
        } else if pos == self.start {
            Assoc::Left
        } else if pos == end {
            Assoc::Right
        } else {
            assoc
        };
        let mapped = match side {
            Assoc::Left => self.start,
            Assoc::Right => self.start + self.new_len,
        };
        MapResult {
            pos: mapped,
            deleted: pos > self.start && pos < end,
        }
    }
}

/// Composition of step maps, in the order the steps were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    pub fn extend(&mut self, other: &Mapping) {
        self.maps.extend(other.maps.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }

    pub fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut deleted = false;
        let mut pos = pos;
        for step in &self.maps {
            let result = step.map_result(pos, assoc);
            deleted |= result.deleted;
            pos = result.pos;
        }
        MapResult { pos, deleted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_respects_association() {
        let map = StepMap::new(4, 0, 3);
        assert_eq!(map.map(4, Assoc::Left), 4);
        assert_eq!(map.map(4, Assoc::Right), 7);
        assert_eq!(map.map(2, Assoc::Right), 2);
        assert_eq!(map.map(5, Assoc::Left), 8);
    }

    #[test]
    fn deletion_collapses_inner_positions() {
        let map = StepMap::new(2, 4, 0);
        let inner = map.map_result(4, Assoc::Right);
        assert_eq!(inner, MapResult { pos: 2, deleted: true });
        assert_eq!(map.map(6, Assoc::Left), 2);
        assert_eq!(map.map(9, Assoc::Left), 5);
    }
}
