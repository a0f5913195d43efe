use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::block_of_kind;
use crate::core::{Block, Editor, Node, Selection};
use crate::error::ApplyError;
use crate::kind::BlockKind;

pub const MIN_IMAGE_WIDTH: f32 = 100.0;

/// The `width` attribute of an image node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageWidth {
    Percent(f32),
    Px(u32),
}

impl Default for ImageWidth {
    fn default() -> Self {
        ImageWidth::Percent(100.0)
    }
}

impl ImageWidth {
    pub fn of(block: &Block) -> Self {
        block
            .attr_str("width")
            .and_then(|w| w.parse().ok())
            .unwrap_or_default()
    }

    /// Width in pixels inside a container `container` pixels wide.
    pub fn resolve(self, container: f32) -> f32 {
        match self {
            ImageWidth::Percent(pct) => container * pct / 100.0,
            ImageWidth::Px(px) => px as f32,
        }
    }
}

impl FromStr for ImageWidth {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let pct = pct.trim().parse::<f32>().map_err(|_| ())?;
            return (pct > 0.0).then_some(ImageWidth::Percent(pct)).ok_or(());
        }
        let px = s.strip_suffix("px").unwrap_or(s).trim();
        let px = px.parse::<f32>().map_err(|_| ())?;
        (px >= 1.0).then(|| ImageWidth::Px(px.round() as u32)).ok_or(())
    }
}

impl fmt::Display for ImageWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageWidth::Percent(pct) => write!(f, "{pct}%"),
            ImageWidth::Px(px) => write!(f, "{px}px"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ResizeDrag {
    handle: ResizeHandle,
    start_x: f32,
    start_width: f32,
    container: f32,
    current: f32,
    moved: bool,
}

/// Local width state of one rendered image. Pointer moves only change this
/// state; the node attribute is written once, on release.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResize {
    width: ImageWidth,
    min_width: f32,
    drag: Option<ResizeDrag>,
}

impl ImageResize {
    pub fn new(block: &Block) -> Self {
        Self::with_min_width(block, MIN_IMAGE_WIDTH)
    }

    pub fn with_min_width(block: &Block, min_width: f32) -> Self {
        Self {
            width: ImageWidth::of(block),
            min_width,
            drag: None,
        }
    }

    /// The width to render, including an in-progress drag.
    pub fn width(&self) -> ImageWidth {
        match self.drag {
            Some(drag) => ImageWidth::Px(drag.current.round() as u32),
            None => self.width,
        }
    }

    pub fn is_resizing(&self) -> bool {
        self.drag.is_some()
    }

    /// Picks up an attribute change made elsewhere (undo, remote update).
    /// Ignored mid-drag so the pointer keeps control.
    pub fn sync(&mut self, block: &Block) {
        if self.drag.is_none() {
            self.width = ImageWidth::of(block);
        }
    }

    pub fn begin(&mut self, handle: ResizeHandle, x: f32, container: f32) {
        let start_width = self.width.resolve(container);
        self.drag = Some(ResizeDrag {
            handle,
            start_x: x,
            start_width,
            container,
            current: start_width,
            moved: false,
        });
    }

    /// Follows the pointer. Returns the clamped width in pixels.
    pub fn drag_to(&mut self, x: f32) -> Option<f32> {
        let min_width = self.min_width;
        let drag = self.drag.as_mut()?;
        let delta = match drag.handle {
            ResizeHandle::Right => x - drag.start_x,
            ResizeHandle::Left => drag.start_x - x,
        };
        let max = drag.container.max(min_width);
        drag.current = (drag.start_width + delta).clamp(min_width, max);
        drag.moved = true;
        Some(drag.current)
    }

    pub fn cancel(&mut self) {
        self.drag = None;
    }

    /// Ends the drag and commits the width to the image at `pos`. Returns
    /// `None` when no drag was running, the pointer never moved, or the
    /// width did not change. A bare click keeps a percentage width.
    pub fn release(&mut self, editor: &mut Editor, pos: usize) -> Result<Option<ImageWidth>, ApplyError> {
        let Some(drag) = self.drag.take() else {
            return Ok(None);
        };
        if !drag.moved {
            return Ok(None);
        }
        let width = ImageWidth::Px(drag.current.round() as u32);
        if width == self.width {
            return Ok(None);
        }
        block_of_kind(editor.doc(), pos, BlockKind::Image)?;
        editor.change("image.resize", |draft| {
            draft.set_attr(pos, "width", width.to_string())
        })?;
        debug!(pos, %width, "image resized");
        self.width = width;
        Ok(Some(width))
    }
}

/// Places an image block at the boundary `pos` and returns where it landed.
/// An empty paragraph starting at `pos` is replaced rather than pushed down.
pub fn insert_image(editor: &mut Editor, pos: usize, src: &str) -> Result<usize, ApplyError> {
    let node = Node::image(src);
    editor
        .change("image.insert", |draft| {
            let empty_paragraph = draft
                .doc()
                .block_at(pos)
                .is_ok_and(|b| b.kind == BlockKind::Paragraph && b.content_size() == 0);
            if empty_paragraph {
                draft.replace_node(pos, vec![node])?;
            } else {
                draft.insert_nodes(pos, vec![node])?;
            }
            draft.set_selection(Selection::collapsed(pos + 1));
            Ok(pos)
        })
        .map(|change| change.value)
}
