//! Slash-command menu: trigger detection, filtering, keyboard navigation and
//! command execution.

use std::sync::LazyLock;

use regex::Regex;
use strum::{Display, EnumIter, IntoEnumIterator as _};
use tracing::debug;
use uuid::Uuid;

use crate::blocks::{turn_into_in, TurnIntoTarget};
use crate::core::{Document, Editor, Node, Selection};
use crate::draft::Draft;
use crate::error::{ApplyError, PositionError};
use crate::kind::BlockKind;

/// `/` at the start of a block or after whitespace, then word characters up
/// to the cursor.
static TRIGGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)/(\w*)$").expect("valid slash trigger regex"));

pub const CALLOUT_PLACEHOLDER: &str = "Type your callout here...";

const TABLE_ROWS: usize = 3;
const TABLE_COLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SlashCommand {
    #[strum(to_string = "Heading 1")]
    Heading1,
    #[strum(to_string = "Heading 2")]
    Heading2,
    #[strum(to_string = "Heading 3")]
    Heading3,
    #[strum(to_string = "Bullet List")]
    BulletList,
    #[strum(to_string = "Numbered List")]
    NumberedList,
    #[strum(to_string = "Task List")]
    TaskList,
    #[strum(to_string = "Code Block")]
    CodeBlock,
    #[strum(to_string = "Quote")]
    Quote,
    #[strum(to_string = "Divider")]
    Divider,
    #[strum(to_string = "Table")]
    Table,
    #[strum(to_string = "Callout")]
    Callout,
    #[strum(to_string = "Toggle")]
    Toggle,
    #[strum(to_string = "Image")]
    Image,
    #[strum(to_string = "AI Prompt")]
    AiPrompt,
    #[strum(to_string = "AI Enhance")]
    AiEnhance,
}

impl SlashCommand {
    /// Every command, in menu order.
    pub fn registry() -> Vec<SlashCommand> {
        SlashCommand::iter().collect()
    }

    pub fn name(self) -> String {
        self.to_string()
    }

    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Heading1 => "Big section heading",
            SlashCommand::Heading2 => "Medium section heading",
            SlashCommand::Heading3 => "Small section heading",
            SlashCommand::BulletList => "Create a simple bullet list",
            SlashCommand::NumberedList => "Create a list with numbering",
            SlashCommand::TaskList => "Track tasks with a checklist",
            SlashCommand::CodeBlock => "Capture a code snippet",
            SlashCommand::Quote => "Capture a quote",
            SlashCommand::Divider => "Visually divide blocks",
            SlashCommand::Table => "Insert a table",
            SlashCommand::Callout => "Make writing stand out",
            SlashCommand::Toggle => "Collapsible content",
            SlashCommand::Image => "Upload an image",
            SlashCommand::AiPrompt => "Ask AI to write something",
            SlashCommand::AiEnhance => "Improve the whole description",
        }
    }

    /// Extra search terms shown alongside the name.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            SlashCommand::Heading1 => &["h1", "title", "big"],
            SlashCommand::Heading2 => &["h2", "subtitle", "medium"],
            SlashCommand::Heading3 => &["h3", "subheading", "small"],
            SlashCommand::BulletList => &["unordered", "ul", "point"],
            SlashCommand::NumberedList => &["ordered", "ol", "numbers"],
            SlashCommand::TaskList => &["todo", "checkbox", "check"],
            SlashCommand::CodeBlock => &["code", "pre", "snippet"],
            SlashCommand::Quote => &["blockquote", "citation"],
            SlashCommand::Divider => &["hr", "line", "separator"],
            SlashCommand::Table => &["grid", "rows", "columns"],
            SlashCommand::Callout => &["note", "info", "warning", "tip"],
            SlashCommand::Toggle => &["collapse", "details", "expand"],
            SlashCommand::Image => &["picture", "photo", "upload"],
            SlashCommand::AiPrompt => &["ai", "ask", "generate", "write"],
            SlashCommand::AiEnhance => &["ai", "improve", "polish", "rewrite"],
        }
    }
}

/// The commands of `registry` whose name contains `query`, ignoring case,
/// in registry order.
pub fn filter_commands(registry: &[SlashCommand], query: &str) -> Vec<SlashCommand> {
    let query = query.to_lowercase();
    registry
        .iter()
        .copied()
        .filter(|command| command.name().to_lowercase().contains(&query))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashState {
    Idle,
    /// `from..to` covers the `/query` text in the document.
    Filtering { query: String, from: usize, to: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashKey {
    Up,
    Down,
    Enter,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    /// The menu did not want the key; the editor handles it normally.
    Ignored,
    Handled,
    Execute(SlashCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashOutcome {
    Applied { command: SlashCommand },
    PromptInserted { prompt_id: Uuid, pos: usize },
    /// The host should pick and upload an image, then insert it at
    /// `insert_pos` (mapped through any edits made in the meantime).
    RequestImage { insert_pos: usize },
    RequestEnhance,
    /// The menu was not open, or its range no longer matches the document.
    Inactive,
}

#[derive(Debug, Clone)]
pub struct SlashMenu {
    registry: Vec<SlashCommand>,
    state: SlashState,
    selected: usize,
}

impl Default for SlashMenu {
    fn default() -> Self {
        Self::new(SlashCommand::registry())
    }
}

impl SlashMenu {
    pub fn new(registry: Vec<SlashCommand>) -> Self {
        Self {
            registry,
            state: SlashState::Idle,
            selected: 0,
        }
    }

    pub fn state(&self) -> &SlashState {
        &self.state
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn visible_commands(&self) -> Vec<SlashCommand> {
        match &self.state {
            SlashState::Idle => Vec::new(),
            SlashState::Filtering { query, .. } => filter_commands(&self.registry, query),
        }
    }

    /// Filtering with nothing to show keeps the state but hides the menu.
    pub fn is_visible(&self) -> bool {
        !self.visible_commands().is_empty()
    }

    pub fn selected_command(&self) -> Option<SlashCommand> {
        self.visible_commands().get(self.selected).copied()
    }

    /// Re-scans the text before the cursor. Call after every content change.
    pub fn on_text_change(&mut self, doc: &Document, selection: &Selection) {
        match detect_trigger(doc, selection) {
            Some((query, from, to)) => {
                let changed = !matches!(&self.state, SlashState::Filtering { query: q, .. } if *q == query);
                if changed {
                    self.selected = 0;
                }
                self.state = SlashState::Filtering { query, from, to };
            }
            None => self.cancel(),
        }
    }

    pub fn on_key(&mut self, key: SlashKey) -> KeyResult {
        if self.state == SlashState::Idle {
            return KeyResult::Ignored;
        }
        if key == SlashKey::Escape {
            self.cancel();
            return KeyResult::Handled;
        }
        let len = self.visible_commands().len();
        if len == 0 {
            return KeyResult::Ignored;
        }
        match key {
            SlashKey::Up => {
                self.selected = (self.selected + len - 1) % len;
                KeyResult::Handled
            }
            SlashKey::Down => {
                self.selected = (self.selected + 1) % len;
                KeyResult::Handled
            }
            SlashKey::Enter => self
                .selected_command()
                .map_or(KeyResult::Ignored, KeyResult::Execute),
            SlashKey::Escape => KeyResult::Handled,
        }
    }

    /// Pointer selection of a visible entry.
    pub fn select(&mut self, index: usize) -> Option<SlashCommand> {
        let command = self.visible_commands().get(index).copied()?;
        self.selected = index;
        Some(command)
    }

    pub fn cancel(&mut self) {
        self.state = SlashState::Idle;
        self.selected = 0;
    }

    /// Deletes the `/query` text and applies `command`, as one change. The
    /// menu returns to idle whatever happens.
    pub fn execute(&mut self, editor: &mut Editor, command: SlashCommand) -> Result<SlashOutcome, ApplyError> {
        let SlashState::Filtering { query, from, to } = std::mem::replace(&mut self.state, SlashState::Idle)
        else {
            return Ok(SlashOutcome::Inactive);
        };
        self.selected = 0;

        let still_there = detect_trigger(editor.doc(), &Selection::collapsed(to))
            .is_some_and(|(q, f, _)| q == query && f == from);
        if !still_there {
            debug!(%command, "slash range is stale, ignoring command");
            return Ok(SlashOutcome::Inactive);
        }

        let change = editor.change("slash", |draft| {
            draft.delete_text(from, to)?;
            draft.set_selection(Selection::collapsed(from));
            apply_command(draft, command, from)
        })?;
        Ok(change.value)
    }
}

/// Returns `(query, slash position, cursor position)` when the text right
/// before a collapsed cursor ends in a slash trigger.
fn detect_trigger(doc: &Document, selection: &Selection) -> Option<(String, usize, usize)> {
    if !selection.is_collapsed() {
        return None;
    }
    let head = selection.head;
    let range = doc.textblock_at(head).ok()?;
    let block = doc.block_at_path(&range.path)?;
    if block.kind == BlockKind::CodeBlock {
        return None;
    }
    let before: String = block.text_content().chars().take(head - range.start).collect();
    let captures = TRIGGER.captures(&before)?;
    let query = captures.get(1)?.as_str().to_string();
    let from = head - query.chars().count() - 1;
    Some((query, from, head))
}

fn apply_command(draft: &mut Draft, command: SlashCommand, at: usize) -> Result<SlashOutcome, ApplyError> {
    let range = draft.doc().textblock_at(at)?;
    let block_pos = range.start - 1;
    let block_end = range.end + 1;
    let empty_paragraph = draft
        .doc()
        .block_at_path(&range.path)
        .is_some_and(|b| b.kind == BlockKind::Paragraph && b.content_size() == 0);

    let target = match command {
        SlashCommand::Heading1 => Some(TurnIntoTarget::Heading(1)),
        SlashCommand::Heading2 => Some(TurnIntoTarget::Heading(2)),
        SlashCommand::Heading3 => Some(TurnIntoTarget::Heading(3)),
        SlashCommand::BulletList => Some(TurnIntoTarget::BulletList),
        SlashCommand::NumberedList => Some(TurnIntoTarget::OrderedList),
        SlashCommand::TaskList => Some(TurnIntoTarget::TaskList),
        SlashCommand::CodeBlock => Some(TurnIntoTarget::CodeBlock),
        SlashCommand::Quote => Some(TurnIntoTarget::Blockquote),
        _ => None,
    };
    if let Some(target) = target {
        if !turn_into_in(draft, block_pos, target)? {
            return Err(PositionError::NotInTextblock(at).into());
        }
        return Ok(SlashOutcome::Applied { command });
    }

    // Inserting commands take the place of an empty paragraph, otherwise
    // they go right after the current block.
    let insert_at = |draft: &mut Draft, nodes: Vec<Node>| -> Result<usize, ApplyError> {
        if empty_paragraph {
            draft.replace_node(block_pos, nodes)?;
            Ok(block_pos)
        } else {
            draft.insert_nodes(block_end, nodes)?;
            Ok(block_end)
        }
    };

    match command {
        SlashCommand::Divider => {
            let pos = insert_at(draft, vec![Node::divider(), Node::paragraph("")])?;
            draft.set_selection(Selection::collapsed(pos + 2));
            Ok(SlashOutcome::Applied { command })
        }
        SlashCommand::Table => {
            let pos = insert_at(draft, vec![table(TABLE_ROWS, TABLE_COLS)])?;
            // table > row > header > paragraph
            draft.set_selection(Selection::collapsed(pos + 4));
            Ok(SlashOutcome::Applied { command })
        }
        SlashCommand::Callout => {
            let pos = insert_at(draft, vec![Node::callout(CALLOUT_PLACEHOLDER)])?;
            let len = CALLOUT_PLACEHOLDER.chars().count();
            draft.set_selection(Selection::new(pos + 1, pos + 1 + len));
            Ok(SlashOutcome::Applied { command })
        }
        SlashCommand::Toggle => {
            let header = draft.delete_node(block_pos)?;
            let offset = at - block_pos;
            draft.insert_nodes(block_pos, vec![Node::toggle(vec![header, Node::paragraph("")])])?;
            draft.set_selection(Selection::collapsed(block_pos + 1 + offset));
            Ok(SlashOutcome::Applied { command })
        }
        SlashCommand::AiPrompt => {
            let prompt_id = Uuid::new_v4();
            let pos = insert_at(draft, vec![Node::ai_prompt(prompt_id)])?;
            Ok(SlashOutcome::PromptInserted { prompt_id, pos })
        }
        // The host uploads first; `nodes::insert_image` then takes over the
        // empty paragraph the same way the other inserts do.
        SlashCommand::Image => Ok(SlashOutcome::RequestImage {
            insert_pos: if empty_paragraph { block_pos } else { block_end },
        }),
        SlashCommand::AiEnhance => Ok(SlashOutcome::RequestEnhance),
        _ => Ok(SlashOutcome::Applied { command }),
    }
}

/// A table with a header row and empty cells.
pub fn table(rows: usize, cols: usize) -> Node {
    let row = |kind: BlockKind| {
        Node::block(
            BlockKind::TableRow,
            (0..cols)
                .map(|_| Node::block(kind, vec![Node::paragraph("")]))
                .collect(),
        )
    };
    let mut children = vec![row(BlockKind::TableHeader)];
    children.extend((1..rows).map(|_| row(BlockKind::TableCell)));
    Node::block(BlockKind::Table, children)
}
