use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{Document, Editor, Node, Selection};
use crate::error::{ApplyError, PromptInputError};
use crate::kind::BlockKind;
use crate::markup::parse_fragment;
use crate::plain_text::from_plain_text;

/// What the host sends to the prompt collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub prompt_id: Uuid,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKey {
    Enter,
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResolution {
    /// The prompt node was replaced by content ending at `end`.
    Inserted { pos: usize, end: usize },
    /// The request failed; the node stays and shows the error.
    Failed,
    /// The node was gone by the time the response arrived.
    Discarded,
}

/// Local state of one inline prompt node: the typed text and the request
/// status. Only `complete` and `cancel` touch the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiPromptController {
    prompt_id: Uuid,
    prompt: String,
    loading: bool,
    error: Option<String>,
}

impl AiPromptController {
    pub fn new(prompt_id: Uuid) -> Self {
        Self {
            prompt_id,
            prompt: String::new(),
            loading: false,
            error: None,
        }
    }

    pub fn prompt_id(&self) -> Uuid {
        self.prompt_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Validates the prompt and marks the request as running.
    pub fn begin_submit(&mut self) -> Result<PromptRequest, PromptInputError> {
        if self.loading {
            return Err(PromptInputError::AlreadyLoading);
        }
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            self.error = Some(PromptInputError::Empty.to_string());
            return Err(PromptInputError::Empty);
        }
        self.loading = true;
        self.error = None;
        Ok(PromptRequest {
            prompt_id: self.prompt_id,
            prompt: prompt.to_string(),
        })
    }

    /// Applies the collaborator's answer. A success swaps the prompt node for
    /// the response in one change; a failure only records the message.
    pub fn complete(
        &mut self,
        editor: &mut Editor,
        response: Result<String, String>,
    ) -> Result<PromptResolution, ApplyError> {
        self.loading = false;
        let response = match response {
            Ok(response) => response,
            Err(message) => {
                debug!(prompt_id = %self.prompt_id, %message, "prompt request failed");
                self.error = Some(message);
                return Ok(PromptResolution::Failed);
            }
        };
        let Some(pos) = find_prompt(editor.doc(), self.prompt_id) else {
            debug!(prompt_id = %self.prompt_id, "prompt node is gone, dropping response");
            return Ok(PromptResolution::Discarded);
        };

        let nodes = response_nodes(&response);
        let change = editor.change("ai_prompt.insert", |draft| {
            let end = draft.replace_node(pos, nodes)?;
            draft.set_selection(Selection::collapsed(end));
            Ok(end)
        })?;
        info!(prompt_id = %self.prompt_id, "prompt response inserted");
        Ok(PromptResolution::Inserted {
            pos,
            end: change.value,
        })
    }

    /// Removes the prompt node. Returns false when it was already gone.
    pub fn cancel(&mut self, editor: &mut Editor) -> Result<bool, ApplyError> {
        self.loading = false;
        let Some(pos) = find_prompt(editor.doc(), self.prompt_id) else {
            return Ok(false);
        };
        editor.change("ai_prompt.cancel", |draft| draft.delete_node(pos).map(drop))?;
        Ok(true)
    }

    /// Enter submits, Escape cancels. Returns the request to send, if any.
    pub fn on_key(
        &mut self,
        editor: &mut Editor,
        key: PromptKey,
    ) -> Result<Option<PromptRequest>, ApplyError> {
        match key {
            PromptKey::Enter => Ok(self.begin_submit().ok()),
            PromptKey::Escape => {
                self.cancel(editor)?;
                Ok(None)
            }
        }
    }
}

/// Position of the prompt node carrying `prompt_id`.
pub fn find_prompt(doc: &Document, prompt_id: Uuid) -> Option<usize> {
    fn walk(children: &[Node], start: usize, id: &str) -> Option<usize> {
        let mut offset = start;
        for child in children {
            if let Node::Block(block) = child {
                if block.kind == BlockKind::AiPrompt && block.attr_str("promptId") == Some(id) {
                    return Some(offset);
                }
                if !block.kind.is_atomic() && !block.kind.is_textblock() {
                    if let Some(found) = walk(&block.children, offset + 1, id) {
                        return Some(found);
                    }
                }
            }
            offset += child.size();
        }
        None
    }

    walk(&doc.children, 0, &prompt_id.to_string())
}

/// Reads a collaborator response. Markup fragments are used as-is, anything
/// else goes through the plain text reader.
pub fn response_nodes(response: &str) -> Vec<Node> {
    let trimmed = response.trim();
    let opens_with_tag = trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_alphabetic());
    if opens_with_tag {
        let nodes = parse_fragment(trimmed);
        if nodes.iter().any(|n| n.as_block().is_some()) {
            return nodes;
        }
    }
    from_plain_text(trimmed)
}
