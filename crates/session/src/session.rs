use std::collections::HashMap;
use std::sync::Arc;

use blockpad_core::markup::parse;
use blockpad_core::nodes::{
    find_prompt, insert_image, AiPromptController, ImageResize, PromptKey, PromptRequest,
    PromptResolution,
};
use blockpad_core::plain_text::from_plain_text;
use blockpad_core::{ApplyError, Document, Editor, Node, Selection};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autosave::SaveDebouncer;
use crate::collab::{
    CollabResult, DocumentStore, EnhanceMode, EnhanceRequest, EnhanceService, GenerateRequest, ImageFile,
    ImageUploader, PromptService,
};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed,
}

/// A write taken out of the session. It stays valid however the document
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub task_id: String,
    pub markup: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhanceOutcome {
    Replaced,
    /// Edits made while the request was out were replaced too.
    ReplacedEdits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalUpdate {
    Unchanged,
    /// The document was swapped. `selection` is what the view should put
    /// back, present only while the editor has focus.
    Replaced { selection: Option<Selection> },
}

#[derive(Debug, Clone)]
struct TransientError {
    message: String,
    expires_at: Instant,
}

/// One task's description being edited: the editor, its autosave, and the
/// round trips to the services around it.
pub struct EditorSession {
    task_id: String,
    task_title: String,
    config: SessionConfig,
    editor: Editor,
    store: Arc<dyn DocumentStore>,
    debouncer: SaveDebouncer,
    persisted: String,
    focused: bool,
    error: Option<TransientError>,
    prompts: HashMap<Uuid, AiPromptController>,
    enhance_base: Option<String>,
}

impl EditorSession {
    /// Loads the task's markup. A failed load still opens the editor, on an
    /// empty document, with the failure shown as a transient error.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        task_id: impl Into<String>,
        task_title: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        let task_id = task_id.into();
        let (doc, load_error) = match store.load(&task_id).await {
            Ok(markup) => (parse(&markup), None),
            Err(source) => {
                warn!(task_id = %task_id, error = %source, "failed to load task content");
                let error = SessionError::Load {
                    task_id: task_id.clone(),
                    source,
                };
                (Document::empty(), Some(error))
            }
        };

        let editor = Editor::with_config(doc, Selection::collapsed(1), config.editor_config());
        let persisted = editor.to_markup();
        let mut session = Self {
            task_id,
            task_title: task_title.into(),
            debouncer: SaveDebouncer::new(config.save_debounce()),
            config,
            editor,
            store,
            persisted,
            focused: false,
            error: None,
            prompts: HashMap::new(),
            enhance_base: None,
        };
        if let Some(error) = load_error {
            session.show_error(&error);
        }
        session
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_title(&self) -> &str {
        &self.task_title
    }

    pub fn set_task_title(&mut self, title: impl Into<String>) {
        self.task_title = title.into();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    /// Markup that differs from what the store last acknowledged.
    pub fn has_unsaved_changes(&self) -> bool {
        self.editor.to_markup() != self.persisted
    }

    pub fn save_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Runs `f` against the editor and re-arms the autosave when the
    /// document changed.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut Editor) -> T) -> T {
        let before = self.editor.to_markup();
        let value = f(&mut self.editor);
        let after = self.editor.to_markup();
        if after != before {
            self.debouncer.schedule(after, Instant::now());
            self.prune_prompts();
        }
        value
    }

    /// Writes the pending markup once the quiet period has passed.
    pub async fn poll(&mut self) -> Option<SaveOutcome> {
        let request = self.begin_due_save()?;
        Some(self.run_save(request).await)
    }

    /// Waits out the current debounce window, then writes.
    pub async fn flush_when_due(&mut self) -> Option<SaveOutcome> {
        let deadline = self.debouncer.deadline()?;
        tokio::time::sleep_until(deadline).await;
        self.poll().await
    }

    /// Losing focus writes immediately and drops the pending timer.
    pub async fn blur(&mut self) -> Option<SaveOutcome> {
        let request = self.begin_blur_save()?;
        Some(self.run_save(request).await)
    }

    /// Takes the debounced write once it is due. The host runs it against
    /// the store and reports back through `finish_save`, editing freely in
    /// between.
    pub fn begin_due_save(&mut self) -> Option<SaveRequest> {
        let markup = self.debouncer.take_due(Instant::now())?;
        Some(self.save_request(markup))
    }

    /// Marks the editor unfocused and takes an immediate write of the
    /// current state, cancelling the debounced one. `None` when there is
    /// nothing new to write.
    pub fn begin_blur_save(&mut self) -> Option<SaveRequest> {
        self.focused = false;
        let pending = self.debouncer.flush();
        let markup = self.editor.to_markup();
        if pending.is_none() && markup == self.persisted {
            return None;
        }
        Some(self.save_request(markup))
    }

    /// Records the store's answer for `request`. Only the markup that was
    /// actually written counts as persisted; edits made while the write was
    /// in flight keep their own pending write.
    pub fn finish_save(&mut self, request: SaveRequest, result: CollabResult<()>) -> SaveOutcome {
        match result {
            Ok(()) => {
                debug!(task_id = %self.task_id, bytes = request.markup.len(), "saved task content");
                self.persisted = request.markup;
                SaveOutcome::Saved
            }
            Err(source) => {
                warn!(task_id = %self.task_id, error = %source, "failed to save task content");
                let error = SessionError::Save {
                    task_id: self.task_id.clone(),
                    source,
                };
                self.show_error(&error);
                SaveOutcome::Failed
            }
        }
    }

    fn save_request(&self, markup: String) -> SaveRequest {
        SaveRequest {
            task_id: self.task_id.clone(),
            markup,
        }
    }

    async fn run_save(&mut self, request: SaveRequest) -> SaveOutcome {
        let store = Arc::clone(&self.store);
        let result = store.save(&request.task_id, &request.markup).await;
        self.finish_save(request, result)
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Content pushed by someone else. The whole document is replaced when
    /// it differs; any pending local write is dropped since the incoming
    /// version is the newer one.
    pub fn apply_external(&mut self, markup: &str) -> ExternalUpdate {
        let incoming = Editor::from_markup(markup);
        if incoming.to_markup() == self.editor.to_markup() {
            return ExternalUpdate::Unchanged;
        }

        let selection = *self.editor.selection();
        self.editor.replace_document(incoming.doc().clone(), selection);
        self.debouncer.cancel();
        self.persisted = self.editor.to_markup();
        self.prune_prompts();
        info!(task_id = %self.task_id, "applied external content update");

        ExternalUpdate::Replaced {
            selection: self.focused.then(|| *self.editor.selection()),
        }
    }

    /// Rewrites the whole description through `service`. The current text
    /// is sent as plain text and the answer replaces every block.
    pub async fn enhance(
        &mut self,
        service: &dyn EnhanceService,
        mode: EnhanceMode,
    ) -> SessionResult<EnhanceOutcome> {
        let request = self.begin_enhance(mode)?;
        let result = service.enhance(request).await;
        self.finish_enhance(mode, result)
    }

    /// Builds the enhancement request from the current document. Blank
    /// documents are refused before anything is sent.
    pub fn begin_enhance(&mut self, mode: EnhanceMode) -> SessionResult<EnhanceRequest> {
        let plain_text = self.editor.to_plain_text();
        if plain_text.trim().is_empty() {
            self.show_error(&SessionError::EmptyDocument);
            return Err(SessionError::EmptyDocument);
        }
        self.enhance_base = Some(self.editor.to_markup());
        Ok(EnhanceRequest {
            plain_text,
            mode,
            task_title: self.task_title.clone(),
        })
    }

    /// Applies the enhancement answer. The answer replaces the whole
    /// document even when it was edited after `begin_enhance`; the outcome
    /// says so, and one undo brings the edited version back.
    pub fn finish_enhance(
        &mut self,
        mode: EnhanceMode,
        result: CollabResult<String>,
    ) -> SessionResult<EnhanceOutcome> {
        let base = self.enhance_base.take();
        let text = match result {
            Ok(text) => text,
            Err(source) => {
                warn!(task_id = %self.task_id, %mode, error = %source, "enhancement failed");
                let error = SessionError::Enhance(source);
                self.show_error(&error);
                return Err(error);
            }
        };

        let edited = base.is_some_and(|base| base != self.editor.to_markup());
        if edited {
            warn!(task_id = %self.task_id, %mode, "document changed during enhancement, replacing it anyway");
        }
        let nodes = from_plain_text(&text);
        self.edit(|editor| replace_all(editor, nodes))?;
        info!(task_id = %self.task_id, %mode, "enhanced task content");
        Ok(if edited {
            EnhanceOutcome::ReplacedEdits
        } else {
            EnhanceOutcome::Replaced
        })
    }

    /// Per-node state for the inline prompt `prompt_id`.
    pub fn prompt(&mut self, prompt_id: Uuid) -> &mut AiPromptController {
        self.prompts
            .entry(prompt_id)
            .or_insert_with(|| AiPromptController::new(prompt_id))
    }

    /// Number of prompt nodes with local state.
    pub fn open_prompts(&self) -> usize {
        self.prompts.len()
    }

    /// Sends the prompt typed into node `prompt_id` and applies whatever
    /// comes back. A failure stays on the prompt node for a retry.
    pub async fn submit_prompt(
        &mut self,
        prompt_id: Uuid,
        service: &dyn PromptService,
    ) -> SessionResult<PromptResolution> {
        let request = self.begin_prompt(prompt_id)?;
        let response = service
            .generate(request)
            .await
            .map_err(|error| error.to_string());
        self.finish_prompt(prompt_id, response)
    }

    /// Marks the prompt as loading and builds the request for it. The
    /// document stays editable until `finish_prompt`.
    pub fn begin_prompt(&mut self, prompt_id: Uuid) -> SessionResult<GenerateRequest> {
        let request = self.prompt(prompt_id).begin_submit()?;
        Ok(self.generate_request(request))
    }

    fn generate_request(&self, request: PromptRequest) -> GenerateRequest {
        GenerateRequest {
            prompt: request.prompt,
            task_title: self.task_title.clone(),
            task_content: self.editor.to_plain_text(),
        }
    }

    /// Enter submits and returns the request to send; Escape removes the
    /// prompt node and forgets its state.
    pub fn prompt_key(
        &mut self,
        prompt_id: Uuid,
        key: PromptKey,
    ) -> SessionResult<Option<GenerateRequest>> {
        match key {
            PromptKey::Enter => {
                let request = self.prompt(prompt_id).begin_submit().ok();
                Ok(request.map(|request| self.generate_request(request)))
            }
            PromptKey::Escape => {
                self.cancel_prompt(prompt_id)?;
                Ok(None)
            }
        }
    }

    /// Removes the prompt node and its local state. Returns false when the
    /// node was already gone.
    pub fn cancel_prompt(&mut self, prompt_id: Uuid) -> SessionResult<bool> {
        let mut controller = self
            .prompts
            .remove(&prompt_id)
            .unwrap_or_else(|| AiPromptController::new(prompt_id));
        let removed = self.edit(|editor| controller.cancel(editor))?;
        debug!(%prompt_id, removed, "prompt dismissed");
        Ok(removed)
    }

    /// Applies a prompt response that arrived some other way. The document
    /// may have changed since the request went out.
    pub fn finish_prompt(
        &mut self,
        prompt_id: Uuid,
        response: Result<String, String>,
    ) -> SessionResult<PromptResolution> {
        let mut controller = self
            .prompts
            .remove(&prompt_id)
            .unwrap_or_else(|| AiPromptController::new(prompt_id));
        let resolution = self.edit(|editor| controller.complete(editor, response));
        let node_remains = find_prompt(self.editor.doc(), prompt_id).is_some();

        match resolution {
            Ok(PromptResolution::Failed) => {
                warn!(%prompt_id, error = controller.error().unwrap_or_default(), "prompt request failed");
                if node_remains {
                    self.prompts.insert(prompt_id, controller);
                }
                Ok(PromptResolution::Failed)
            }
            Ok(resolution) => Ok(resolution),
            Err(error) => {
                if node_remains {
                    self.prompts.insert(prompt_id, controller);
                }
                Err(error.into())
            }
        }
    }

    /// Drops local state of prompt nodes that left the document.
    fn prune_prompts(&mut self) {
        let doc = self.editor.doc();
        self.prompts.retain(|id, _| find_prompt(doc, *id).is_some());
    }

    /// Uploads `file` and places an image block at `insert_pos`, or at the
    /// end of the document when that position no longer takes a block.
    pub async fn insert_uploaded_image(
        &mut self,
        uploader: &dyn ImageUploader,
        file: ImageFile,
        insert_pos: usize,
    ) -> SessionResult<usize> {
        if !file.is_image() {
            let error = SessionError::NotAnImage(file.name);
            self.show_error(&error);
            return Err(error);
        }

        let name = file.name.clone();
        let url = match uploader.upload(file).await {
            Ok(url) => url,
            Err(source) => {
                warn!(file = %name, error = %source, "image upload failed");
                let error = SessionError::Upload(source);
                self.show_error(&error);
                return Err(error);
            }
        };

        let pos = self.edit(|editor| place_image(editor, insert_pos, &url))?;
        info!(task_id = %self.task_id, file = %name, pos, "inserted uploaded image");
        Ok(pos)
    }

    /// Resize state for the image at `pos`, using the configured minimum.
    pub fn image_resize(&self, pos: usize) -> SessionResult<ImageResize> {
        let block = self.editor.doc().block_at(pos).map_err(ApplyError::from)?;
        Ok(ImageResize::with_min_width(block, self.config.image_min_width))
    }

    /// The visible transient error, if it has not expired yet.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|error| Instant::now() < error.expires_at)
            .map(|error| error.message.as_str())
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    fn show_error(&mut self, error: &SessionError) {
        self.error = Some(TransientError {
            message: error.to_string(),
            expires_at: Instant::now() + self.config.error_display(),
        });
    }
}

fn replace_all(editor: &mut Editor, nodes: Vec<Node>) -> Result<(), ApplyError> {
    editor
        .change("ai.enhance", |draft| {
            let mut positions = draft.doc().child_positions(&[]);
            positions.reverse();
            for pos in positions {
                draft.delete_node(pos)?;
            }
            let end = draft.insert_nodes(0, nodes)?;
            draft.set_selection(Selection::collapsed(end.saturating_sub(1)));
            Ok(())
        })
        .map(|change| change.value)
}

fn place_image(editor: &mut Editor, insert_pos: usize, url: &str) -> Result<usize, ApplyError> {
    match insert_image(editor, insert_pos, url) {
        Ok(pos) => Ok(pos),
        Err(error) => {
            debug!(insert_pos, %error, "insert position is stale, appending image");
            let end = editor.doc().content_size();
            insert_image(editor, end, url)
        }
    }
}
