#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blockpad_core::{Editor, Selection};
use blockpad_session::{
    CollabError, CollabResult, DocumentStore, EditorSession, EnhanceRequest, EnhanceService,
    GenerateRequest, ImageFile, ImageUploader, PromptService, SessionConfig,
};

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, String>>,
    saves: Mutex<Vec<String>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn with(task_id: &str, markup: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .docs
            .lock()
            .unwrap()
            .insert(task_id.to_string(), markup.to_string());
        Arc::new(store)
    }

    pub fn saves(&self) -> Vec<String> {
        self.saves.lock().unwrap().clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, task_id: &str) -> CollabResult<String> {
        self.docs
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(task_id.to_string()))
    }

    async fn save(&self, task_id: &str, markup: &str) -> CollabResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CollabError::Network("connection reset".into()));
        }
        self.docs
            .lock()
            .unwrap()
            .insert(task_id.to_string(), markup.to_string());
        self.saves.lock().unwrap().push(markup.to_string());
        Ok(())
    }
}

/// Answers every call with a canned result and remembers what it was asked.
pub struct Canned<Req> {
    answer: Mutex<CollabResult<String>>,
    requests: Mutex<Vec<Req>>,
}

impl<Req: Clone> Canned<Req> {
    pub fn ok(answer: &str) -> Self {
        Self::answering(Ok(answer.to_string()))
    }

    pub fn err(error: CollabError) -> Self {
        Self::answering(Err(error))
    }

    fn answering(answer: CollabResult<String>) -> Self {
        Self {
            answer: Mutex::new(answer),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_answer(&self, answer: CollabResult<String>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn requests(&self) -> Vec<Req> {
        self.requests.lock().unwrap().clone()
    }

    fn call(&self, request: Req) -> CollabResult<String> {
        self.requests.lock().unwrap().push(request);
        self.answer.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnhanceService for Canned<EnhanceRequest> {
    async fn enhance(&self, request: EnhanceRequest) -> CollabResult<String> {
        self.call(request)
    }
}

#[async_trait]
impl PromptService for Canned<GenerateRequest> {
    async fn generate(&self, request: GenerateRequest) -> CollabResult<String> {
        self.call(request)
    }
}

pub struct FakeUploader {
    result: CollabResult<String>,
    calls: AtomicUsize,
}

impl FakeUploader {
    pub fn new(result: CollabResult<String>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload(&self, _file: ImageFile) -> CollabResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub fn png(name: &str) -> ImageFile {
    ImageFile {
        name: name.to_string(),
        mime_type: "image/png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    }
}

pub async fn open(store: &Arc<MemoryStore>, task_id: &str) -> EditorSession {
    EditorSession::open(store.clone(), task_id, "Launch", SessionConfig::default()).await
}

/// Types `text` at the cursor the way a keystroke would.
pub fn type_text(editor: &mut Editor, text: &str) {
    let at = editor.selection().head;
    editor
        .change("typing", |draft| {
            let end = draft.insert_text(at, text)?;
            draft.set_selection(Selection::collapsed(end));
            Ok(())
        })
        .expect("typing applies");
}
