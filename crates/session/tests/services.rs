mod support;

use blockpad_core::markup::serialize;
use blockpad_core::nodes::{find_prompt, PromptKey, PromptResolution};
use blockpad_core::{BlockKind, Document, Node, Selection};
use blockpad_session::{
    CollabError, EnhanceMode, EnhanceOutcome, EnhanceRequest, GenerateRequest, ImageFile,
    SaveOutcome, SessionError,
};
use support::{open, png, type_text, Canned, FakeUploader, MemoryStore};
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn failed_load_opens_an_empty_document() {
    let store = MemoryStore::with("other", "<p>x</p>");
    let mut session = open(&store, "t9").await;

    assert_eq!(session.editor().to_markup(), "<p></p>");
    let message = session.error().expect("load error is shown");
    assert!(message.starts_with("failed to load task t9"), "{message}");

    session.dismiss_error();
    assert_eq!(session.error(), None);
    assert_eq!(session.blur().await, None);
}

#[tokio::test(start_paused = true)]
async fn enhance_replaces_the_whole_description() {
    let store = MemoryStore::with("t1", "<h1>Plan</h1><p>do it</p>");
    let mut session = open(&store, "t1").await;
    let enhancer = Canned::<EnhanceRequest>::ok("Step one\n\n- a\n- b");

    let outcome = session
        .enhance(&enhancer, EnhanceMode::Actionable)
        .await
        .expect("enhancement applies");
    assert_eq!(outcome, EnhanceOutcome::Replaced);
    assert_eq!(
        session.editor().to_markup(),
        "<p>Step one</p><ul><li><p>a</p></li><li><p>b</p></li></ul>"
    );
    assert_eq!(
        enhancer.requests(),
        vec![EnhanceRequest {
            plain_text: "Plan\n\ndo it".into(),
            mode: EnhanceMode::Actionable,
            task_title: "Launch".into(),
        }]
    );

    assert_eq!(session.blur().await, Some(SaveOutcome::Saved));
    assert_eq!(
        store.saves(),
        vec!["<p>Step one</p><ul><li><p>a</p></li><li><p>b</p></li></ul>".to_string()]
    );

    // One undo step brings the original back.
    assert!(session.edit(|editor| editor.undo()));
    assert_eq!(session.editor().to_markup(), "<h1>Plan</h1><p>do it</p>");
}

#[tokio::test(start_paused = true)]
async fn edits_made_while_enhancing_are_replaced_but_undoable() {
    let store = MemoryStore::with("t1", "<p>draft</p>");
    let mut session = open(&store, "t1").await;

    let request = session
        .begin_enhance(EnhanceMode::Polish)
        .expect("request is built");
    assert_eq!(request.plain_text, "draft");

    session.edit(|editor| {
        editor.set_selection(Selection::collapsed(6));
        type_text(editor, "!");
    });
    let outcome = session
        .finish_enhance(EnhanceMode::Polish, Ok("Clean draft.".into()))
        .expect("enhancement applies");
    assert_eq!(outcome, EnhanceOutcome::ReplacedEdits);
    assert_eq!(session.editor().to_markup(), "<p>Clean draft.</p>");

    assert!(session.edit(|editor| editor.undo()));
    assert_eq!(session.editor().to_markup(), "<p>draft!</p>");
}

#[tokio::test(start_paused = true)]
async fn enhance_refuses_an_empty_description() {
    let store = MemoryStore::with("t1", "<p>  </p>");
    let mut session = open(&store, "t1").await;
    let enhancer = Canned::<EnhanceRequest>::ok("unused");

    let result = session.enhance(&enhancer, EnhanceMode::Polish).await;
    assert_eq!(result, Err(SessionError::EmptyDocument));
    assert!(enhancer.requests().is_empty());
    assert!(session.error().is_some());
}

#[tokio::test(start_paused = true)]
async fn enhance_failure_keeps_the_document() {
    let store = MemoryStore::with("t1", "<p>keep me</p>");
    let mut session = open(&store, "t1").await;
    let enhancer = Canned::<EnhanceRequest>::err(CollabError::Service("quota".into()));

    let result = session.enhance(&enhancer, EnhanceMode::Concise).await;
    assert!(matches!(result, Err(SessionError::Enhance(_))));
    assert_eq!(session.editor().to_markup(), "<p>keep me</p>");
    assert_eq!(session.error(), Some("enhancement failed: service error: quota"));
}

#[test]
fn enhance_modes_describe_themselves() {
    assert_eq!(EnhanceMode::Polish.description(), "Fix grammar & clarity");
    assert_eq!(EnhanceMode::Actionable.label(), "Actionable");
    assert_eq!(EnhanceMode::Concise.to_string(), "concise");
    assert_eq!("detailed".parse::<EnhanceMode>(), Ok(EnhanceMode::Detailed));
}

fn markup_with_prompt(id: Uuid) -> String {
    serialize(&Document::new(vec![
        Node::paragraph("Before"),
        Node::ai_prompt(id),
        Node::paragraph("After"),
    ]))
}

#[tokio::test(start_paused = true)]
async fn prompt_answer_replaces_the_prompt_node() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;
    let service = Canned::<GenerateRequest>::ok("Done.");

    session.prompt(id).set_prompt("wrap it up");
    let resolution = session
        .submit_prompt(id, &service)
        .await
        .expect("prompt applies");
    assert!(matches!(resolution, PromptResolution::Inserted { pos: 8, .. }));
    assert_eq!(
        session.editor().to_markup(),
        "<p>Before</p><p>Done.</p><p>After</p>"
    );

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "wrap it up");
    assert_eq!(requests[0].task_title, "Launch");
    assert!(session.save_deadline().is_some());
}

#[tokio::test(start_paused = true)]
async fn prompt_failure_stays_on_the_node_for_a_retry() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;
    let service = Canned::<GenerateRequest>::err(CollabError::Service("down".into()));

    session.prompt(id).set_prompt("anything");
    let resolution = session
        .submit_prompt(id, &service)
        .await
        .expect("a failed request is not an apply error");
    assert_eq!(resolution, PromptResolution::Failed);
    assert_eq!(session.prompt(id).error(), Some("service error: down"));
    assert_eq!(find_prompt(session.editor().doc(), id), Some(8));
    assert_eq!(session.save_deadline(), None);

    service.set_answer(Ok("Recovered".into()));
    let resolution = session
        .submit_prompt(id, &service)
        .await
        .expect("retry applies");
    assert!(matches!(resolution, PromptResolution::Inserted { .. }));
    assert_eq!(find_prompt(session.editor().doc(), id), None);
}

#[tokio::test(start_paused = true)]
async fn blank_prompt_is_rejected_before_any_request() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;
    let service = Canned::<GenerateRequest>::ok("unused");

    let result = session.submit_prompt(id, &service).await;
    assert!(matches!(result, Err(SessionError::Prompt(_))));
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_prompt_removes_the_node_and_its_state() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;

    session.prompt(id).set_prompt("half typed");
    assert_eq!(session.open_prompts(), 1);

    assert_eq!(session.cancel_prompt(id), Ok(true));
    assert_eq!(find_prompt(session.editor().doc(), id), None);
    assert_eq!(session.editor().to_markup(), "<p>Before</p><p>After</p>");
    assert_eq!(session.open_prompts(), 0);
    assert!(session.save_deadline().is_some());

    assert_eq!(session.cancel_prompt(id), Ok(false));
    assert_eq!(session.open_prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn prompt_keys_submit_and_dismiss() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;

    assert_eq!(session.prompt_key(id, PromptKey::Enter), Ok(None));

    session.prompt(id).set_prompt("list risks");
    let request = session
        .prompt_key(id, PromptKey::Enter)
        .expect("key handled")
        .expect("request to send");
    assert_eq!(request.prompt, "list risks");
    assert_eq!(request.task_content, "Before\n\nAfter");
    assert!(session.prompt(id).is_loading());

    assert_eq!(session.prompt_key(id, PromptKey::Escape), Ok(None));
    assert_eq!(session.editor().to_markup(), "<p>Before</p><p>After</p>");
    assert_eq!(session.open_prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_prompt_node_forgets_its_state() {
    let id = Uuid::new_v4();
    let store = MemoryStore::with("t1", &markup_with_prompt(id));
    let mut session = open(&store, "t1").await;

    session.prompt(id).set_prompt("summarize");
    let request = session.begin_prompt(id).expect("prompt submits");
    assert_eq!(request.prompt, "summarize");

    let pos = find_prompt(session.editor().doc(), id).expect("prompt node");
    session
        .edit(|editor| editor.change("block.delete", |draft| draft.delete_node(pos)))
        .expect("delete applies");
    assert_eq!(session.open_prompts(), 0);

    // A late failure has no node to show on.
    let resolution = session
        .finish_prompt(id, Err("timeout".into()))
        .expect("a failed request is not an apply error");
    assert_eq!(resolution, PromptResolution::Failed);
    assert_eq!(session.open_prompts(), 0);
    assert_eq!(session.editor().to_markup(), "<p>Before</p><p>After</p>");

    let resolution = session
        .finish_prompt(id, Ok("late".into()))
        .expect("late answer is dropped");
    assert_eq!(resolution, PromptResolution::Discarded);
    assert_eq!(session.open_prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn uploaded_image_lands_at_the_requested_position() {
    let store = MemoryStore::with("t1", "<p>hello</p><p>tail</p>");
    let mut session = open(&store, "t1").await;
    let uploader = FakeUploader::new(Ok("https://cdn.test/a.png".into()));

    let pos = session
        .insert_uploaded_image(&uploader, png("a.png"), 7)
        .await
        .expect("image inserted");
    assert_eq!(pos, 7);
    let block = session.editor().doc().block_at(7).expect("image block");
    assert_eq!(block.kind, BlockKind::Image);
    assert_eq!(block.attr_str("src"), Some("https://cdn.test/a.png"));
    assert_eq!(uploader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn uploaded_image_takes_over_an_empty_paragraph() {
    let store = MemoryStore::with("t1", "<p>hello</p><p></p>");
    let mut session = open(&store, "t1").await;
    let uploader = FakeUploader::new(Ok("https://cdn.test/e.png".into()));

    let pos = session
        .insert_uploaded_image(&uploader, png("e.png"), 7)
        .await
        .expect("image inserted");
    assert_eq!(pos, 7);
    assert_eq!(
        session.editor().to_markup(),
        "<p>hello</p><img src=\"https://cdn.test/e.png\" width=\"100%\">"
    );
}

#[tokio::test(start_paused = true)]
async fn stale_insert_position_appends_the_image() {
    let store = MemoryStore::with("t1", "<p>hello</p>");
    let mut session = open(&store, "t1").await;
    let uploader = FakeUploader::new(Ok("https://cdn.test/b.png".into()));

    let pos = session
        .insert_uploaded_image(&uploader, png("b.png"), 3)
        .await
        .expect("image appended");
    assert_eq!(pos, 7);
    assert_eq!(
        session.editor().doc().block_at(7).map(|block| block.kind),
        Ok(BlockKind::Image)
    );
}

#[tokio::test(start_paused = true)]
async fn non_images_and_failed_uploads_leave_the_document_alone() {
    let store = MemoryStore::with("t1", "<p>hello</p>");
    let mut session = open(&store, "t1").await;
    let uploader = FakeUploader::new(Err(CollabError::Network("timeout".into())));

    let pdf = ImageFile {
        name: "notes.pdf".into(),
        mime_type: "application/pdf".into(),
        bytes: vec![1, 2, 3],
    };
    let result = session.insert_uploaded_image(&uploader, pdf, 7).await;
    assert_eq!(result, Err(SessionError::NotAnImage("notes.pdf".into())));
    assert_eq!(uploader.calls(), 0);

    let result = session.insert_uploaded_image(&uploader, png("c.png"), 7).await;
    assert!(matches!(result, Err(SessionError::Upload(_))));
    assert_eq!(session.editor().to_markup(), "<p>hello</p>");
    assert_eq!(session.error(), Some("upload failed: network error: timeout"));
}

#[tokio::test(start_paused = true)]
async fn image_resize_uses_the_configured_minimum() -> anyhow::Result<()> {
    let store = MemoryStore::with("t1", "<img src=\"a.png\">");
    let session = open(&store, "t1").await;

    let resize = session.image_resize(0)?;
    assert!(!resize.is_resizing());
    assert!(session.image_resize(5).is_err());
    Ok(())
}
