use blockpad_core::nodes::{find_prompt, AiPromptController, PromptKey, PromptResolution};
use blockpad_core::{blocks, Document, Editor, Node, Selection};
use uuid::Uuid;

fn editor_with_prompt(id: Uuid) -> Editor {
    let doc = Document::new(vec![
        Node::paragraph("Before"),
        Node::ai_prompt(id),
        Node::paragraph("After"),
    ]);
    Editor::new(doc, Selection::collapsed(1))
}

fn submitted(id: Uuid, prompt: &str) -> AiPromptController {
    let mut controller = AiPromptController::new(id);
    controller.set_prompt(prompt);
    controller.begin_submit().expect("prompt is valid");
    controller
}

#[test]
fn successful_response_replaces_only_the_prompt_node() {
    let id = Uuid::new_v4();
    let mut editor = editor_with_prompt(id);
    let mut controller = submitted(id, "list the steps");
    assert!(controller.is_loading());

    let resolution = controller
        .complete(&mut editor, Ok("Here is **it**\n\n- one\n- two".into()))
        .expect("response applies");
    assert_eq!(resolution, PromptResolution::Inserted { pos: 8, end: 36 });
    assert!(!controller.is_loading());
    assert_eq!(
        editor.to_markup(),
        "<p>Before</p><p>Here is <strong>it</strong></p><ul><li><p>one</p></li><li><p>two</p></li></ul><p>After</p>"
    );
    assert_eq!(find_prompt(editor.doc(), id), None);

    assert!(editor.undo());
    assert_eq!(find_prompt(editor.doc(), id), Some(8));
}

#[test]
fn markup_responses_keep_their_structure() {
    let id = Uuid::new_v4();
    let mut editor = editor_with_prompt(id);
    let mut controller = submitted(id, "a heading please");
    controller
        .complete(&mut editor, Ok("<h2>Summary</h2><p>Done.</p>".into()))
        .expect("response applies");
    assert_eq!(
        editor.to_markup(),
        "<p>Before</p><h2>Summary</h2><p>Done.</p><p>After</p>"
    );
}

#[test]
fn failed_request_keeps_the_node_and_the_error() {
    let id = Uuid::new_v4();
    let mut editor = editor_with_prompt(id);
    let before = editor.to_markup();
    let mut controller = submitted(id, "anything");

    let resolution = controller
        .complete(&mut editor, Err("service unavailable".into()))
        .expect("failure is not an apply error");
    assert_eq!(resolution, PromptResolution::Failed);
    assert_eq!(controller.error(), Some("service unavailable"));
    assert!(!controller.is_loading());
    assert_eq!(editor.to_markup(), before);

    // The node stays editable: a retry goes through.
    controller.set_prompt("anything, again");
    assert!(controller.begin_submit().is_ok());
    assert_eq!(controller.error(), None);
}

#[test]
fn late_response_for_a_removed_node_is_dropped() {
    let id = Uuid::new_v4();
    let mut editor = editor_with_prompt(id);
    let mut controller = submitted(id, "anything");

    assert_eq!(blocks::delete(&mut editor, 8), blocks::BlockOutcome::Deleted { pos: 8 });
    let after_delete = editor.to_markup();

    let resolution = controller
        .complete(&mut editor, Ok("too late".into()))
        .expect("discarding is not an error");
    assert_eq!(resolution, PromptResolution::Discarded);
    assert_eq!(editor.to_markup(), after_delete);
}

#[test]
fn enter_submits_and_escape_dismisses() {
    let id = Uuid::new_v4();
    let mut editor = editor_with_prompt(id);
    let mut controller = AiPromptController::new(id);

    assert_eq!(controller.on_key(&mut editor, PromptKey::Enter), Ok(None));
    assert_eq!(controller.error(), Some("please enter a prompt"));

    controller.set_prompt("summarize");
    let request = controller
        .on_key(&mut editor, PromptKey::Enter)
        .expect("no document change")
        .expect("request is sent");
    assert_eq!(request.prompt_id, id);
    assert_eq!(request.prompt, "summarize");

    assert_eq!(controller.on_key(&mut editor, PromptKey::Escape), Ok(None));
    assert_eq!(editor.to_markup(), "<p>Before</p><p>After</p>");
}
