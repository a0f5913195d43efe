use blockpad_core::nodes::insert_image;
use blockpad_core::slash::CALLOUT_PLACEHOLDER;
use blockpad_core::{
    filter_commands, BlockKind, Editor, KeyResult, Selection, SlashCommand, SlashKey, SlashMenu,
    SlashOutcome, SlashState,
};

/// An editor holding `markup` with the cursor at `pos`, and a menu that has
/// seen that state.
fn typed(markup: &str, pos: usize) -> (Editor, SlashMenu) {
    let mut editor = Editor::from_markup(markup);
    editor.set_selection(Selection::collapsed(pos));
    let mut menu = SlashMenu::default();
    menu.on_text_change(editor.doc(), editor.selection());
    (editor, menu)
}

#[test]
fn filter_keeps_registry_order() {
    let registry = [
        SlashCommand::Heading1,
        SlashCommand::Heading2,
        SlashCommand::BulletList,
        SlashCommand::Table,
    ];
    assert_eq!(
        filter_commands(&registry, "he"),
        vec![SlashCommand::Heading1, SlashCommand::Heading2]
    );
    assert_eq!(filter_commands(&registry, "LIST"), vec![SlashCommand::BulletList]);
    assert_eq!(filter_commands(&registry, ""), registry.to_vec());
}

#[test]
fn registry_names_and_order() {
    let names: Vec<String> = SlashCommand::registry().into_iter().map(SlashCommand::name).collect();
    assert_eq!(
        names,
        [
            "Heading 1",
            "Heading 2",
            "Heading 3",
            "Bullet List",
            "Numbered List",
            "Task List",
            "Code Block",
            "Quote",
            "Divider",
            "Table",
            "Callout",
            "Toggle",
            "Image",
            "AI Prompt",
            "AI Enhance",
        ]
    );
}

#[test]
fn slash_after_whitespace_or_at_block_start_triggers() {
    let (_, menu) = typed("<p>/he</p>", 4);
    assert_eq!(
        *menu.state(),
        SlashState::Filtering {
            query: "he".into(),
            from: 1,
            to: 4,
        }
    );
    assert_eq!(
        menu.visible_commands(),
        vec![SlashCommand::Heading1, SlashCommand::Heading2, SlashCommand::Heading3]
    );

    let (_, menu) = typed("<p>see /</p>", 6);
    assert!(menu.is_visible());
    assert_eq!(menu.visible_commands().len(), 15);

    let (_, menu) = typed("<p>a/b</p>", 4);
    assert_eq!(*menu.state(), SlashState::Idle);

    let (_, menu) = typed("<pre><code>/he</code></pre>", 4);
    assert_eq!(*menu.state(), SlashState::Idle);
}

#[test]
fn no_match_hides_the_menu_but_keeps_filtering() {
    let (mut editor, mut menu) = typed("<p>/zzz</p>", 5);
    assert!(matches!(menu.state(), SlashState::Filtering { .. }));
    assert!(!menu.is_visible());

    editor
        .change("typing", |draft| draft.delete_text(2, 5))
        .expect("delete typed text");
    menu.on_text_change(editor.doc(), editor.selection());
    assert!(menu.is_visible());
    assert_eq!(menu.visible_commands().len(), 15);
}

#[test]
fn typing_a_space_closes_the_menu() {
    let (mut editor, mut menu) = typed("<p>/ta</p>", 4);
    assert!(menu.is_visible());
    editor
        .change("typing", |draft| draft.insert_text(4, " "))
        .expect("insert space");
    menu.on_text_change(editor.doc(), editor.selection());
    assert_eq!(*menu.state(), SlashState::Idle);
}

#[test]
fn arrow_keys_wrap_both_ways() {
    let (_, mut menu) = typed("<p>/</p>", 2);
    assert_eq!(menu.on_key(SlashKey::Up), KeyResult::Handled);
    assert_eq!(menu.selected_index(), 14);
    assert_eq!(menu.on_key(SlashKey::Enter), KeyResult::Execute(SlashCommand::AiEnhance));
    assert_eq!(menu.on_key(SlashKey::Down), KeyResult::Handled);
    assert_eq!(menu.selected_index(), 0);
    assert_eq!(menu.on_key(SlashKey::Escape), KeyResult::Handled);
    assert_eq!(*menu.state(), SlashState::Idle);
    assert_eq!(menu.on_key(SlashKey::Down), KeyResult::Ignored);
}

#[test]
fn heading_command_removes_query_and_converts_block() {
    let (mut editor, mut menu) = typed("<p>Intro /head</p>", 12);
    assert_eq!(menu.visible_commands().len(), 3);
    assert_eq!(menu.on_key(SlashKey::Down), KeyResult::Handled);
    assert_eq!(menu.selected_command(), Some(SlashCommand::Heading2));
    let outcome = menu.execute(&mut editor, SlashCommand::Heading2).expect("command applies");
    assert_eq!(outcome, SlashOutcome::Applied { command: SlashCommand::Heading2 });
    assert_eq!(editor.to_markup(), "<h2>Intro </h2>");
    assert_eq!(*menu.state(), SlashState::Idle);

    assert!(editor.undo());
    assert_eq!(editor.to_markup(), "<p>Intro /head</p>");
}

#[test]
fn table_goes_after_a_non_empty_block() {
    let (mut editor, mut menu) = typed("<p>Hello /tab</p>", 11);
    let outcome = menu.execute(&mut editor, SlashCommand::Table).expect("command applies");
    assert_eq!(outcome, SlashOutcome::Applied { command: SlashCommand::Table });

    let markup = editor.to_markup();
    assert!(markup.starts_with(
        "<p>Hello </p><table><tbody><tr><th><p></p></th><th><p></p></th><th><p></p></th></tr><tr><td>"
    ));
    assert_eq!(markup.matches("<td>").count(), 6);
    assert_eq!(*editor.selection(), Selection::collapsed(12));
}

#[test]
fn divider_replaces_an_empty_paragraph() {
    let (mut editor, mut menu) = typed("<p>/div</p>", 5);
    menu.execute(&mut editor, SlashCommand::Divider).expect("command applies");
    assert_eq!(editor.to_markup(), "<hr><p></p>");
    assert_eq!(*editor.selection(), Selection::collapsed(2));
}

#[test]
fn callout_placeholder_is_selected() {
    let (mut editor, mut menu) = typed("<p>Note /call</p>", 11);
    menu.execute(&mut editor, SlashCommand::Callout).expect("command applies");
    assert_eq!(
        editor.to_markup(),
        format!(
            "<p>Note </p><div data-type=\"callout\" data-emoji=\"💡\" data-callout-kind=\"info\">{CALLOUT_PLACEHOLDER}</div>"
        )
    );
    let len = CALLOUT_PLACEHOLDER.chars().count();
    assert_eq!(*editor.selection(), Selection::new(8, 8 + len));
}

#[test]
fn toggle_wraps_the_current_block() {
    let (mut editor, mut menu) = typed("<p>Title /toggle</p>", 14);
    menu.execute(&mut editor, SlashCommand::Toggle).expect("command applies");
    assert_eq!(
        editor.to_markup(),
        "<details data-open=\"true\"><p>Title </p><p></p></details>"
    );
    assert_eq!(*editor.selection(), Selection::collapsed(8));
}

#[test]
fn list_and_quote_commands() {
    let (mut editor, mut menu) = typed("<p>Buy milk /task</p>", 15);
    menu.execute(&mut editor, SlashCommand::TaskList).expect("command applies");
    assert_eq!(
        editor.to_markup(),
        "<ul data-type=\"taskList\"><li data-type=\"taskItem\" data-checked=\"false\"><p>Buy milk </p></li></ul>"
    );

    let (mut editor, mut menu) = typed("<p>/quote</p>", 7);
    menu.execute(&mut editor, SlashCommand::Quote).expect("command applies");
    assert_eq!(editor.to_markup(), "<blockquote><p></p></blockquote>");
}

#[test]
fn ai_prompt_replaces_an_empty_paragraph() {
    let (mut editor, mut menu) = typed("<p>First</p><p>/ai</p>", 11);
    let outcome = menu.execute(&mut editor, SlashCommand::AiPrompt).expect("command applies");
    let SlashOutcome::PromptInserted { prompt_id, pos } = outcome else {
        panic!("expected a prompt node");
    };
    assert_eq!(pos, 7);
    let block = editor.doc().block_at(pos).expect("prompt at pos");
    assert_eq!(block.kind, BlockKind::AiPrompt);
    assert_eq!(
        editor.to_markup(),
        format!("<p>First</p><div data-ai-prompt=\"{prompt_id}\"></div>")
    );
}

#[test]
fn image_and_enhance_ask_the_host() {
    let (mut editor, mut menu) = typed("<p>Intro /ima</p>", 11);
    assert_eq!(
        menu.execute(&mut editor, SlashCommand::Image).expect("command applies"),
        SlashOutcome::RequestImage { insert_pos: 8 }
    );
    assert_eq!(editor.to_markup(), "<p>Intro </p>");

    let (mut editor, mut menu) = typed("<p>Intro</p><p>/ima</p>", 12);
    let SlashOutcome::RequestImage { insert_pos } =
        menu.execute(&mut editor, SlashCommand::Image).expect("command applies")
    else {
        panic!("image command asks the host for a file");
    };
    assert_eq!(insert_pos, 7);
    insert_image(&mut editor, insert_pos, "up.png").expect("image lands");
    assert_eq!(
        editor.to_markup(),
        "<p>Intro</p><img src=\"up.png\" width=\"100%\">"
    );

    let (mut editor, mut menu) = typed("<p>Text /enh</p>", 10);
    assert_eq!(
        menu.execute(&mut editor, SlashCommand::AiEnhance).expect("command applies"),
        SlashOutcome::RequestEnhance
    );
    assert_eq!(editor.to_markup(), "<p>Text </p>");
}

#[test]
fn execute_on_a_stale_range_does_nothing() {
    let (mut editor, mut menu) = typed("<p>/he</p>", 4);
    editor.replace_document(blockpad_core::Document::empty(), Selection::collapsed(1));
    assert_eq!(
        menu.execute(&mut editor, SlashCommand::Heading1).expect("no error"),
        SlashOutcome::Inactive
    );
    assert_eq!(editor.to_markup(), "<p></p>");

    let mut idle = SlashMenu::default();
    assert_eq!(
        idle.execute(&mut editor, SlashCommand::Heading1).expect("no error"),
        SlashOutcome::Inactive
    );
}
