use blockpad_core::{
    markup, slash, BlockKind, Document, Editor, Marks, Node, Selection, TextNode,
};
use uuid::Uuid;

fn rich_document() -> Document {
    Document::new(vec![
        Node::heading(2, "Plan"),
        Node::paragraph_with(vec![
            TextNode::plain("Ship "),
            TextNode {
                text: "fast".into(),
                marks: Marks {
                    bold: true,
                    italic: true,
                    ..Marks::default()
                },
            },
            TextNode::plain(" & \"safe\"\nsecond line"),
        ]),
        Node::list(BlockKind::TaskList, ["write", "test"]),
        Node::list(BlockKind::OrderedList, ["one", "two"]),
        Node::code_block("fn main() {\n    println!(\"<hi>\");\n}", Some("rust")),
        Node::callout("Remember"),
        Node::toggle(vec![Node::paragraph("Details"), Node::paragraph("Hidden")]),
        Node::image("https://cdn.example.com/a.png"),
        Node::divider(),
        slash::table(2, 2),
        Node::block(BlockKind::Blockquote, vec![Node::paragraph("quoted")]),
        Node::ai_prompt(Uuid::new_v4()),
    ])
}

#[test]
fn editor_documents_reach_a_fixed_point_after_one_round_trip() {
    let editor = Editor::new(rich_document(), Selection::collapsed(1));
    let first = editor.to_markup();
    let reparsed = markup::serialize(&markup::parse(&first));
    assert_eq!(reparsed, first);
}

#[test]
fn serialized_markup_is_exact() {
    let doc = Document::new(vec![
        Node::heading(1, "Title"),
        Node::list(BlockKind::TaskList, ["done"]),
        Node::code_block("a < b", Some("rust")),
    ]);
    let editor = Editor::new(doc, Selection::collapsed(1));
    assert_eq!(
        editor.to_markup(),
        concat!(
            "<h1>Title</h1>",
            "<ul data-type=\"taskList\"><li data-type=\"taskItem\" data-checked=\"false\"><p>done</p></li></ul>",
            "<pre><code class=\"language-rust\">a &lt; b</code></pre>",
        )
    );
}

#[test]
fn foreign_markup_maps_onto_known_blocks() {
    let editor = Editor::from_markup(
        "<h5>Deep</h5><section><article>Loose <b>text</b></article></section><script>x()</script><font>old</font>",
    );
    assert_eq!(
        editor.to_markup(),
        "<h3>Deep</h3><p>Loose <strong>text</strong></p><p>old</p>"
    );
}

#[test]
fn broken_markup_still_opens() {
    let editor = Editor::from_markup("<p>unclosed <strong>bold<ul><li>item");
    let markup = editor.to_markup();
    assert!(markup.starts_with("<p>unclosed <strong>bold</strong></p>"));
    assert!(markup.contains("<li><p>item</p></li>"));

    let empty = Editor::from_markup("");
    assert_eq!(empty.to_markup(), "<p></p>");
}

#[test]
fn details_with_summary_become_toggles() {
    let editor = Editor::from_markup("<details><summary>More</summary><p>body</p></details>");
    assert_eq!(
        editor.to_markup(),
        "<details data-open=\"false\"><p>More</p><p>body</p></details>"
    );
}

#[test]
fn tabs_and_carriage_returns_survive_a_reload() {
    let mut editor = Editor::from_markup("<p>ab</p><p>cd</p>");
    editor
        .change("typing", |draft| {
            draft.insert_text(2, "\t")?;
            draft.insert_text(7, "\r")
        })
        .expect("insert applies");
    let first = editor.to_markup();
    assert_eq!(first, "<p>a\tb</p><p>c\rd</p>");
    assert_eq!(markup::serialize(&markup::parse(&first)), first);
}
