use crate::core::{Block, Document, Node, TextNode};
use crate::kind::BlockKind;

/// Serializes a document to its persisted markup. Output is fully determined
/// by the tree: attributes are written in a fixed order and no whitespace is
/// added between tags.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for node in &doc.children {
        write_node(node, &mut out);
    }
    out
}

pub fn serialize_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(run) => write_run(run, out),
        Node::Block(block) => write_block(block, out),
    }
}

fn write_block(block: &Block, out: &mut String) {
    match block.kind {
        BlockKind::Paragraph => wrap_inline(out, "<p>", block, "</p>"),
        BlockKind::Heading => {
            let level = block.heading_level().unwrap_or(1);
            out.push_str(&format!("<h{level}>"));
            write_inline(block, out);
            out.push_str(&format!("</h{level}>"));
        }
        BlockKind::BulletList => wrap_blocks(out, "<ul>", block, "</ul>"),
        BlockKind::OrderedList => {
            match block.attr_u64("start") {
                Some(start) if start != 1 => out.push_str(&format!("<ol start=\"{start}\">")),
                _ => out.push_str("<ol>"),
            }
            write_children(block, out);
            out.push_str("</ol>");
        }
        BlockKind::ListItem => wrap_blocks(out, "<li>", block, "</li>"),
        BlockKind::TaskList => wrap_blocks(out, "<ul data-type=\"taskList\">", block, "</ul>"),
        BlockKind::TaskItem => {
            let checked = block.attr_bool("checked").unwrap_or(false);
            out.push_str(&format!(
                "<li data-type=\"taskItem\" data-checked=\"{checked}\">"
            ));
            write_children(block, out);
            out.push_str("</li>");
        }
        BlockKind::Table => wrap_blocks(out, "<table><tbody>", block, "</tbody></table>"),
        BlockKind::TableRow => wrap_blocks(out, "<tr>", block, "</tr>"),
        BlockKind::TableHeader => wrap_blocks(out, "<th>", block, "</th>"),
        BlockKind::TableCell => wrap_blocks(out, "<td>", block, "</td>"),
        BlockKind::CodeBlock => {
            match block.attr_str("language").filter(|l| !l.is_empty()) {
                Some(language) => out.push_str(&format!(
                    "<pre><code class=\"language-{}\">",
                    escape(language)
                )),
                None => out.push_str("<pre><code>"),
            }
            out.push_str(&escape(&block.text_content()));
            out.push_str("</code></pre>");
        }
        BlockKind::Blockquote => wrap_blocks(out, "<blockquote>", block, "</blockquote>"),
        BlockKind::HorizontalRule => out.push_str("<hr>"),
        BlockKind::Image => {
            out.push_str("<img");
            for key in ["src", "alt", "title", "width"] {
                if let Some(value) = block.attr_str(key) {
                    out.push_str(&format!(" {key}=\"{}\"", escape(value)));
                }
            }
            out.push('>');
        }
        BlockKind::Callout => {
            let open = format!(
                "<div data-type=\"callout\" data-emoji=\"{}\" data-callout-kind=\"{}\">",
                escape(block.attr_str("emoji").unwrap_or_default()),
                escape(block.attr_str("calloutKind").unwrap_or_default()),
            );
            wrap_inline(out, &open, block, "</div>");
        }
        BlockKind::Toggle => {
            let open = block.attr_bool("isOpen").unwrap_or(true);
            out.push_str(&format!("<details data-open=\"{open}\">"));
            write_children(block, out);
            out.push_str("</details>");
        }
        BlockKind::AiPrompt => {
            out.push_str(&format!(
                "<div data-ai-prompt=\"{}\"></div>",
                escape(block.attr_str("promptId").unwrap_or_default())
            ));
        }
    }
}

fn wrap_inline(out: &mut String, open: &str, block: &Block, close: &str) {
    out.push_str(open);
    write_inline(block, out);
    out.push_str(close);
}

fn wrap_blocks(out: &mut String, open: &str, block: &Block, close: &str) {
    out.push_str(open);
    write_children(block, out);
    out.push_str(close);
}

fn write_children(block: &Block, out: &mut String) {
    for child in &block.children {
        write_node(child, out);
    }
}

fn write_inline(block: &Block, out: &mut String) {
    for child in &block.children {
        if let Node::Text(run) = child {
            write_run(run, out);
        }
    }
}

/// Opening order of mark tags; they close in reverse.
fn mark_tags(run: &TextNode) -> Vec<&'static str> {
    let marks = &run.marks;
    [
        (marks.bold, "strong"),
        (marks.italic, "em"),
        (marks.strike, "s"),
        (marks.highlight, "mark"),
        (marks.code, "code"),
    ]
    .into_iter()
    .filter_map(|(on, tag)| on.then_some(tag))
    .collect()
}

fn write_run(run: &TextNode, out: &mut String) {
    if run.text.is_empty() {
        return;
    }
    let tags = mark_tags(run);
    for tag in &tags {
        out.push_str(&format!("<{tag}>"));
    }
    for (ix, line) in run.text.split('\n').enumerate() {
        if ix > 0 {
            out.push_str("<br>");
        }
        out.push_str(&escape(line));
    }
    for tag in tags.iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
}

pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
