//! Plain text in and out, used only around the AI collaborators.
//!
//! Export is lossy: attributes, marks and media disappear. Import reads a
//! small markdown subset: `**bold**`, `*italic*`, `` `code` ``, `-`/`*`
//! bullets, `N.` numbered lines and blank-line separated paragraphs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::{Block, Document, Marks, Node, TextNode};
use crate::kind::BlockKind;

static BULLET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+(.*)$").expect("valid bullet regex"));
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.\s+(.*)$").expect("valid numbered regex"));

pub fn to_plain_text(doc: &Document) -> String {
    render_blocks(&doc.children, "\n\n")
}

fn render_blocks(nodes: &[Node], separator: &str) -> String {
    nodes
        .iter()
        .filter_map(Node::as_block)
        .map(render_block)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn render_block(block: &Block) -> String {
    match block.kind {
        BlockKind::Paragraph | BlockKind::Heading | BlockKind::CodeBlock => block.text_content(),
        BlockKind::Callout => {
            let emoji = block.attr_str("emoji").unwrap_or_default();
            let text = block.text_content();
            if emoji.is_empty() {
                text
            } else {
                format!("{emoji} {text}")
            }
        }
        BlockKind::HorizontalRule => "---".to_string(),
        BlockKind::Image | BlockKind::AiPrompt => String::new(),
        BlockKind::BulletList | BlockKind::OrderedList | BlockKind::TaskList => render_list(block),
        BlockKind::Table => block
            .children
            .iter()
            .filter_map(Node::as_block)
            .map(|row| {
                row.children
                    .iter()
                    .filter_map(Node::as_block)
                    .map(|cell| render_blocks(&cell.children, " ").replace('\n', " "))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        BlockKind::Blockquote
        | BlockKind::Toggle
        | BlockKind::ListItem
        | BlockKind::TaskItem
        | BlockKind::TableRow
        | BlockKind::TableHeader
        | BlockKind::TableCell => render_blocks(&block.children, "\n\n"),
    }
}

fn render_list(list: &Block) -> String {
    let mut number = list.attr_u64("start").unwrap_or(1);
    let mut lines = Vec::new();
    for item in list.children.iter().filter_map(Node::as_block) {
        let marker = match list.kind {
            BlockKind::OrderedList => {
                let marker = format!("{number}. ");
                number += 1;
                marker
            }
            BlockKind::TaskList if item.attr_bool("checked").unwrap_or(false) => "- [x] ".into(),
            BlockKind::TaskList => "- [ ] ".into(),
            _ => "- ".into(),
        };
        let body = render_blocks(&item.children, "\n");
        let mut item_lines = body.lines();
        lines.push(format!("{marker}{}", item_lines.next().unwrap_or_default()));
        lines.extend(item_lines.map(|line| format!("  {line}")));
    }
    lines.join("\n")
}

/// Reads plain text (typically an AI response) into blocks.
pub fn from_plain_text(text: &str) -> Vec<Node> {
    let mut blocks = Vec::new();
    for chunk in chunks(text) {
        let mut lines = chunk.into_iter().peekable();
        while let Some(line) = lines.next() {
            if let Some(item) = BULLET_LINE.captures(line) {
                let mut items = vec![item[1].to_string()];
                while let Some(next) = lines.peek().and_then(|l| BULLET_LINE.captures(l)) {
                    items.push(next[1].to_string());
                    lines.next();
                }
                blocks.push(list(BlockKind::BulletList, None, items));
            } else if let Some(item) = NUMBERED_LINE.captures(line) {
                let start = item[1].parse::<u64>().ok();
                let mut items = vec![item[2].to_string()];
                while let Some(next) = lines.peek().and_then(|l| NUMBERED_LINE.captures(l)) {
                    items.push(next[2].to_string());
                    lines.next();
                }
                blocks.push(list(BlockKind::OrderedList, start, items));
            } else {
                let mut paragraph = vec![line.to_string()];
                while let Some(next) = lines.peek() {
                    if BULLET_LINE.is_match(next) || NUMBERED_LINE.is_match(next) {
                        break;
                    }
                    paragraph.push((*next).to_string());
                    lines.next();
                }
                blocks.push(Node::paragraph_with(parse_inline(&paragraph.join("\n"))));
            }
        }
    }
    blocks
}

/// Groups of consecutive non-blank lines.
fn chunks(text: &str) -> Vec<Vec<&str>> {
    let mut out: Vec<Vec<&str>> = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn list(kind: BlockKind, start: Option<u64>, items: Vec<String>) -> Node {
    let mut block = Block::with_children(
        kind,
        items
            .iter()
            .map(|item| {
                Node::block(
                    BlockKind::ListItem,
                    vec![Node::paragraph_with(parse_inline(item))],
                )
            })
            .collect(),
    );
    if let Some(start) = start.filter(|s| *s > 1) {
        block.attrs.insert("start".into(), Value::from(start));
    }
    Node::Block(block)
}

pub fn parse_inline(text: &str) -> Vec<TextNode> {
    let mut out = Vec::new();
    inline_into(text, Marks::default(), &mut out);
    out
}

fn inline_into(text: &str, marks: Marks, out: &mut Vec<TextNode>) {
    let mut plain = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        let delimited = match ch {
            '`' => rest[1..].find('`').map(|end| (1, end + 1, 1)),
            '*' if rest.starts_with("**") => rest[2..]
                .find("**")
                .filter(|end| *end > 0)
                .map(|end| (2, end + 2, 2)),
            '*' => rest[1..]
                .find('*')
                .filter(|end| *end > 0)
                .map(|end| (1, end + 1, 1)),
            _ => None,
        };

        let Some((open, close, close_len)) = delimited else {
            plain.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        };

        push(out, std::mem::take(&mut plain), marks);
        let inner = &rest[open..close];
        match (ch, open) {
            ('`', _) => push(out, inner.to_string(), Marks { code: true, ..marks }),
            (_, 2) => inline_into(inner, Marks { bold: true, ..marks }, out),
            _ => inline_into(inner, Marks { italic: true, ..marks }, out),
        }
        rest = &rest[close + close_len..];
    }
    push(out, plain, marks);
}

fn push(out: &mut Vec<TextNode>, text: String, marks: Marks) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.marks == marks => last.text.push_str(&text),
        _ => out.push(TextNode { text, marks }),
    }
}
