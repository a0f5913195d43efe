//! Tolerant markup reader. Never fails: malformed input is repaired while
//! tokenizing, unknown tags are looked through, and anything that cannot be
//! placed ends up as paragraph text.

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{Block, Document, Marks, Node, TextNode};
use crate::kind::{BlockKind, MAX_HEADING_LEVEL};
use crate::normalize::normalize_document;

const NORMALIZE_LIMIT: usize = 100;

pub fn parse(markup: &str) -> Document {
    let nodes = parse_fragment(markup);
    match normalize_document(Document::new(nodes), NORMALIZE_LIMIT) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(%err, "parsed markup did not normalize, falling back to plain paragraphs");
            Document::new(
                markup_text(markup)
                    .split('\n')
                    .map(Node::paragraph)
                    .collect(),
            )
        }
    }
}

/// Parses a fragment into un-normalized blocks, for splicing into an
/// existing document.
pub fn parse_fragment(markup: &str) -> Vec<Node> {
    let tree = build_tree(tokenize(markup));
    FlowBuilder::default().build(&tree)
}

fn markup_text(markup: &str) -> String {
    let mut out = String::new();
    for token in tokenize(markup) {
        if let Token::Text(text) = token {
            out.push_str(&text);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open {
        tag: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum MarkupNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

impl MarkupNode {
    fn attr(&self, name: &str) -> Option<&str> {
        match self {
            MarkupNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            MarkupNode::Text(_) => None,
        }
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;
    let mut text = String::new();

    while let Some(lt) = rest.find('<') {
        text.push_str(&rest[..lt]);
        let tail = &rest[lt..];

        if let Some(after) = tail.strip_prefix("<!--") {
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }
        let next = tail[1..].chars().next();
        let is_markup = matches!(next, Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?');
        let Some(gt) = tail.find('>').filter(|_| is_markup) else {
            text.push('<');
            rest = &tail[1..];
            continue;
        };

        let inner = &tail[1..gt];
        rest = &tail[gt + 1..];
        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }
        if !text.is_empty() {
            tokens.push(Token::Text(decode_entities(&std::mem::take(&mut text))));
        }
        if let Some(name) = inner.strip_prefix('/') {
            tokens.push(Token::Close(name.trim().to_ascii_lowercase()));
        } else {
            tokens.push(parse_open_tag(inner));
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(decode_entities(&text)));
    }
    tokens
}

fn parse_open_tag(inner: &str) -> Token {
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(stripped) => (stripped, true),
        None => (inner, false),
    };
    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let tag = inner[..name_end].to_ascii_lowercase();
    let mut attrs = Vec::new();

    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let quote = after_eq.chars().next().filter(|c| *c == '"' || *c == '\'');
            match quote {
                Some(q) => {
                    let body = &after_eq[1..];
                    let end = body.find(q).unwrap_or(body.len());
                    rest = body.get(end + 1..).unwrap_or("");
                    decode_entities(&body[..end])
                }
                None => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    decode_entities(&after_eq[..end])
                }
            }
        } else {
            String::new()
        };
        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = rest.trim_start();
    }

    Token::Open {
        tag,
        attrs,
        self_closing,
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|semi| *semi <= 10).and_then(|semi| {
            let name = &tail[1..semi];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "br" | "hr" | "img" | "input" | "meta" | "link" | "col" | "wbr" | "source" | "area"
    )
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "table"
            | "thead"
            | "tbody"
            | "tfoot"
            | "tr"
            | "td"
            | "th"
            | "pre"
            | "blockquote"
            | "hr"
            | "img"
            | "div"
            | "details"
            | "summary"
            | "section"
            | "article"
            | "main"
            | "header"
            | "footer"
            | "nav"
            | "aside"
            | "figure"
            | "figcaption"
            | "body"
            | "html"
            | "dl"
            | "dt"
            | "dd"
    )
}

fn is_dropped_tag(tag: &str) -> bool {
    matches!(
        tag,
        "head" | "script" | "style" | "title" | "template" | "noscript"
    )
}

struct OpenElement {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<MarkupNode>,
}

/// Builds the element tree, closing whatever the input forgot to close.
fn build_tree(tokens: Vec<Token>) -> Vec<MarkupNode> {
    let mut root: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();

    fn close_top(stack: &mut Vec<OpenElement>, root: &mut Vec<MarkupNode>) {
        if let Some(el) = stack.pop() {
            let node = MarkupNode::Element {
                tag: el.tag,
                attrs: el.attrs,
                children: el.children,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => root.push(node),
            }
        }
    }

    fn close_until(stack: &mut Vec<OpenElement>, root: &mut Vec<MarkupNode>, ix: usize) {
        while stack.len() > ix {
            close_top(stack, root);
        }
    }

    /// Index of an open `tag` that is not shielded by one of `scope`.
    fn open_in_scope(stack: &[OpenElement], tag: &str, scope: &[&str]) -> Option<usize> {
        for (ix, el) in stack.iter().enumerate().rev() {
            if el.tag == tag {
                return Some(ix);
            }
            if scope.contains(&el.tag.as_str()) {
                return None;
            }
        }
        None
    }

    for token in tokens {
        match token {
            Token::Text(text) => match stack.last_mut() {
                Some(parent) => parent.children.push(MarkupNode::Text(text)),
                None => root.push(MarkupNode::Text(text)),
            },
            Token::Open {
                tag,
                attrs,
                self_closing,
            } => {
                if is_block_tag(&tag) && tag != "img" {
                    let scope = ["li", "td", "th", "blockquote", "details", "div"];
                    if let Some(ix) = open_in_scope(&stack, "p", &scope) {
                        close_until(&mut stack, &mut root, ix);
                    }
                }
                let implied: &[(&str, &[&str])] = match tag.as_str() {
                    "li" => &[("li", &["ul", "ol"])],
                    "tr" => &[("tr", &["table"])],
                    "td" | "th" => &[("td", &["tr", "table"]), ("th", &["tr", "table"])],
                    "summary" => &[("summary", &["details"])],
                    _ => &[],
                };
                for (open, scope) in implied {
                    if let Some(ix) = open_in_scope(&stack, open, scope) {
                        close_until(&mut stack, &mut root, ix);
                    }
                }

                stack.push(OpenElement {
                    tag: tag.clone(),
                    attrs,
                    children: Vec::new(),
                });
                if self_closing || is_void(&tag) {
                    close_top(&mut stack, &mut root);
                }
            }
            Token::Close(tag) => {
                match stack.iter().rposition(|el| el.tag == tag) {
                    Some(ix) => close_until(&mut stack, &mut root, ix),
                    None => debug!(tag, "ignoring stray close tag"),
                }
            }
        }
    }
    close_until(&mut stack, &mut root, 0);
    root
}

/// Turns a markup tree into blocks, collecting loose inline content into
/// paragraphs.
#[derive(Default)]
struct FlowBuilder {
    out: Vec<Node>,
    pending: Vec<TextNode>,
}

impl FlowBuilder {
    fn build(mut self, nodes: &[MarkupNode]) -> Vec<Node> {
        for node in nodes {
            self.push(node);
        }
        self.flush();
        self.out
    }

    fn push(&mut self, node: &MarkupNode) {
        match node {
            MarkupNode::Text(text) => {
                if !text.trim().is_empty() || !self.pending.is_empty() {
                    collect_inline(node, Marks::default(), &mut self.pending);
                }
            }
            MarkupNode::Element { tag, .. } if is_dropped_tag(tag) => {
                debug!(tag, "dropping non-content element");
            }
            MarkupNode::Element { tag, .. } if is_block_tag(tag) => {
                self.flush();
                self.out.extend(block_from(node));
            }
            MarkupNode::Element { .. } => collect_inline(node, Marks::default(), &mut self.pending),
        }
    }

    fn flush(&mut self) {
        let mut runs = std::mem::take(&mut self.pending);
        if runs.iter().all(|r| r.text.trim().is_empty()) {
            return;
        }
        if let Some(first) = runs.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        if let Some(last) = runs.last_mut() {
            last.text = last.text.trim_end().to_string();
        }
        self.out.push(Node::paragraph_with(runs));
    }
}

fn flow(children: &[MarkupNode]) -> Vec<Node> {
    FlowBuilder::default().build(children)
}

fn has_block_child(children: &[MarkupNode]) -> bool {
    children.iter().any(|child| {
        matches!(child, MarkupNode::Element { tag, .. } if is_block_tag(tag))
    })
}

fn inline(children: &[MarkupNode]) -> Vec<TextNode> {
    let mut runs = Vec::new();
    for child in children {
        collect_inline(child, Marks::default(), &mut runs);
    }
    runs
}

fn collect_inline(node: &MarkupNode, marks: Marks, out: &mut Vec<TextNode>) {
    match node {
        MarkupNode::Text(text) => {
            // Line breaks are written as `<br>`, so a raw newline is only
            // source formatting. Tabs and carriage returns are content.
            let text = text.replace('\n', " ");
            push_run(out, text, marks);
        }
        MarkupNode::Element { tag, children, .. } => {
            let mut marks = marks;
            match tag.as_str() {
                "br" => return push_run(out, "\n".to_string(), marks),
                "img" | "input" | "hr" => return,
                tag if is_dropped_tag(tag) => return,
                "strong" | "b" => marks.bold = true,
                "em" | "i" => marks.italic = true,
                "s" | "del" | "strike" => marks.strike = true,
                "mark" => marks.highlight = true,
                "code" => marks.code = true,
                tag if is_block_tag(tag) => {
                    if out.last().is_some_and(|r| !r.text.is_empty() && !r.text.ends_with('\n')) {
                        push_run(out, "\n".to_string(), marks);
                    }
                }
                _ => {}
            }
            for child in children {
                collect_inline(child, marks, out);
            }
        }
    }
}

fn push_run(out: &mut Vec<TextNode>, text: String, marks: Marks) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.marks == marks => last.text.push_str(&text),
        _ => out.push(TextNode { text, marks }),
    }
}

fn raw_text(node: &MarkupNode, out: &mut String) {
    match node {
        MarkupNode::Text(text) => out.push_str(text),
        MarkupNode::Element { tag, children, .. } => {
            if tag == "br" {
                out.push('\n');
            }
            for child in children {
                raw_text(child, out);
            }
        }
    }
}

fn element_children(node: &MarkupNode) -> &[MarkupNode] {
    match node {
        MarkupNode::Element { children, .. } => children,
        MarkupNode::Text(_) => &[],
    }
}

fn block_from(node: &MarkupNode) -> Vec<Node> {
    let MarkupNode::Element { tag, children, .. } = node else {
        return Vec::new();
    };

    match tag.as_str() {
        "p" | "summary" | "dt" | "figcaption" => {
            if has_block_child(children) {
                flow(children)
            } else {
                vec![Node::paragraph_with(inline(children))]
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..]
                .parse::<u64>()
                .unwrap_or(1)
                .min(MAX_HEADING_LEVEL);
            let mut block = Block::with_children(
                BlockKind::Heading,
                inline(children).into_iter().map(Node::Text).collect(),
            );
            block.attrs.insert("level".into(), Value::from(level));
            vec![Node::Block(block)]
        }
        "ul" | "ol" => vec![list_from(node)],
        "li" | "dd" => flow(children),
        "table" => vec![table_from(node)],
        "thead" | "tbody" | "tfoot" | "tr" | "td" | "th" => flow(children),
        "pre" => {
            let mut text = String::new();
            for child in children {
                raw_text(child, &mut text);
            }
            let language = code_language(node);
            vec![Node::code_block(text, language.as_deref())]
        }
        "blockquote" => vec![Node::block(BlockKind::Blockquote, flow(children))],
        "hr" => vec![Node::divider()],
        "img" => {
            let mut block = Block::new(BlockKind::Image);
            for key in ["src", "alt", "title", "width"] {
                if let Some(value) = node.attr(key) {
                    block.attrs.insert(key.into(), Value::from(value));
                }
            }
            vec![Node::Block(block)]
        }
        "details" => vec![toggle_from(node)],
        "div" => {
            if let Some(id) = node.attr("data-ai-prompt") {
                let mut block = Block::new(BlockKind::AiPrompt);
                block.attrs.insert("promptId".into(), Value::from(id));
                return vec![Node::Block(block)];
            }
            if node.attr("data-type") == Some("callout") {
                let mut block = Block::with_children(
                    BlockKind::Callout,
                    inline(children).into_iter().map(Node::Text).collect(),
                );
                if let Some(emoji) = node.attr("data-emoji") {
                    block.attrs.insert("emoji".into(), Value::from(emoji));
                }
                if let Some(kind) = node.attr("data-callout-kind") {
                    block.attrs.insert("calloutKind".into(), Value::from(kind));
                }
                return vec![Node::Block(block)];
            }
            flow(children)
        }
        _ => flow(children),
    }
}

fn list_from(node: &MarkupNode) -> Node {
    let task = node.attr("data-type") == Some("taskList");
    let ordered = matches!(node, MarkupNode::Element { tag, .. } if tag == "ol");
    let kind = if task {
        BlockKind::TaskList
    } else if ordered {
        BlockKind::OrderedList
    } else {
        BlockKind::BulletList
    };
    let mut list = Block::new(kind);
    if kind == BlockKind::OrderedList {
        if let Some(start) = node.attr("start").and_then(|s| s.trim().parse::<u64>().ok()) {
            list.attrs.insert("start".into(), Value::from(start.max(1)));
        }
    }

    for child in element_children(node) {
        match child {
            MarkupNode::Element { tag, children, .. } if tag == "li" => {
                let is_task = task || child.attr("data-type") == Some("taskItem");
                let item_kind = if is_task {
                    BlockKind::TaskItem
                } else {
                    BlockKind::ListItem
                };
                let mut item = Block::with_children(item_kind, flow(children));
                if is_task {
                    let checked = child.attr("data-checked") == Some("true");
                    item.attrs.insert("checked".into(), Value::Bool(checked));
                }
                list.children.push(Node::Block(item));
            }
            other => list.children.extend(flow(std::slice::from_ref(other))),
        }
    }
    Node::Block(list)
}

fn table_from(node: &MarkupNode) -> Node {
    fn rows(children: &[MarkupNode], out: &mut Vec<Node>) {
        for child in children {
            match child {
                MarkupNode::Element { tag, children, .. } if tag == "tr" => {
                    let cells = children
                        .iter()
                        .filter_map(|cell| match cell {
                            MarkupNode::Element { tag, children, .. } if tag == "th" => {
                                Some(Node::block(BlockKind::TableHeader, flow(children)))
                            }
                            MarkupNode::Element { tag, children, .. } if tag == "td" => {
                                Some(Node::block(BlockKind::TableCell, flow(children)))
                            }
                            MarkupNode::Text(text) if text.trim().is_empty() => None,
                            other => Some(Node::block(
                                BlockKind::TableCell,
                                flow(std::slice::from_ref(other)),
                            )),
                        })
                        .collect();
                    out.push(Node::block(BlockKind::TableRow, cells));
                }
                MarkupNode::Element { tag, children, .. }
                    if matches!(tag.as_str(), "thead" | "tbody" | "tfoot") =>
                {
                    rows(children, out)
                }
                MarkupNode::Text(text) if text.trim().is_empty() => {}
                other => {
                    debug!("moving stray table content into its own row");
                    let content = flow(std::slice::from_ref(other));
                    if !content.is_empty() {
                        out.push(Node::block(
                            BlockKind::TableRow,
                            vec![Node::block(BlockKind::TableCell, content)],
                        ));
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    rows(element_children(node), &mut out);
    Node::block(BlockKind::Table, out)
}

fn toggle_from(node: &MarkupNode) -> Node {
    let open = match node.attr("data-open") {
        Some(value) => value != "false",
        None => node.attr("open").is_some(),
    };
    let mut children = Vec::new();
    let mut rest = Vec::new();
    for child in element_children(node) {
        match child {
            MarkupNode::Element { tag, children: inner, .. } if tag == "summary" => {
                children.push(Node::paragraph_with(inline(inner)));
            }
            other => rest.push(other.clone()),
        }
    }
    children.extend(flow(&rest));
    let mut block = Block::with_children(BlockKind::Toggle, children);
    block.attrs.insert("isOpen".into(), Value::Bool(open));
    Node::Block(block)
}

fn code_language(pre: &MarkupNode) -> Option<String> {
    let from_class = |node: &MarkupNode| {
        node.attr("class").and_then(|class| {
            class
                .split_whitespace()
                .find_map(|c| c.strip_prefix("language-"))
                .map(str::to_string)
        })
    };
    element_children(pre)
        .iter()
        .find(|child| matches!(child, MarkupNode::Element { tag, .. } if tag == "code"))
        .and_then(from_class)
        .or_else(|| from_class(pre))
}
