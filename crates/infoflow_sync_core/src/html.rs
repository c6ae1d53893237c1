//! HTML to markdown conversion for record content.
//!
//! Record content arrives either as HTML (saved web pages) or as plain text.
//! HTML is parsed into a tolerant element tree and rendered to markdown with
//! ATX headings and fenced code blocks. Anything that does not look like HTML
//! passes through untouched.

use log::debug;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "title", "noscript", "template"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "nav", "figure",
    "figcaption", "table", "tr", "dl", "dt", "dd", "body", "html",
];

/// Whether content should be treated as HTML: it contains a closing or
/// self-closing tag.
pub fn looks_like_html(content: &str) -> bool {
    content.contains("</") || content.contains("/>")
}

/// Convert record content to markdown if it looks like HTML.
pub fn to_markdown(content: &str) -> String {
    if looks_like_html(content) {
        html_to_markdown(content)
    } else {
        content.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct OpenElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

struct TreeBuilder {
    root: Vec<Node>,
    stack: Vec<OpenElement>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.root,
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let current = self.current();
        if let Some(Node::Text(prev)) = current.last_mut() {
            prev.push_str(text);
        } else {
            current.push(Node::Text(text.to_string()));
        }
    }

    fn close_top(&mut self) {
        if let Some(open) = self.stack.pop() {
            let node = Node::Element {
                name: open.name,
                attrs: open.attrs,
                children: open.children,
            };
            self.current().push(node);
        }
    }

    /// Close up to and including the nearest open element named `name`.
    fn close(&mut self, name: &str) {
        if let Some(idx) = self.stack.iter().rposition(|open| open.name == name) {
            while self.stack.len() > idx {
                self.close_top();
            }
        }
    }

    fn open(&mut self, name: String, attrs: Vec<(String, String)>, self_closing: bool) {
        // Implicitly closed elements
        match name.as_str() {
            "li" => self.close_sibling("li", &["ul", "ol"]),
            "p" => self.close_sibling("p", &["div", "blockquote", "li", "section", "article"]),
            _ => {}
        }

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            self.current().push(Node::Element {
                name,
                attrs,
                children: Vec::new(),
            });
            return;
        }

        self.stack.push(OpenElement {
            name,
            attrs,
            children: Vec::new(),
        });
    }

    /// Close an open `name` unless one of `boundaries` is nested inside it.
    fn close_sibling(&mut self, name: &str, boundaries: &[&str]) {
        let sibling_open = self
            .stack
            .iter()
            .rev()
            .find_map(|open| {
                if open.name == name {
                    Some(true)
                } else if boundaries.contains(&open.name.as_str()) {
                    Some(false)
                } else {
                    None
                }
            })
            .unwrap_or(false);
        if sibling_open {
            self.close(name);
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.root
    }
}

fn parse_attrs(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == '/') {
            i += 1;
        }
        let key_start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '=' && chars[i] != '/' {
            i += 1;
        }
        if key_start == i {
            break;
        }
        let key: String = chars[key_start..i].iter().collect::<String>().to_ascii_lowercase();

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < chars.len() && chars[i] == '=' {
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                let quote = chars[i];
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                value = chars[start..i].iter().collect();
                i += 1;
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                value = chars[start..i].iter().collect();
            }
        }
        attrs.push((key, decode_entities(&value)));
    }

    attrs
}

/// Find the `>` that ends a tag, skipping quoted attribute values.
fn tag_end(input: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse(html: &str) -> Vec<Node> {
    let mut builder = TreeBuilder::new();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        builder.push_text(&rest[..lt]);
        let tag = &rest[lt..];

        if let Some(comment) = tag.strip_prefix("<!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
            continue;
        }

        if tag.starts_with("<!") || tag.starts_with("<?") {
            rest = match tag.find('>') {
                Some(end) => &tag[end + 1..],
                None => "",
            };
            continue;
        }

        if let Some(closing) = tag.strip_prefix("</") {
            let Some(end) = closing.find('>') else {
                builder.push_text(tag);
                rest = "";
                break;
            };
            let name = closing[..end].trim().to_ascii_lowercase();
            builder.close(&name);
            rest = &closing[end + 1..];
            continue;
        }

        let starts_tag = tag[1..].chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        let Some(end) = tag_end(tag).filter(|_| starts_tag) else {
            builder.push_text("<");
            rest = &tag[1..];
            continue;
        };

        let inner = &tag[1..end];
        let self_closing = inner.trim_end().ends_with('/');
        let name_len = inner
            .find(|c: char| c.is_whitespace() || c == '/')
            .unwrap_or(inner.len());
        let name = inner[..name_len].to_ascii_lowercase();
        let attrs = parse_attrs(&inner[name_len..]);
        rest = &tag[end + 1..];

        if SKIPPED_ELEMENTS.contains(&name.as_str()) && !self_closing {
            let close = format!("</{}", name);
            let lower = rest.to_ascii_lowercase();
            rest = match lower.find(&close) {
                Some(at) => match rest[at..].find('>') {
                    Some(gt) => &rest[at + gt + 1..],
                    None => "",
                },
                None => "",
            };
            continue;
        }

        builder.open(name, attrs, self_closing);
    }

    builder.push_text(rest);
    builder.finish()
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '—',
        "ndash" => '–',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "middot" => '·',
        "bull" => '•',
        _ => return None,
    })
}

/// Decode HTML character references. Unknown references are kept verbatim.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        let decoded = candidate
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| {
                let name = &candidate[..semi];
                let c = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    named_entity(name)
                };
                c.map(|c| (c, semi))
            });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }

    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn block(inner: &str) -> String {
    let inner = inner.trim();
    if inner.is_empty() {
        String::new()
    } else {
        format!("\n\n{}\n\n", inner)
    }
}

fn wrap_inline(inner: &str, delimiter: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let leading = if inner.starts_with(' ') { " " } else { "" };
    let trailing = if inner.ends_with(' ') { " " } else { "" };
    format!("{}{}{}{}{}", leading, delimiter, trimmed, delimiter, trailing)
}

fn text_content(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&decode_entities(text)),
            Node::Element { name, children, .. } => {
                if name == "br" {
                    out.push('\n');
                } else {
                    out.push_str(&text_content(children));
                }
            }
        }
    }
    out
}

fn render_children(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        let piece = render_node(node);
        if out.ends_with('\n') || out.is_empty() {
            out.push_str(piece.trim_start_matches(' '));
        } else {
            out.push_str(&piece);
        }
    }
    out
}

fn render_list(children: &[Node], ordered: bool) -> String {
    let mut out = String::new();
    let mut index = 1;
    for child in children {
        let Node::Element {
            name,
            children: item,
            ..
        } = child
        else {
            continue;
        };
        if name != "li" {
            continue;
        }

        let marker = if ordered {
            format!("{}. ", index)
        } else {
            "- ".to_string()
        };
        index += 1;

        let body = collapse_blank_lines(render_children(item).trim());
        let indent = " ".repeat(marker.len());
        let mut lines = body.lines();
        out.push_str(&marker);
        out.push_str(lines.next().unwrap_or_default());
        out.push('\n');
        for line in lines {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&indent);
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    block(&out)
}

fn render_node(node: &Node) -> String {
    let (name, attrs, children) = match node {
        Node::Text(text) => {
            return collapse_whitespace(&decode_entities(text));
        }
        Node::Element {
            name,
            attrs,
            children,
        } => (name.as_str(), attrs, children),
    };

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let inner = render_children(children);
            let inner = inner.split_whitespace().collect::<Vec<_>>().join(" ");
            if inner.is_empty() {
                String::new()
            } else {
                format!("\n\n{} {}\n\n", "#".repeat(level), inner)
            }
        }
        "br" => "\n".to_string(),
        "hr" => "\n\n---\n\n".to_string(),
        "strong" | "b" => wrap_inline(&render_children(children), "**"),
        "em" | "i" => wrap_inline(&render_children(children), "_"),
        "del" | "s" | "strike" => wrap_inline(&render_children(children), "~~"),
        "code" => {
            let inner = text_content(children);
            if inner.contains('`') {
                format!("`` {} ``", inner)
            } else {
                format!("`{}`", inner)
            }
        }
        "pre" => {
            let language = children.iter().find_map(|child| match child {
                Node::Element { name, attrs, .. } if name == "code" => attr(attrs, "class")
                    .and_then(|class| {
                        class
                            .split_whitespace()
                            .find_map(|c| c.strip_prefix("language-"))
                    })
                    .map(str::to_string),
                _ => None,
            });
            let code = text_content(children);
            let code = code.trim_end_matches('\n');
            format!(
                "\n\n```{}\n{}\n```\n\n",
                language.unwrap_or_default(),
                code
            )
        }
        "a" => {
            let inner = render_children(children);
            match attr(attrs, "href") {
                Some(href) if !inner.trim().is_empty() => format!("[{}]({})", inner.trim(), href),
                _ => inner,
            }
        }
        "img" => match attr(attrs, "src") {
            Some(src) => format!("![{}]({})", attr(attrs, "alt").unwrap_or_default(), src),
            None => String::new(),
        },
        "ul" => render_list(children, false),
        "ol" => render_list(children, true),
        "li" => block(&render_children(children)),
        "blockquote" => {
            let inner = collapse_blank_lines(render_children(children).trim());
            let quoted: Vec<String> = inner
                .lines()
                .map(|line| {
                    if line.is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {}", line)
                    }
                })
                .collect();
            block(&quoted.join("\n"))
        }
        n if BLOCK_ELEMENTS.contains(&n) => block(&render_children(children)),
        "td" | "th" => format!("{} ", render_children(children).trim()),
        _ => render_children(children),
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

/// Convert an HTML fragment or document to markdown.
pub fn html_to_markdown(html: &str) -> String {
    let nodes = parse(html);
    let rendered = render_children(&nodes);

    let trimmed_lines: Vec<&str> = rendered.lines().map(str::trim_end).collect();
    let markdown = collapse_blank_lines(trimmed_lines.join("\n").trim());
    debug!(
        "Converted {} bytes of HTML to {} bytes of markdown",
        html.len(),
        markdown.len()
    );
    markdown
}
