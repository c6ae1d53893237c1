//! Template tokenizer and tree builder.

use super::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const CLOSE_RAW: &str = "}}}";

/// A compiled template node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Variable { name: String, escape: bool },
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Escaped,
    Raw,
    SectionOpen,
    InvertedOpen,
    SectionClose,
    Comment,
    Partial,
}

impl TagKind {
    /// Tags that vanish from their line when nothing else is on it.
    fn can_stand_alone(self) -> bool {
        !matches!(self, TagKind::Escaped | TagKind::Raw)
    }
}

#[derive(Debug)]
struct Tag {
    kind: TagKind,
    name: String,
    /// Byte offset of `{{`
    start: usize,
    /// Byte offset just past the closing braces
    end: usize,
}

/// Scan `source` into tags, in order.
fn scan_tags(source: &str) -> Result<Vec<Tag>, TemplateError> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find(OPEN) {
        let start = pos + found;
        let mut cursor = start + OPEN.len();

        let sigil = source[cursor..].chars().next();
        let kind = match sigil {
            Some('{') => TagKind::Raw,
            Some('&') => TagKind::Raw,
            Some('#') => TagKind::SectionOpen,
            Some('^') => TagKind::InvertedOpen,
            Some('/') => TagKind::SectionClose,
            Some('!') => TagKind::Comment,
            Some('>') => TagKind::Partial,
            Some('=') => {
                return Err(TemplateError::new(
                    "Custom delimiters are not supported",
                    start,
                ));
            }
            _ => TagKind::Escaped,
        };
        if kind != TagKind::Escaped {
            cursor += 1;
        }

        let close = if sigil == Some('{') { CLOSE_RAW } else { CLOSE };
        let Some(close_at) = source[cursor..].find(close) else {
            return Err(TemplateError::new("Unclosed tag", start));
        };
        let inner = &source[cursor..cursor + close_at];
        let end = cursor + close_at + close.len();

        let name = inner.trim().to_string();
        if name.is_empty() && kind != TagKind::Comment {
            return Err(TemplateError::new("Empty tag name", start));
        }

        tags.push(Tag {
            kind,
            name,
            start,
            end,
        });
        pos = end;
    }

    Ok(tags)
}

/// The span a tag occupies once standalone lines are accounted for.
///
/// A section, inverted, close, comment or partial tag that is the only
/// non-whitespace on its line swallows the whole line, newline included.
fn effective_span(source: &str, tag: &Tag) -> (usize, usize) {
    if !tag.kind.can_stand_alone() {
        return (tag.start, tag.end);
    }

    let line_begin = source[..tag.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let before = &source[line_begin..tag.start];
    if !before.chars().all(|c| c == ' ' || c == '\t') {
        return (tag.start, tag.end);
    }

    let rest = &source[tag.end..];
    let (line_end, after) = match rest.find('\n') {
        Some(i) => (tag.end + i + 1, &rest[..i]),
        None => (source.len(), rest),
    };
    let after = after.strip_suffix('\r').unwrap_or(after);
    if !after.chars().all(|c| c == ' ' || c == '\t') {
        return (tag.start, tag.end);
    }

    (line_begin, line_end)
}

struct OpenSection {
    name: String,
    inverted: bool,
    start: usize,
    children: Vec<Node>,
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(prev)) = nodes.last_mut() {
        prev.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Parse a template source into a node tree.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let tags = scan_tags(source)?;

    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<OpenSection> = Vec::new();
    let mut pos = 0;

    for tag in &tags {
        let (span_start, span_end) = effective_span(source, tag);
        // A previous standalone tag may already have consumed this line's prefix
        let span_start = span_start.max(pos);

        let current = match stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut root,
        };
        push_text(current, &source[pos..span_start]);
        pos = span_end;

        match tag.kind {
            TagKind::Escaped | TagKind::Raw => current.push(Node::Variable {
                name: tag.name.clone(),
                escape: tag.kind == TagKind::Escaped,
            }),
            TagKind::SectionOpen | TagKind::InvertedOpen => stack.push(OpenSection {
                name: tag.name.clone(),
                inverted: tag.kind == TagKind::InvertedOpen,
                start: tag.start,
                children: Vec::new(),
            }),
            TagKind::SectionClose => {
                let Some(open) = stack.pop() else {
                    return Err(TemplateError::new(
                        format!("Unopened section \"{}\"", tag.name),
                        tag.start,
                    ));
                };
                if open.name != tag.name {
                    return Err(TemplateError::new(
                        format!("Unclosed section \"{}\"", open.name),
                        tag.start,
                    ));
                }
                let node = Node::Section {
                    name: open.name,
                    inverted: open.inverted,
                    children: open.children,
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root.push(node),
                }
            }
            TagKind::Comment | TagKind::Partial => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(TemplateError::new(
            format!("Unclosed section \"{}\"", open.name),
            open.start,
        ));
    }

    push_text(&mut root, &source[pos..]);
    Ok(root)
}
