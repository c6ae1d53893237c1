//! Rendering of a parsed node tree against a JSON view.

use serde_json::Value;

use super::parser::Node;

/// HTML-escape a value the way mustache does for `{{name}}`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(c),
        }
    }
    out
}

/// Falsy values skip a section and render an inverted one.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => String::new(),
    }
}

/// Resolve a (possibly dotted) name against the context stack, innermost first.
fn lookup<'v>(stack: &[&'v Value], name: &str) -> Option<&'v Value> {
    if name == "." {
        return stack.last().copied();
    }

    let mut parts = name.split('.');
    let first = parts.next()?;
    let mut value = stack
        .iter()
        .rev()
        .find_map(|&frame| frame.as_object().and_then(|obj| obj.get(first)))?;

    for part in parts {
        value = value.as_object()?.get(part)?;
    }
    Some(value)
}

pub(crate) fn render_nodes<'v>(nodes: &[Node], stack: &mut Vec<&'v Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Variable { name, escape } => {
                let Some(value) = lookup(stack, name) else {
                    continue;
                };
                let text = stringify(value);
                if *escape {
                    out.push_str(&escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(stack, name).filter(|v| is_truthy(v));

                if *inverted {
                    if value.is_none() {
                        render_nodes(children, stack, out);
                    }
                    continue;
                }

                let Some(value) = value else {
                    continue;
                };
                match value {
                    Value::Array(items) => {
                        for item in items {
                            stack.push(item);
                            render_nodes(children, stack, out);
                            stack.pop();
                        }
                    }
                    other => {
                        stack.push(other);
                        render_nodes(children, stack, out);
                        stack.pop();
                    }
                }
            }
        }
    }
}
