//! Template engine for file names and note bodies.
//!
//! Templates use a small mustache dialect:
//!
//! - `{{name}}` HTML-escaped substitution, `{{{name}}}` / `{{& name}}` raw
//! - dotted names (`{{a.b}}`) and `{{.}}` for the current item
//! - `{{#name}}…{{/name}}` sections (lists iterate, other truthy values
//!   render once) and `{{^name}}…{{/name}}` inverted sections
//! - `{{! comments }}`; `{{> partials}}` render nothing
//!
//! Custom delimiters (`{{=<% %>=}}`) are rejected.

mod context;
mod parser;
mod render;

pub use context::{NoteContext, RenderContext};
pub use render::escape_html;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{SyncError, TemplateKind};
use parser::Node;

/// File name used when a rendered name sanitizes to nothing.
pub const PLACEHOLDER_FILE_NAME: &str = "InfoFlow Item";

/// Default file name template
pub const DEFAULT_FILE_NAME_TEMPLATE: &str = "{{title}}_{{id}}_{{itemType}}";

/// Default note body template.
///
/// Frontmatter is written separately, so the body starts at the title.
pub const DEFAULT_NOTE_TEMPLATE: &str = "# {{{title}}}

{{#url}}
Source: {{{url}}}

{{/url}}
{{{content}}}
{{#hasNotes}}

## Highlights

{{/hasNotes}}
{{#notes}}
> {{{content}}}
{{#quotedText}}

Source: {{{quotedText}}}
{{/quotedText}}

{{/notes}}
";

/// A template that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    /// What is wrong
    pub message: String,
    /// Byte offset in the template source
    pub position: usize,
}

impl TemplateError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    /// Attach which template failed, for surfacing to the user.
    pub fn into_sync_error(self, kind: TemplateKind) -> SyncError {
        SyncError::InvalidTemplate {
            kind,
            message: self.to_string(),
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

impl std::error::Error for TemplateError {}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a template source.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parser::parse(source)?,
        })
    }

    /// Render against a JSON view.
    pub fn render_value(&self, view: &Value) -> String {
        let mut out = String::new();
        let mut stack = vec![view];
        render::render_nodes(&self.nodes, &mut stack, &mut out);
        out
    }

    /// Render against any serializable view.
    pub fn render<T: Serialize>(&self, view: &T) -> serde_json::Result<String> {
        let value = serde_json::to_value(view)?;
        Ok(self.render_value(&value))
    }

    /// Render a record's note body.
    pub fn render_context(&self, ctx: &RenderContext) -> String {
        // RenderContext only holds strings, lists and bools
        self.render(ctx).unwrap_or_default()
    }
}

/// Check that a template parses.
pub fn validate(source: &str) -> Result<(), TemplateError> {
    parser::parse(source).map(|_| ())
}

/// Make a rendered name safe to use as a file name.
///
/// Whitespace runs become one space, path-hostile characters become `-`,
/// repeated `-` collapse, leading dots are stripped. An empty result becomes
/// [`PLACEHOLDER_FILE_NAME`].
pub fn sanitize_file_name(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                collapsed.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        collapsed.push(c);
    }

    let mut cleaned = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        let c = match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        };
        if c == '-' && cleaned.ends_with('-') {
            continue;
        }
        cleaned.push(c);
    }

    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        PLACEHOLDER_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Render the file name template and sanitize the result (no extension).
pub fn render_file_name(template: &Template, ctx: &RenderContext) -> String {
    sanitize_file_name(&template.render_context(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Note;
    use crate::test_utils::record;
    use serde_json::json;

    fn render(source: &str, view: Value) -> String {
        Template::compile(source).unwrap().render_value(&view)
    }

    #[test]
    fn test_escaped_and_raw() {
        let view = json!({"t": "a & <b>"});
        assert_eq!(render("{{t}}", view.clone()), "a &amp; &lt;b&gt;");
        assert_eq!(render("{{{t}}}", view.clone()), "a & <b>");
        assert_eq!(render("{{& t}}", view), "a & <b>");
    }

    #[test]
    fn test_missing_names_render_empty() {
        assert_eq!(render("[{{nope}}]", json!({})), "[]");
        assert_eq!(render("[{{#nope}}x{{/nope}}]", json!({})), "[]");
        assert_eq!(render("[{{^nope}}x{{/nope}}]", json!({})), "[x]");
    }

    #[test]
    fn test_sections_iterate_and_guard() {
        let view = json!({
            "notes": [{"content": "one", "quotedText": "q"}, {"content": "two", "quotedText": null}],
            "url": "",
            "title": "T"
        });
        let out = render(
            "{{#notes}}- {{content}}{{#quotedText}} ({{quotedText}}){{/quotedText}}\n{{/notes}}{{^url}}no url{{/url}}",
            view,
        );
        assert_eq!(out, "- one (q)\n- two\nno url");
    }

    #[test]
    fn test_section_with_scalar_pushes_context() {
        assert_eq!(render("{{#name}}Hi {{.}}{{/name}}", json!({"name": "Ada"})), "Hi Ada");
        assert_eq!(render("{{#flag}}on{{/flag}}", json!({"flag": true})), "on");
    }

    #[test]
    fn test_nested_lookup_falls_back_to_outer_scope() {
        let view = json!({"title": "Outer", "notes": [{"content": "c"}]});
        assert_eq!(render("{{#notes}}{{title}}:{{content}}{{/notes}}", view), "Outer:c");
    }

    #[test]
    fn test_validate_reports_position() {
        assert!(validate(DEFAULT_NOTE_TEMPLATE).is_ok());
        assert!(validate(DEFAULT_FILE_NAME_TEMPLATE).is_ok());
        let err = validate("{{#notes}}{{content}}").unwrap_err();
        assert_eq!(err.to_string(), "Unclosed section \"notes\" at 0");

        let sync_err = err.into_sync_error(TemplateKind::Note);
        assert!(sync_err.is_configuration());
        assert_eq!(
            sync_err.to_string(),
            "Invalid note template: Unclosed section \"notes\" at 0"
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("  Hello   world \n"), "Hello world");
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "a-b-c-d-e-f-g-h-i-j");
        assert_eq!(sanitize_file_name("a // b"), "a - b");
        assert_eq!(sanitize_file_name("a::b"), "a-b");
        assert_eq!(sanitize_file_name("...hidden"), "hidden");
        assert_eq!(sanitize_file_name(". x"), "x");
        assert_eq!(sanitize_file_name(""), PLACEHOLDER_FILE_NAME);
        assert_eq!(sanitize_file_name("..."), PLACEHOLDER_FILE_NAME);
    }

    #[test]
    fn test_render_file_name_default_template() {
        let rec = record("abc123", "What is: Rust?", "2024-01-01T00:00:00Z");
        let ctx = RenderContext::from_record(&rec);
        let tpl = Template::compile(DEFAULT_FILE_NAME_TEMPLATE).unwrap();
        assert_eq!(render_file_name(&tpl, &ctx), "What is- Rust-_abc123_web_page");
    }

    #[test]
    fn test_default_note_template() {
        let mut rec = record("abc", "Title", "2024-01-01T00:00:00Z");
        rec.url = Some("https://example.com/?a=1&b=2".into());
        rec.content = Some("Plain body".into());
        rec.notes = vec![Note {
            id: "n".into(),
            content: "Quoted line".into(),
            quoted_text: Some("ctx".into()),
            created_at: "2024-01-01T00:00:00Z".into(),
            metadata: None,
        }];
        let tpl = Template::compile(DEFAULT_NOTE_TEMPLATE).unwrap();
        let out = tpl.render_context(&RenderContext::from_record(&rec));
        assert_eq!(
            out,
            "# Title\n\nSource: https://example.com/?a=1&b=2\n\nPlain body\n\n## Highlights\n\n> Quoted line\n\nSource: ctx\n\n"
        );

        let bare = record("abc", "Title", "2024-01-01T00:00:00Z");
        let out = tpl.render_context(&RenderContext::from_record(&bare));
        assert_eq!(out, "# Title\n\n\n");
    }
}
