//! Identity & merge protocol.
//!
//! A managed document carries its record id under [`ID_KEY`] in the
//! frontmatter, and the generated content lives between [`MANAGED_START`] and
//! [`MANAGED_END`]. Only the text between the markers is ever rewritten; the
//! frontmatter and anything the user wrote around the markers survive every
//! sync byte for byte.

use crate::frontmatter;
use crate::remote::Record;

/// Frontmatter key holding the remote record id.
pub const ID_KEY: &str = "infoflow_id";

/// Opening marker of the managed region.
pub const MANAGED_START: &str = "<!-- INFOFLOW:START -->";

/// Closing marker of the managed region.
pub const MANAGED_END: &str = "<!-- INFOFLOW:END -->";

/// Read the record id from a document's frontmatter.
///
/// Returns `None` when there is no frontmatter, it does not parse, or the id
/// is missing, empty or not a string.
pub fn frontmatter_id(content: &str) -> Option<String> {
    let parsed = frontmatter::parse_or_empty(content).ok()?;
    frontmatter::get_string(&parsed.frontmatter, ID_KEY)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Quote a scalar as a JSON string, which is also a valid YAML double-quoted scalar.
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Frontmatter block for a new document, delimiters included, no trailing newline.
pub fn build_frontmatter(record: &Record) -> String {
    let tags = if record.tags.is_empty() {
        "[]".to_string()
    } else {
        let quoted: Vec<String> = record.tags.iter().map(|t| quote(t)).collect();
        format!("[{}]", quoted.join(", "))
    };

    [
        "---".to_string(),
        format!("{}: {}", ID_KEY, quote(&record.id)),
        format!("title: {}", quote(&record.title)),
        format!("url: {}", quote(record.url.as_deref().unwrap_or_default())),
        format!("item_type: {}", quote(&record.item_type)),
        format!("author: {}", quote(record.author().unwrap_or_default())),
        format!("tags: {}", tags),
        format!("created: {}", quote(&record.created_at)),
        format!("updated: {}", quote(&record.updated_at)),
        "---".to_string(),
    ]
    .join("\n")
}

/// Full text of a freshly created document.
pub fn build_new_document(record: &Record, rendered_body: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}\n",
        build_frontmatter(record),
        MANAGED_START,
        neutralize_markers(rendered_body.trim()),
        MANAGED_END
    )
}

/// Escape marker strings inside generated content so they render as text
/// and can never be mistaken for region boundaries.
fn neutralize_markers(body: &str) -> String {
    if !body.contains(MANAGED_START) && !body.contains(MANAGED_END) {
        return body.to_string();
    }
    body.replace(MANAGED_START, &MANAGED_START.replacen('<', "&lt;", 1))
        .replace(MANAGED_END, &MANAGED_END.replacen('<', "&lt;", 1))
}

/// Byte span `(start, end)` of the managed region: `start` is the offset of
/// [`MANAGED_START`], `end` the offset of the [`MANAGED_END`] closing it.
///
/// The region closes at the first end marker that has a start marker before
/// it, and opens at the nearest such start marker. Stray markers in user text
/// on either side are left alone.
fn managed_region(content: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = content[from..].find(MANAGED_END) {
        let end = from + offset;
        if let Some(start) = content[..end].rfind(MANAGED_START) {
            return Some((start, end));
        }
        from = end + MANAGED_END.len();
    }
    None
}

/// Merge a rendered body into an existing document.
///
/// With a managed region present only the span between its markers is
/// replaced. Otherwise a new managed region is appended after the existing
/// content.
pub fn upsert_managed_block(existing: &str, rendered_body: &str) -> String {
    let body = neutralize_markers(rendered_body.trim());

    if let Some((start, end)) = managed_region(existing) {
        let before = &existing[..start + MANAGED_START.len()];
        let after = &existing[end..];
        return format!("{}\n\n{}\n\n{}", before, body, after);
    }

    format!(
        "{}\n\n{}\n\n{}\n\n{}\n",
        existing.trim_end(),
        MANAGED_START,
        body,
        MANAGED_END
    )
}

/// Whether a document already carries a well-formed managed region.
pub fn has_managed_block(content: &str) -> bool {
    managed_region(content).is_some()
}
