use serde::Serialize;

use crate::html;
use crate::remote::Record;

/// A highlight as seen by templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContext {
    /// Highlight or annotation text
    pub content: String,
    /// The passage the note quotes, if any
    pub quoted_text: Option<String>,
}

/// Flattened per-record view model handed to both templates.
///
/// Field names are the template variable names (`{{itemType}}`,
/// `{{#notes}}…{{/notes}}`). Absent optional values render as empty
/// strings, so `{{#url}}…{{/url}}` can guard optional blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    /// Record title
    pub title: String,
    /// Stable record id
    pub id: String,
    /// Record kind (`web_page`, `pdf`, ...)
    pub item_type: String,
    /// Source url, or empty
    pub url: String,
    /// Author, or empty
    pub author: String,
    /// Tags joined with `", "`
    pub tags: String,
    /// Tags as a list, for `{{#tagsArray}}{{.}}{{/tagsArray}}`
    pub tags_array: Vec<String>,
    /// Creation timestamp as sent by the remote
    pub created_at: String,
    /// Last update timestamp as sent by the remote
    pub updated_at: String,
    /// Record content, converted to markdown when it is HTML
    pub content: String,
    /// The user's note on the whole item, or empty
    pub item_note: String,
    /// Remote folder name, or empty
    pub folder_name: String,
    /// Highlights in remote order
    pub notes: Vec<NoteContext>,
    /// Whether there is at least one highlight
    pub has_notes: bool,
}

impl RenderContext {
    /// Build the view model for a record.
    pub fn from_record(record: &Record) -> Self {
        let content = record
            .content
            .as_deref()
            .map(html::to_markdown)
            .unwrap_or_default();

        let notes: Vec<NoteContext> = record
            .notes
            .iter()
            .map(|note| NoteContext {
                content: note.content.clone(),
                quoted_text: note.quoted_text.clone().filter(|q| !q.is_empty()),
            })
            .collect();

        Self {
            title: record.title.clone(),
            id: record.id.clone(),
            item_type: record.item_type.clone(),
            url: record.url.clone().unwrap_or_default(),
            author: record.author().unwrap_or_default().to_string(),
            tags: record.tags.join(", "),
            tags_array: record.tags.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
            content,
            item_note: record.item_note.clone().unwrap_or_default(),
            folder_name: record.folder_name.clone().unwrap_or_default(),
            has_notes: !notes.is_empty(),
            notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Note, RecordMetadata};
    use crate::test_utils::record;

    #[test]
    fn test_from_record_flattens_optionals() {
        let mut rec = record("id1", "Title", "2024-02-01T00:00:00Z");
        rec.tags = vec!["a".into(), "b".into()];
        rec.metadata = Some(RecordMetadata {
            author: Some("Ada".into()),
            ..Default::default()
        });
        rec.content = Some("<p>Hello <strong>world</strong></p>".into());
        rec.notes = vec![Note {
            id: "n1".into(),
            content: "highlight".into(),
            quoted_text: Some(String::new()),
            created_at: "2024-02-01T00:00:00Z".into(),
            metadata: None,
        }];

        let ctx = RenderContext::from_record(&rec);
        assert_eq!(ctx.author, "Ada");
        assert_eq!(ctx.tags, "a, b");
        assert_eq!(ctx.tags_array, vec!["a", "b"]);
        assert_eq!(ctx.url, "");
        assert_eq!(ctx.content, "Hello **world**");
        assert!(ctx.has_notes);
        assert_eq!(ctx.notes[0].quoted_text, None);
    }

    #[test]
    fn test_serialized_names_are_camel_case() {
        let ctx = RenderContext::from_record(&record("id1", "T", "2024-02-01T00:00:00Z"));
        let value = serde_json::to_value(&ctx).unwrap();
        assert!(value.get("itemType").is_some());
        assert!(value.get("tagsArray").is_some());
        assert_eq!(value.get("hasNotes"), Some(&serde_json::json!(false)));
    }
}
