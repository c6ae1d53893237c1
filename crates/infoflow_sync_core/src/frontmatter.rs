//! Frontmatter parsing helpers.
//!
//! Only reading is needed here: frontmatter for new documents is emitted by
//! [`crate::managed::build_frontmatter`] with a fixed key order, and existing
//! frontmatter is never rewritten.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::error::Result;

/// Result of parsing a markdown file with frontmatter.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// The parsed frontmatter as an ordered map.
    pub frontmatter: IndexMap<String, Value>,
    /// The body content after the frontmatter.
    pub body: String,
}

/// Locate the YAML block of a document, returning `(yaml, body)`.
fn split(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    if let Some(idx) = rest.find("\n---\n") {
        return Some((&rest[..idx], &rest[idx + 5..]));
    }
    if let Some(idx) = rest.find("\n---\r\n") {
        return Some((&rest[..idx], &rest[idx + 6..]));
    }
    // Closing delimiter on the last line
    rest.strip_suffix("\n---")
        .or_else(|| rest.strip_suffix("\n---\r"))
        .map(|yaml| (yaml, ""))
}

/// Parse frontmatter and body, returning empty frontmatter if none exists.
///
/// Missing or unterminated frontmatter is not an error; the whole content is
/// returned as the body. Malformed YAML inside a well-delimited block is.
pub fn parse_or_empty(content: &str) -> Result<ParsedFile> {
    let Some((yaml, body)) = split(content) else {
        return Ok(ParsedFile {
            frontmatter: IndexMap::new(),
            body: content.to_string(),
        });
    };

    if yaml.trim().is_empty() {
        return Ok(ParsedFile {
            frontmatter: IndexMap::new(),
            body: body.to_string(),
        });
    }

    let frontmatter: IndexMap<String, Value> = serde_yaml::from_str(yaml)?;
    Ok(ParsedFile {
        frontmatter,
        body: body.to_string(),
    })
}

/// Get a string property value.
pub fn get_string<'a>(frontmatter: &'a IndexMap<String, Value>, key: &str) -> Option<&'a str> {
    frontmatter.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_empty_with_frontmatter() {
        let parsed = parse_or_empty("---\ninfoflow_id: \"abc\"\ntitle: \"T\"\n---\n\nBody\n").unwrap();
        assert_eq!(get_string(&parsed.frontmatter, "infoflow_id"), Some("abc"));
        assert_eq!(parsed.body, "\nBody\n");
        let keys: Vec<_> = parsed.frontmatter.keys().cloned().collect();
        assert_eq!(keys, vec!["infoflow_id", "title"]);
    }

    #[test]
    fn test_parse_or_empty_without_frontmatter() {
        let parsed = parse_or_empty("# Just a note\n").unwrap();
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, "# Just a note\n");
    }

    #[test]
    fn test_unterminated_frontmatter_is_body() {
        let parsed = parse_or_empty("---\ntitle: x\nno end").unwrap();
        assert!(parsed.frontmatter.is_empty());
    }

    #[test]
    fn test_closing_delimiter_at_eof() {
        let parsed = parse_or_empty("---\ninfoflow_id: x\n---").unwrap();
        assert_eq!(get_string(&parsed.frontmatter, "infoflow_id"), Some("x"));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_crlf_frontmatter() {
        let parsed = parse_or_empty("---\r\ninfoflow_id: x\r\n---\r\nbody").unwrap();
        assert_eq!(get_string(&parsed.frontmatter, "infoflow_id"), Some("x"));
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn test_non_string_property() {
        let parsed = parse_or_empty("---\ninfoflow_id: 42\n---\n").unwrap();
        assert_eq!(get_string(&parsed.frontmatter, "infoflow_id"), None);
        assert!(parsed.frontmatter.contains_key("infoflow_id"));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(parse_or_empty("---\n: : :\n  - [\n---\n").is_err());
    }
}
