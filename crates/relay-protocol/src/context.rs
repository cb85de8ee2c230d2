//! Editor context attached to outgoing messages
//!
//! The request itself keeps context entries opaque; these variants are the
//! shapes the editor produces today.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// A piece of editor state sent along with a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContextItem {
    /// Selected text; line numbers are 1-indexed
    #[serde(rename_all = "camelCase")]
    Selection {
        path: String,
        content: String,
        start_line: u32,
        end_line: u32,
        language: String,
    },
    /// Entire file content
    File {
        path: String,
        content: String,
        language: String,
    },
    /// An inspection result; `severity` is "error", "warning" or "info"
    Diagnostic {
        path: String,
        line: u32,
        severity: String,
        message: String,
    },
    /// Uncommitted changes in unified diff format
    #[serde(rename = "diff")]
    GitDiff { diff: String },
}

impl ContextItem {
    /// Convert to the JSON object placed in a request's `context` list
    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        serde_json::to_value(self).map_err(ProtocolError::Encode)
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            ContextItem::Selection { path, .. }
            | ContextItem::File { path, .. }
            | ContextItem::Diagnostic { path, .. } => Some(path),
            ContextItem::GitDiff { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_shape() {
        let item = ContextItem::Selection {
            path: "src/main.rs".into(),
            content: "fn main() {}".into(),
            start_line: 1,
            end_line: 3,
            language: "rust".into(),
        };

        assert_eq!(
            item.to_value().unwrap(),
            json!({
                "type": "selection",
                "path": "src/main.rs",
                "content": "fn main() {}",
                "startLine": 1,
                "endLine": 3,
                "language": "rust"
            })
        );
    }

    #[test]
    fn test_file_and_diagnostic_shapes() {
        let file = ContextItem::File {
            path: "a.kt".into(),
            content: "x".into(),
            language: "kotlin".into(),
        };
        assert_eq!(file.to_value().unwrap()["type"], "file");

        let diagnostic = ContextItem::Diagnostic {
            path: "a.kt".into(),
            line: 7,
            severity: "warning".into(),
            message: "unused".into(),
        };
        let value = diagnostic.to_value().unwrap();
        assert_eq!(value["type"], "diagnostic");
        assert_eq!(value["line"], 7);
        assert_eq!(value["severity"], "warning");
    }

    #[test]
    fn test_git_diff_tag() {
        let item = ContextItem::GitDiff {
            diff: "@@ -1 +1 @@".into(),
        };
        assert_eq!(item.to_value().unwrap(), json!({"type": "diff", "diff": "@@ -1 +1 @@"}));
        assert_eq!(item.path(), None);
    }

    #[test]
    fn test_parse_back() {
        let value = json!({
            "type": "selection",
            "path": "p",
            "content": "c",
            "startLine": 2,
            "endLine": 4,
            "language": "go"
        });
        let item: ContextItem = serde_json::from_value(value).unwrap();
        assert_eq!(item.path(), Some("p"));
    }
}
