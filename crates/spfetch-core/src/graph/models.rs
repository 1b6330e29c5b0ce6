//! Data models for Graph drive listings.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Extensions that make an entry eligible for download. Matched as exact suffixes.
pub const SPREADSHEET_EXTENSIONS: [&str; 2] = [".xlsx", ".xlsm"];

/// One item returned by a children listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Item name.
    pub name: String,
    /// Browser URL of the item (`webUrl`).
    pub url: String,
    /// Drive item ID.
    pub id: String,
    /// Whether the item carries a `folder` facet.
    pub is_folder: bool,
}

impl RemoteEntry {
    /// Whether this entry is a file with a spreadsheet extension.
    #[must_use]
    pub fn is_download_target(&self) -> bool {
        !self.is_folder && is_spreadsheet(&self.name)
    }
}

/// Whether a file name ends in one of [`SPREADSHEET_EXTENSIONS`].
#[must_use]
pub fn is_spreadsheet(name: &str) -> bool {
    SPREADSHEET_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Raw `driveItem` as returned by Graph, reduced to the fields we project.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    web_url: String,
    folder: Option<serde_json::Value>,
}

impl From<DriveItem> for RemoteEntry {
    fn from(item: DriveItem) -> Self {
        Self {
            name: item.name,
            url: item.web_url,
            id: item.id,
            is_folder: item.folder.is_some(),
        }
    }
}

/// Project a children listing body into entries, keeping API order.
///
/// A body without a `value` array is an error rather than an empty folder.
///
/// # Errors
///
/// Returns [`CoreError::Parse`] if `value` is missing, is not an array, or
/// holds an item without `id` or `name`.
pub fn parse_listing(body: &serde_json::Value) -> Result<Vec<RemoteEntry>, CoreError> {
    let items = body
        .get("value")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            let detail = body
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no value array in listing response");
            CoreError::Parse(detail.to_string())
        })?;

    items
        .iter()
        .map(|item| {
            DriveItem::deserialize(item)
                .map(RemoteEntry::from)
                .map_err(|e| CoreError::Parse(format!("listing item: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_listing_projects_items_in_order() {
        let body = json!({
            "value": [
                {
                    "id": "F1",
                    "name": "Jednotky",
                    "webUrl": "https://x/Jednotky",
                    "folder": {"childCount": 3}
                },
                {"id": "F2", "name": "X.xlsx", "webUrl": "https://x/X.xlsx", "file": {}},
            ]
        });

        let entries = parse_listing(&body).expect("valid listing");
        assert_eq!(
            entries,
            vec![
                RemoteEntry {
                    name: "Jednotky".to_string(),
                    url: "https://x/Jednotky".to_string(),
                    id: "F1".to_string(),
                    is_folder: true,
                },
                RemoteEntry {
                    name: "X.xlsx".to_string(),
                    url: "https://x/X.xlsx".to_string(),
                    id: "F2".to_string(),
                    is_folder: false,
                },
            ]
        );
    }

    #[test]
    fn empty_value_is_an_empty_folder() {
        let entries = parse_listing(&json!({"value": []})).expect("empty listing");
        assert!(entries.is_empty());
    }

    #[test]
    fn missing_value_is_a_parse_error() {
        let err = parse_listing(&json!({"@odata.context": "x"})).unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));

        let err = parse_listing(&json!({"error": {"code": "itemNotFound", "message": "gone"}}))
            .unwrap_err();
        match err {
            CoreError::Parse(msg) => assert_eq!(msg, "gone"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn item_without_name_is_a_parse_error() {
        let err = parse_listing(&json!({"value": [{"id": "F1"}]})).unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[test]
    fn download_targets_are_spreadsheet_files() {
        let entry = |name: &str, is_folder| RemoteEntry {
            name: name.to_string(),
            url: String::new(),
            id: "id".to_string(),
            is_folder,
        };

        assert!(entry("a.xlsx", false).is_download_target());
        assert!(entry("c.xlsm", false).is_download_target());
        assert!(!entry("b.txt", false).is_download_target());
        assert!(!entry("a.xlsx.tmp", false).is_download_target());
        assert!(!entry("archive.xlsx", true).is_download_target());
    }
}
