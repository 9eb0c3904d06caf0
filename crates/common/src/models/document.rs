//! Document record as stored in the Document Store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// An uploaded document and the artifacts derived from it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Row id; integer keys are read as their decimal text
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,

    pub file_name: String,

    /// Size in bytes
    #[serde(default)]
    pub file_size: i64,

    #[serde(default)]
    pub file_extension: String,

    pub created_at: DateTime<Utc>,

    /// Storage path; also the key the Training Backend uses for datasets
    pub file_path: String,

    /// Generated dataset location, empty until generation succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpaca_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_model_path: Option<String>,

    /// Free-form status column maintained server-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_status: Option<String>,
}

impl Document {
    /// Check if a dataset has been generated for this document
    pub fn has_dataset(&self) -> bool {
        self.alpaca_path
            .as_deref()
            .map(|path| !path.trim().is_empty())
            .unwrap_or(false)
    }

    /// Size in kilobytes, as shown in listings
    pub fn size_kb(&self) -> f64 {
        self.file_size as f64 / 1024.0
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid document id: {}", other))),
    }
}

/// Fields supplied when a document record is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub file_name: String,
    pub file_size: i64,
    pub file_extension: String,
    pub file_path: String,
}

impl NewDocument {
    /// Derive the record for a file stored under `file_path`
    pub fn for_upload(file_name: &str, file_size: i64, file_path: &str) -> Self {
        let file_extension = std::path::Path::new(file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        Self {
            file_name: file_name.to_string(),
            file_size,
            file_extension,
            file_path: file_path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(alpaca_path: Option<&str>) -> Document {
        Document {
            id: "1".to_string(),
            file_name: "a.txt".to_string(),
            file_size: 2048,
            file_extension: ".txt".to_string(),
            created_at: Utc::now(),
            file_path: "uploads/a.txt".to_string(),
            alpaca_path: alpaca_path.map(str::to_string),
            trained_model_path: None,
            training_status: None,
        }
    }

    #[test]
    fn test_has_dataset() {
        assert!(!document(None).has_dataset());
        assert!(!document(Some("")).has_dataset());
        assert!(!document(Some("   ")).has_dataset());
        assert!(document(Some("datasets/a.json")).has_dataset());
    }

    #[test]
    fn test_size_kb() {
        assert_eq!(document(None).size_kb(), 2.0);
    }

    #[test]
    fn test_decode_store_row() {
        let row = serde_json::json!({
            "id": "7f1c",
            "file_name": "report.pdf",
            "file_size": 10240,
            "file_extension": ".pdf",
            "created_at": "2024-05-01T10:00:00.123456+00:00",
            "file_path": "user/report.pdf",
            "alpaca_path": null
        });
        let doc: Document = serde_json::from_value(row).unwrap();
        assert_eq!(doc.id, "7f1c");
        assert!(!doc.has_dataset());
        assert_eq!(doc.trained_model_path, None);
    }

    #[test]
    fn test_numeric_id() {
        let row = serde_json::json!({
            "id": 42,
            "file_name": "a.txt",
            "created_at": "2024-05-01T10:00:00Z",
            "file_path": "u/a.txt"
        });
        let doc: Document = serde_json::from_value(row).unwrap();
        assert_eq!(doc.id, "42");
    }

    #[test]
    fn test_new_document_extension() {
        let new = NewDocument::for_upload("Thesis.PDF", 10, "u/Thesis.PDF");
        assert_eq!(new.file_extension, ".pdf");
        assert_eq!(NewDocument::for_upload("README", 1, "u/README").file_extension, "");
    }
}
