use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{formats::CommaSeparator, serde_as, StringWithSeparator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "file_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
    Other,
}

impl FileKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            FileKind::Image
        } else if mime == "application/pdf" || mime.starts_with("text/") {
            FileKind::Document
        } else {
            FileKind::Other
        }
    }
}

/// Tables a file can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceTable {
    Items,
    Borrowings,
    Users,
}

impl ReferenceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceTable::Items => "items",
            ReferenceTable::Borrowings => "borrowings",
            ReferenceTable::Users => "users",
        }
    }
}

impl fmt::Display for ReferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(ReferenceTable::Items),
            "borrowings" => Ok(ReferenceTable::Borrowings),
            "users" => Ok(ReferenceTable::Users),
            other => Err(format!("Unknown reference table: {other}")),
        }
    }
}

pub const FILE_COLUMNS: &str = "id, original_name, file_name, file_path, file_size, mime_type, \
     folder, file_type, reference_table, reference_id, created_date";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i32,
    pub original_name: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub folder: String,
    pub file_type: FileKind,
    pub reference_table: Option<String>,
    pub reference_id: Option<i32>,
    pub created_date: DateTime<Utc>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    #[serde(rename = "referenceTable")]
    pub reference_table: Option<ReferenceTable>,
    #[serde(rename = "referenceId")]
    pub reference_id: Option<i32>,
    #[serde_as(as = "Option<StringWithSeparator::<CommaSeparator, i32>>")]
    #[serde(rename = "fileIds")]
    pub file_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct ServeQuery {
    pub download: Option<bool>,
}

/// Outcome of one part of a multi-file upload.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadResult {
    Stored {
        success: bool,
        file: FileRecord,
    },
    Failed {
        success: bool,
        #[serde(rename = "fileName")]
        file_name: String,
        error: String,
    },
}

impl UploadResult {
    pub fn stored(file: FileRecord) -> Self {
        UploadResult::Stored { success: true, file }
    }

    pub fn failed(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        UploadResult::Failed {
            success: false,
            file_name: file_name.into(),
            error: error.into(),
        }
    }
}
