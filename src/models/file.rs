use serde::{Deserialize, Serialize};

use super::Link;

/// File stored in the cloud
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFile {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub original_file_path: Option<String>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub link: Link,
}

/// `{ files: [...] }` response of the file listing and queries
#[derive(Debug, Clone, Deserialize)]
pub struct FileList {
    pub files: Vec<CloudFile>,
}

/// File specification used in `files/query/*` calls
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuerySpecifier {
    pub file_name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

/// File reference in a job submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitSpecifier {
    pub name: String,
    pub timestamp: String,
}
