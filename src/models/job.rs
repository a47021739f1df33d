use serde::{Deserialize, Serialize};

use super::{lenient_string, lenient_u32, Link};

// ==================================================================================================
// Job Models
// ==================================================================================================

/// Job as returned by `GET jobs` and `GET jobs/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[serde(deserialize_with = "lenient_string_required")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub percent_complete: Option<String>,
    #[serde(default)]
    pub settings: Option<String>,
    #[serde(default)]
    pub submission_time: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub instance_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub task_count: u32,
    #[serde(default)]
    pub output_file_name: Option<String>,
    #[serde(default)]
    pub output_link: Link,
    #[serde(default)]
    pub preview_link: Link,
    #[serde(default)]
    pub task_list_link: Link,
    #[serde(default)]
    pub pool_id: Option<String>,
}

fn lenient_string_required<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    lenient_string(deserializer)?.ok_or_else(|| D::Error::custom("missing id"))
}

/// `GET jobs` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobList {
    pub total_count: u64,
    pub jobs: Vec<serde_json::Value>,
}

/// `POST jobs` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub link: Link,
}

/// Reference to a newly submitted job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedRef {
    pub id: String,
    pub link: Option<String>,
}

/// `GET jobs/{id}/log` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    #[serde(default)]
    pub up_to: Option<String>,
    #[serde(default)]
    pub messages: Vec<LogMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    #[serde(default, deserialize_with = "lenient_string")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text: String,
}

// ==================================================================================================
// Output Models
// ==================================================================================================

/// Output reference as sent by the service
#[derive(Debug, Clone, Deserialize)]
pub struct WireOutput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Link,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Output of a job or task
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputRef {
    pub name: Option<String>,
    pub link: Option<String>,
    pub kind: Option<String>,
}

impl From<WireOutput> for OutputRef {
    fn from(wire: WireOutput) -> Self {
        Self {
            name: wire.name,
            link: wire.link.href,
            kind: wire.kind,
        }
    }
}

// ==================================================================================================
// Task Models
// ==================================================================================================

/// Task as returned by `GET jobs/{id}/tasks`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub id: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub core_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub charge_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub non_charge_time: Option<String>,
    #[serde(default)]
    pub outputs: Vec<WireOutput>,
}
