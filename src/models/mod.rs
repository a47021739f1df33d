// Data models for the Batch Apps REST API

pub mod file;
pub mod job;
pub mod pool;

use serde::{Deserialize, Deserializer, Serialize};

pub use file::{CloudFile, FileList, QuerySpecifier, SubmitSpecifier};
pub use job::{
    JobList, JobLog, JobSummary, LogMessage, OutputRef, SubmitResponse, SubmittedRef, TaskInfo,
    WireOutput,
};
pub use pool::{AddPoolResponse, CertificateReference, PoolInfo, PoolList};

/// `{ "href": ... }` link object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: Option<String>,
}

/// Accept an integer sent either as a number or a string
pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid integer: {}", n))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid integer: {}", s))),
        Some(other) => Err(D::Error::custom(format!("invalid integer: {}", other))),
    }
}

/// Accept a string, number or null as an optional string
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_u32")]
        count: u32,
        #[serde(default, deserialize_with = "lenient_string")]
        label: Option<String>,
    }

    #[test]
    fn test_lenient_u32() {
        let s: Sample = serde_json::from_str(r#"{"count": "12"}"#).unwrap();
        assert_eq!(s.count, 12);
        let s: Sample = serde_json::from_str(r#"{"count": 3}"#).unwrap();
        assert_eq!(s.count, 3);
        let s: Sample = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(s.count, 0);
        assert!(serde_json::from_str::<Sample>(r#"{"count": "many"}"#).is_err());
    }

    #[test]
    fn test_lenient_string() {
        let s: Sample = serde_json::from_str(r#"{"label": 42}"#).unwrap();
        assert_eq!(s.label.as_deref(), Some("42"));
        let s: Sample = serde_json::from_str(r#"{"label": null}"#).unwrap();
        assert_eq!(s.label, None);
    }
}
