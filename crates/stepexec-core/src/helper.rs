//! Wire types for the dataset-versioning helper process.
//!
//! The helper is an external SDK-backed CLI; these types describe what we
//! ask it to do and what comes back after decoding its marker-delimited
//! JSON payload.

use serde::{Deserialize, Serialize};

/// Action requested from the helper, with action-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HelperRequest {
    /// Create a new dataset.
    Create {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Register a new version of a dataset from a file.
    Version {
        #[serde(rename = "datasetId")]
        dataset_id: String,
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Download a dataset version to a local path.
    Download {
        #[serde(rename = "datasetId")]
        dataset_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(rename = "destPath")]
        dest_path: String,
    },
    /// List known datasets.
    List,
    /// Fetch metadata for one dataset.
    Info {
        #[serde(rename = "datasetId")]
        dataset_id: String,
    },
}

impl HelperRequest {
    /// CLI argument vector for the helper script, `action` first.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::Create { name, description } => {
                let mut args = vec!["create".to_string(), "--name".to_string(), name.clone()];
                if let Some(desc) = description {
                    args.push("--description".to_string());
                    args.push(desc.clone());
                }
                args
            }
            Self::Version {
                dataset_id,
                file_path,
                tags,
                message,
            } => {
                let mut args = vec![
                    "version".to_string(),
                    "--dataset-id".to_string(),
                    dataset_id.clone(),
                    "--file".to_string(),
                    file_path.clone(),
                ];
                for tag in tags {
                    args.push("--tag".to_string());
                    args.push(tag.clone());
                }
                if let Some(msg) = message {
                    args.push("--message".to_string());
                    args.push(msg.clone());
                }
                args
            }
            Self::Download {
                dataset_id,
                version,
                dest_path,
            } => {
                let mut args = vec![
                    "download".to_string(),
                    "--dataset-id".to_string(),
                    dataset_id.clone(),
                    "--dest".to_string(),
                    dest_path.clone(),
                ];
                if let Some(v) = version {
                    args.push("--version".to_string());
                    args.push(v.clone());
                }
                args
            }
            Self::List => vec!["list".to_string()],
            Self::Info { dataset_id } => vec![
                "info".to_string(),
                "--dataset-id".to_string(),
                dataset_id.clone(),
            ],
        }
    }
}

/// Decoded outcome of a helper invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperInvocationResult {
    pub success: bool,
    /// JSON payload decoded from the helper's stdout, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error description, combining helper stderr/stdout when decoding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HelperInvocationResult {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}
