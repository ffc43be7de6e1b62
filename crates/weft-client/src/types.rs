//! Wire types of the host's job API.

use serde::{Deserialize, Serialize};
use weft_core::{JobFailure, JobInstance, JobInstanceId, JobStatus};

/// `POST /api/execution/run` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitResponse {
    pub instance: String,
}

/// `GET /api/execution/GetStatus` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub exception_type: Option<String>,
    #[serde(default)]
    pub exception_message: Option<String>,
}

impl StatusResponse {
    pub fn into_instance(self, id: JobInstanceId) -> JobInstance {
        let failure = match (self.exception_type, self.exception_message) {
            (None, None) => None,
            (exception_type, message) => Some(JobFailure {
                exception_type: exception_type.unwrap_or_default(),
                message: message.unwrap_or_default(),
            }),
        };
        JobInstance {
            id,
            status: self.status,
            output_url: self.output_url,
            failure,
        }
    }
}
