//! Remote job-instance records, as exposed by the host's job API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque id of a submitted job instance, as assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobInstanceId(String);

impl JobInstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a job instance.
///
/// Accepts either the variant name (`"Queued"`) or its numeric code (`1`) on
/// the wire; always serializes as the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr")]
pub enum JobStatus {
    /// Reserved. Only seen when the server failed to serialize a real status.
    None,
    Queued,
    Running,
    CompletedSuccess,
    CompletedFailed,
}

impl JobStatus {
    /// `None` is deliberately not terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::CompletedSuccess | JobStatus::CompletedFailed)
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(JobStatus::None),
            1 => Some(JobStatus::Queued),
            2 => Some(JobStatus::Running),
            3 => Some(JobStatus::CompletedSuccess),
            4 => Some(JobStatus::CompletedFailed),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "None" => Some(JobStatus::None),
            "Queued" => Some(JobStatus::Queued),
            "Running" => Some(JobStatus::Running),
            "CompletedSuccess" => Some(JobStatus::CompletedSuccess),
            "CompletedFailed" => Some(JobStatus::CompletedFailed),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<StatusRepr> for JobStatus {
    type Error = String;

    fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
        match repr {
            StatusRepr::Code(code) => {
                JobStatus::from_code(code).ok_or_else(|| format!("unknown job status code {code}"))
            }
            StatusRepr::Name(name) => {
                JobStatus::from_name(&name).ok_or_else(|| format!("unknown job status '{name}'"))
            }
        }
    }
}

/// Failure detail reported by the executing side, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub exception_type: String,
    pub message: String,
}

/// Snapshot of one job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: JobInstanceId,
    pub status: JobStatus,
    pub output_url: Option<String>,
    pub failure: Option<JobFailure>,
}
