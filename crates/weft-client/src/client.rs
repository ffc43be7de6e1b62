//! JobClient - submit jobs to a host and wait for their outcome.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use weft_core::shutdown::cancelled;
use weft_core::{BackoffPolicy, JobFailure, JobInstance, JobInstanceId, JobStatus};

use crate::error::{ClientError, Result};
use crate::types::{StatusResponse, SubmitResponse};

/// Maps a function's short name to the canonical name the host expects.
pub trait FunctionResolver: Send + Sync {
    fn resolve(&self, short_name: &str) -> Option<String>;
}

impl<F> FunctionResolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, short_name: &str) -> Option<String> {
        self(short_name)
    }
}

/// Client for the host's job submission/status API.
///
/// ```no_run
/// use weft_client::JobClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = JobClient::new("http://localhost:7071", |name: &str| {
///     Some(format!("Acme.Functions.{name}"))
/// })?;
/// let id = client.submit("Foo", [("x", "1")], &[]).await?;
/// let done = client.wait_for_completion(&id).await?;
/// println!("{:?}", done.output_url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JobClient {
    base_url: String,
    http: HttpClient,
    resolver: Arc<dyn FunctionResolver>,
    poll: BackoffPolicy,
}

impl JobClient {
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the HTTP client cannot
    /// be created.
    pub fn new(base_url: impl Into<String>, resolver: impl FunctionResolver + 'static) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {base_url}"
            )));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            resolver: Arc::new(resolver),
            poll: BackoffPolicy::polling(),
        })
    }

    /// Replace the status polling schedule.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if any delay of the policy is zero.
    pub fn with_poll_policy(mut self, poll: BackoffPolicy) -> Result<Self> {
        poll.validate("poll")?;
        self.poll = poll;
        Ok(self)
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = HttpClient::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn poll_policy(&self) -> &BackoffPolicy {
        &self.poll
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/execution/{}", self.base_url, path)
    }

    /// Submit `short_name` with `params`; `prerequisites` are instances whose
    /// outputs this job consumes.
    pub async fn submit<I, K, V>(
        &self,
        short_name: &str,
        params: I,
        prerequisites: &[JobInstanceId],
    ) -> Result<JobInstanceId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let function = self
            .resolver
            .resolve(short_name)
            .ok_or_else(|| ClientError::UnknownFunction(short_name.to_string()))?;

        let mut query: Vec<(String, String)> = vec![("func".to_string(), function.clone())];
        query.extend(
            params
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
        if !prerequisites.is_empty() {
            let ids: Vec<&str> = prerequisites.iter().map(JobInstanceId::as_str).collect();
            query.push(("$prereq".to_string(), ids.join(";")));
        }

        let response = self.http.post(self.url("run")).query(&query).send().await?;
        let status = response.status();
        if status.is_client_error() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(function = %function, status = status.as_u16(), message = %message, "job submission rejected");
            return Err(ClientError::Invocation {
                status: status.as_u16(),
                message,
            });
        }

        let body: SubmitResponse = handle_response(response).await?;
        let id = JobInstanceId::new(body.instance);
        info!(function = %function, instance = %id, "job submitted");
        Ok(id)
    }

    pub async fn get_status(&self, id: &JobInstanceId) -> Result<JobInstance> {
        let response = self
            .http
            .get(self.url("GetStatus"))
            .query(&[("id", id.as_str())])
            .send()
            .await?;
        let body: StatusResponse = handle_response(response).await?;
        Ok(body.into_instance(id.clone()))
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_for_completion(&self, id: &JobInstanceId) -> Result<JobInstance> {
        // the sender lives until the wait ends, so this never cancels
        let (_never, mut rx) = watch::channel(false);
        self.wait_for_completion_until(id, &mut rx).await
    }

    /// Poll until terminal or until `cancel` fires.
    ///
    /// `CompletedSuccess` resolves the wait; `CompletedFailed` becomes
    /// `ClientError::JobFailed`; `None` is `ClientError::InvalidStatus`.
    pub async fn wait_for_completion_until(
        &self,
        id: &JobInstanceId,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<JobInstance> {
        let mut intervals = self.poll.intervals();
        loop {
            if *cancel.borrow() {
                return Err(ClientError::Cancelled);
            }

            let instance = tokio::select! {
                _ = cancelled(cancel) => return Err(ClientError::Cancelled),
                instance = self.get_status(id) => instance?,
            };

            match instance.status {
                JobStatus::CompletedSuccess => {
                    info!(instance = %id, "job completed");
                    return Ok(instance);
                }
                JobStatus::CompletedFailed => {
                    let failure = instance.failure.unwrap_or_else(|| JobFailure {
                        exception_type: String::new(),
                        message: String::new(),
                    });
                    warn!(instance = %id, exception_type = %failure.exception_type, "job failed");
                    return Err(ClientError::JobFailed {
                        exception_type: failure.exception_type,
                        message: failure.message,
                    });
                }
                JobStatus::None => {
                    return Err(ClientError::InvalidStatus {
                        id: id.to_string(),
                        status: "None".to_string(),
                    });
                }
                JobStatus::Queued | JobStatus::Running => {}
            }

            let delay = intervals.next().unwrap_or(self.poll.max);
            debug!(instance = %id, status = ?instance.status, next_poll = ?delay, "job not finished");
            tokio::select! {
                _ = cancelled(cancel) => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl std::fmt::Debug for JobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobClient")
            .field("base_url", &self.base_url)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

/// Deserialize a success body, or turn an error response into `Api`.
async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(serde_json::from_str(&body)?)
    } else {
        Err(ClientError::Api {
            status: status.as_u16(),
            message: body,
        })
    }
}
