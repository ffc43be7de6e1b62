//! Client for a Weft host's remote job API.
//!
//! Submit a function by short name with parameters and prerequisite job ids,
//! then poll its status with a capped, growing interval until it completes.
//!
//! ```no_run
//! use weft_client::{ClientError, JobClient};
//!
//! # async fn example() -> Result<(), ClientError> {
//! let client = JobClient::new("http://localhost:7071", |name: &str| {
//!     Some(format!("Acme.Functions.{name}"))
//! })?;
//! let id = client.submit("Resize", [("name", "cat.jpg")], &[]).await?;
//! match client.wait_for_completion(&id).await {
//!     Ok(done) => println!("output: {:?}", done.output_url),
//!     Err(ClientError::JobFailed { exception_type, message }) => {
//!         eprintln!("{exception_type}: {message}")
//!     }
//!     Err(other) => return Err(other),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{FunctionResolver, JobClient};
pub use error::{ClientError, Result};
pub use types::{StatusResponse, SubmitResponse};
pub use weft_core::{BackoffPolicy, JobFailure, JobInstance, JobInstanceId, JobStatus};
