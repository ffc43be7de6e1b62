//! Domain model (ids, function descriptors, leases, listener state, job records).
//!
//! ここにある型は I/O を持たない。lease store や HTTP などの副作用は
//! ports / impls / weft-client 側に置く。

pub mod errors;
pub mod function;
pub mod ids;
pub mod job;
pub mod lease;
pub mod state;

pub use self::errors::{HostError, ListenerError};
pub use self::function::{
    DisableMarker, FunctionDescriptor, FunctionId, SingletonMode, SingletonSpec,
};
pub use self::ids::{HolderId, Id, IdMarker, ListenerId};
pub use self::job::{JobFailure, JobInstance, JobInstanceId, JobStatus};
pub use self::lease::Lease;
pub use self::state::ListenerState;
