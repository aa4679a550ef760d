use crate::ClusterId;
use thiserror::Error;

/// Errors produced while configuring or running a clustering.
///
/// Empty input is not an error; it produces an empty output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A threshold, radius, grid shape or batch size that can never produce a valid run.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A cluster id that was never allocated by the store.
    /// Seeing this means the caller broke the store's contract.
    #[error("cluster {0} was never allocated")]
    NotFound(ClusterId),
    /// A merge referenced a cluster that an earlier merge already consumed.
    #[error("cluster {0} has already been merged")]
    Retired(ClusterId),
    /// The run was aborted through a [`CancelToken`](crate::CancelToken).
    #[error("clustering was cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
