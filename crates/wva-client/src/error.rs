//! Errors reported by vehicle, ECU, hardware and device operations.

use thiserror::Error;

use crate::transport::TransportError;

/// Failure of a client operation.
///
/// `EndpointUnknown` is returned synchronously, before any request is sent.
/// Every other variant is delivered through the operation's [`Pending`]
/// handle.
///
/// [`Pending`]: crate::Pending
#[derive(Debug, Error)]
pub enum WvaError {
    /// The named endpoint, ECU, LED or button is not known to the client.
    #[error("Unknown endpoint: {0}")]
    EndpointUnknown(String),

    /// The device could not be reached or rejected the request.
    #[error("Request for {resource} failed: {source}")]
    ConfigurationFailed {
        resource: String,
        #[source]
        source: TransportError,
    },

    /// The device answered with something other than what was expected.
    #[error("Unexpected response for {resource}: {reason}")]
    UnexpectedResponse { resource: String, reason: String },

    /// The background operation was cancelled before it completed.
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl WvaError {
    pub(crate) fn unexpected(resource: &str, reason: impl ToString) -> Self {
        WvaError::UnexpectedResponse {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }
}
