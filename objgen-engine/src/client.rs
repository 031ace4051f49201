//! The seam between the engine and the transport that sends requests.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::request::{Request, Response};

/// Errors a [`Client`] reports instead of a response.
///
/// The operation loop records all of them as transport failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request did not complete within the client's timeout.
    #[error("request timed out")]
    Timeout,

    /// The client was shut down before the request completed.
    #[error("client is shut down")]
    Shutdown,

    /// The request could not be sent or its response could not be received.
    #[error("transport error: {context}")]
    Transport {
        /// What was being done when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ClientError {
    /// Wraps a transport-level error with context.
    pub fn transport<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Transport {
            context: context.into(),
            cause: cause.into(),
        }
    }
}

/// Sends requests to the target store.
///
/// Every call to [`execute`](Client::execute) must eventually yield exactly one result. Per-request
/// timeouts are the client's responsibility and surface as [`ClientError::Timeout`].
#[async_trait::async_trait]
pub trait Client: Debug + Send + Sync + 'static {
    /// Sends a request and waits for its response.
    async fn execute(&self, request: Arc<Request>) -> Result<Response, ClientError>;

    /// Stops accepting requests. With `immediate`, in-flight requests are abandoned.
    ///
    /// Returns `true` if the shutdown completed cleanly.
    async fn shutdown(&self, immediate: bool) -> bool;
}
