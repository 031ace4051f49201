//! Requests synthesized by the engine and the responses a [`Client`](crate::client::Client)
//! reports for them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::ObjectId;

/// Status recorded for requests that failed without a response from the target.
pub const TRANSPORT_FAILURE_STATUS: u16 = 599;

/// Response metadata key carrying a server-assigned object name in hex.
pub const OBJECT_NAME_METADATA: &str = "object_name";

/// The kind of operation performed against the target store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Creates a new object.
    Write,
    /// Replaces the contents of an existing object.
    Overwrite,
    /// Reads an existing object.
    Read,
    /// Fetches metadata of an existing object.
    Metadata,
    /// Permanently removes an existing object.
    Delete,
    /// Lists objects in the container.
    List,
}

impl Operation {
    /// All operations, in a stable order.
    pub const ALL: [Operation; 6] = [
        Operation::Write,
        Operation::Overwrite,
        Operation::Read,
        Operation::Metadata,
        Operation::Delete,
        Operation::List,
    ];

    /// The lowercase name of this operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Overwrite => "overwrite",
            Operation::Read => "read",
            Operation::Metadata => "metadata",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Operation::Write => 0,
            Operation::Overwrite => 1,
            Operation::Read => 2,
            Operation::Metadata => 3,
            Operation::Delete => 4,
            Operation::List => 5,
        }
    }

    /// Returns `true` if the operation targets a single object.
    pub fn targets_object(self) -> bool {
        match self {
            Operation::Write
            | Operation::Overwrite
            | Operation::Read
            | Operation::Metadata
            | Operation::Delete => true,
            Operation::List => false,
        }
    }

    /// Returns `true` if the operation uploads a body.
    pub fn has_body(self) -> bool {
        match self {
            Operation::Write | Operation::Overwrite => true,
            Operation::Read | Operation::Metadata | Operation::Delete | Operation::List => false,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of uploaded bodies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Data {
    /// Pseudo-random bytes derived from [`Body::seed`].
    #[default]
    Random,
    /// All zero bytes.
    Zeroes,
}

/// Describes the body of a request without materializing it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Body {
    /// What the body is filled with.
    pub data: Data,
    /// Length of the body in bytes.
    pub size: u64,
    /// Seed for [`Data::Random`] contents.
    pub seed: u64,
}

impl Body {
    /// An empty body.
    pub const fn empty() -> Self {
        Self {
            data: Data::Zeroes,
            size: 0,
            seed: 0,
        }
    }
}

/// A request admitted by the operation loop.
///
/// Requests are immutable once created.
#[derive(Clone, Debug)]
pub struct Request {
    id: u64,
    operation: Operation,
    object: Option<ObjectId>,
    body: Body,
    headers: BTreeMap<String, String>,
}

impl Request {
    /// Creates a request, validating that the target and body fit the operation.
    pub fn new(
        id: u64,
        operation: Operation,
        object: Option<ObjectId>,
        body: Body,
        headers: BTreeMap<String, String>,
    ) -> Result<Self> {
        if operation.targets_object() != object.is_some() {
            return Err(Error::invalid(format!(
                "{operation} request {} object target",
                if object.is_some() { "must not have an" } else { "requires an" }
            )));
        }
        if !operation.has_body() && body.size > 0 {
            return Err(Error::invalid(format!("{operation} request must not have a body")));
        }

        Ok(Self {
            id,
            operation,
            object,
            body,
            headers,
        })
    }

    /// Unique, monotonically increasing id of this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The operation performed by this request.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The targeted object, absent for [`Operation::List`].
    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    /// The uploaded body.
    pub fn body(&self) -> Body {
        self.body
    }

    /// Additional headers to send with the request.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// The outcome of a [`Request`] as reported by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    request_id: u64,
    status: u16,
    bytes: u64,
    metadata: BTreeMap<String, String>,
}

impl Response {
    /// Creates a response for the request with the given id.
    pub fn new(request_id: u64, status: u16, bytes: u64) -> Self {
        Self {
            request_id,
            status,
            bytes,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a response carrying metadata returned by the target.
    pub fn with_metadata(
        request_id: u64,
        status: u16,
        bytes: u64,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request_id,
            status,
            bytes,
            metadata,
        }
    }

    /// The response recorded when a request failed without reaching the target.
    pub fn transport_failure(request_id: u64) -> Self {
        Self::new(request_id, TRANSPORT_FAILURE_STATUS, 0)
    }

    /// Id of the originating request.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The status code, [`TRANSPORT_FAILURE_STATUS`] for transport failures.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Number of body bytes transferred.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns `true` for `2xx` status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The object name assigned by the target for a write, if any.
    pub fn object_name(&self) -> Option<&str> {
        self.metadata.get(OBJECT_NAME_METADATA).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_targets() {
        let id = ObjectId::random();
        let headers = BTreeMap::new;

        assert!(Request::new(0, Operation::Read, Some(id), Body::empty(), headers()).is_ok());
        assert!(Request::new(0, Operation::Read, None, Body::empty(), headers()).is_err());
        assert!(Request::new(0, Operation::List, Some(id), Body::empty(), headers()).is_err());
        assert!(Request::new(0, Operation::List, None, Body::empty(), headers()).is_ok());
    }

    #[test]
    fn validates_bodies() {
        let id = ObjectId::random();
        let body = Body {
            data: Data::Random,
            size: 10,
            seed: 1,
        };

        assert!(Request::new(0, Operation::Write, Some(id), body, BTreeMap::new()).is_ok());
        assert!(Request::new(0, Operation::Delete, Some(id), body, BTreeMap::new()).is_err());
    }

    #[test]
    fn transport_failure_is_not_success() {
        let response = Response::transport_failure(3);
        assert_eq!(response.request_id(), 3);
        assert_eq!(response.status(), TRANSPORT_FAILURE_STATUS);
        assert!(!response.is_success());
        assert!(Response::new(3, 204, 0).is_success());
    }
}
