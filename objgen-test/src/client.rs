//! An in-memory object store implementing [`Client`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use objgen_engine::client::{Client, ClientError};
use objgen_engine::object::ObjectId;
use objgen_engine::request::{OBJECT_NAME_METADATA, Operation, Request, Response};

/// An S3-like store that keeps object sizes in memory.
///
/// Writes create objects, reads and metadata requests succeed only for existing objects, and
/// deletes remove them. Requests to missing objects answer `404` and are counted, so tests can
/// assert that the engine never targets objects that do not exist.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    objects: Mutex<HashMap<ObjectId, u64>>,
    latency: Duration,
    fail_every: Option<u64>,
    assign_names: bool,

    executed: AtomicU64,
    not_found: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    shutdown: Mutex<Option<bool>>,
    closed: AtomicBool,
}

impl InMemoryClient {
    /// Creates an empty store answering immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every `n`-th request with a transport error without touching the store.
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Names written objects instead of using the identifier of the request.
    pub fn assign_names(mut self) -> Self {
        self.assign_names = true;
        self
    }

    /// Adds an existing object to the store.
    pub fn insert(&self, id: ObjectId, size: u64) {
        self.lock().insert(id, size);
    }

    /// Wraps the store in an [`Arc`], for sharing it with a load test.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectId, u64>> {
        self.objects.lock().unwrap()
    }

    /// Identifiers of all stored objects.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.lock().keys().copied().collect()
    }

    /// Number of executed requests, including failed ones.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Number of requests that targeted a missing object.
    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }

    /// Highest number of requests in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Relaxed)
    }

    /// The `immediate` flag of the shutdown, if the client was shut down.
    pub fn shutdown_mode(&self) -> Option<bool> {
        *self.shutdown.lock().unwrap()
    }

    fn respond(&self, request: &Request) -> Response {
        let id = request.id();
        let mut objects = self.lock();

        let Some(object) = request.object() else {
            return Response::new(id, 200, 0);
        };

        let found = objects.get(&object).copied();
        let response = match (request.operation(), found) {
            (Operation::Write, _) if self.assign_names => {
                let name = ObjectId::random();
                objects.insert(name, request.body().size);
                let metadata = BTreeMap::from([(OBJECT_NAME_METADATA.to_owned(), name.to_string())]);
                return Response::with_metadata(id, 201, request.body().size, metadata);
            }
            (Operation::Write, _) => {
                objects.insert(object, request.body().size);
                Response::new(id, 201, request.body().size)
            }
            (Operation::Overwrite, Some(_)) => {
                objects.insert(object, request.body().size);
                Response::new(id, 200, request.body().size)
            }
            (Operation::Read, Some(size)) => Response::new(id, 200, size),
            (Operation::Metadata, Some(_)) => Response::new(id, 200, 0),
            (Operation::Delete, Some(_)) => {
                objects.remove(&object);
                Response::new(id, 204, 0)
            }
            (_, None) => Response::new(id, 404, 0),
            (Operation::List, Some(_)) => Response::new(id, 200, 0),
        };

        if response.status() == 404 {
            self.not_found.fetch_add(1, Ordering::Relaxed);
        }
        response
    }
}

#[async_trait::async_trait]
impl Client for InMemoryClient {
    async fn execute(&self, request: Arc<Request>) -> Result<Response, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }

        let count = self.executed.fetch_add(1, Ordering::Relaxed) + 1;
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::Relaxed);

        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }

        let result = match self.fail_every {
            Some(n) if count % n == 0 => Err(ClientError::transport(
                format!("sending request {}", request.id()),
                "connection reset",
            )),
            _ => Ok(self.respond(&request)),
        };

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }

    async fn shutdown(&self, immediate: bool) -> bool {
        self.closed.store(true, Ordering::Release);
        *self.shutdown.lock().unwrap() = Some(immediate);
        true
    }
}
