//! Bookkeeping of dispatched requests awaiting their response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::request::Request;

/// Requests that were dispatched but have not completed.
///
/// Every request is inserted once at admission and removed once on completion.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: Mutex<HashMap<u64, Arc<Request>>>,
}

impl PendingRequests {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<Request>>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a dispatched request. Returns `false` if its id is already pending.
    pub fn insert(&self, request: Arc<Request>) -> bool {
        let mut requests = self.lock();
        if requests.contains_key(&request.id()) {
            return false;
        }
        requests.insert(request.id(), request);
        true
    }

    /// Removes and returns the pending request with the given id.
    pub fn remove(&self, id: u64) -> Option<Arc<Request>> {
        self.lock().remove(&id)
    }

    /// Removes and returns all pending requests.
    pub fn drain(&self) -> Vec<Arc<Request>> {
        self.lock().drain().map(|(_, request)| request).collect()
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no request is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::request::{Body, Operation};

    #[test]
    fn removes_exactly_once() {
        let pending = PendingRequests::new();
        let request =
            Arc::new(Request::new(7, Operation::List, None, Body::empty(), BTreeMap::new()).unwrap());

        assert!(pending.insert(Arc::clone(&request)));
        assert!(!pending.insert(request));
        assert_eq!(pending.len(), 1);

        assert_eq!(pending.remove(7).map(|r| r.id()), Some(7));
        assert!(pending.remove(7).is_none());
        assert!(pending.is_empty());

        let request =
            Arc::new(Request::new(8, Operation::List, None, Body::empty(), BTreeMap::new()).unwrap());
        pending.insert(request);
        assert_eq!(pending.drain().len(), 1);
        assert!(pending.is_empty());
    }
}
