//! Bookkeeping of the objects that exist in the target store.
//!
//! The [`ObjectManager`] hands out identifiers so that reads, overwrites and deletes only ever
//! target objects whose write has completed, and so that no identifier is checked out twice at
//! the same time. Every identifier is in exactly one of three states:
//!
//!  - not yet created (possibly reserved by an in-flight write),
//!  - available in the pool,
//!  - checked out by an in-flight read, overwrite, metadata or delete request.
//!
//! A completed delete removes the identifier for good. All transitions happen under a single
//! short-lived lock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::object::ObjectId;
use crate::persist;

/// Number of attempts to generate an identifier that is not already known.
const MAX_GENERATE_ATTEMPTS: usize = 16;

type Generator = Box<dyn Fn() -> ObjectId + Send + Sync>;

#[derive(Debug)]
struct Pool {
    available: Vec<ObjectId>,
    positions: HashMap<ObjectId, usize>,
    checked_out: HashSet<ObjectId>,
    reserved: HashSet<ObjectId>,
    rng: SmallRng,
}

impl Pool {
    fn new(rng: SmallRng) -> Self {
        Self {
            available: Vec::new(),
            positions: HashMap::new(),
            checked_out: HashSet::new(),
            reserved: HashSet::new(),
            rng,
        }
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.positions.contains_key(id) || self.checked_out.contains(id)
    }

    fn insert(&mut self, id: ObjectId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.positions.insert(id, self.available.len());
        self.available.push(id);
        true
    }

    /// Removes a uniformly random identifier from the available set and checks it out.
    fn check_out(&mut self) -> Option<ObjectId> {
        if self.available.is_empty() {
            return None;
        }

        let index = self.rng.random_range(0..self.available.len());
        let id = self.available.swap_remove(index);
        self.positions.remove(&id);
        if let Some(moved) = self.available.get(index) {
            self.positions.insert(*moved, index);
        }

        self.checked_out.insert(id);
        Some(id)
    }

    fn check_in(&mut self, id: ObjectId) -> Result<()> {
        if !self.checked_out.remove(&id) {
            return Err(Error::NotCheckedOut(id));
        }
        self.positions.insert(id, self.available.len());
        self.available.push(id);
        Ok(())
    }
}

/// Tracks which objects exist and which of them are currently in use.
pub struct ObjectManager {
    pool: Mutex<Pool>,
    generate: Generator,
}

impl ObjectManager {
    /// Creates an empty manager generating random identifiers for writes.
    pub fn new() -> Self {
        Self::with_generator(ObjectId::random)
    }

    /// Creates an empty manager using `generate` to produce identifiers for writes.
    pub fn with_generator<F>(generate: F) -> Self
    where
        F: Fn() -> ObjectId + Send + Sync + 'static,
    {
        Self {
            pool: Mutex::new(Pool::new(SmallRng::from_os_rng())),
            generate: Box::new(generate),
        }
    }

    /// Creates a manager whose pool initially holds `ids`.
    ///
    /// Duplicates are ignored.
    pub fn from_ids(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        let manager = Self::new();
        {
            let mut pool = manager.lock();
            for id in ids {
                pool.insert(id);
            }
        }
        manager
    }

    /// Creates a manager from the pool persisted at `path`.
    ///
    /// A missing file yields an empty pool, while a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let ids = persist::read_pool(path)?;
        tracing::info!(count = ids.len(), path = %path.display(), "loaded object pool");
        Ok(Self::from_ids(ids))
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        // The pool is never left inconsistent across a panic, so poisoning is ignored.
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves a fresh identifier for a write.
    ///
    /// The identifier is neither in the pool nor reserved by another in-flight write. It becomes
    /// readable only after [`complete_write`](Self::complete_write).
    pub fn acquire_for_write(&self) -> Result<ObjectId> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let id = (self.generate)();
            let mut pool = self.lock();
            if !pool.contains(&id) && pool.reserved.insert(id) {
                return Ok(id);
            }
        }

        Err(Error::IdSpaceExhausted(MAX_GENERATE_ATTEMPTS))
    }

    /// Adds the identifier of a successful write to the pool.
    ///
    /// Fails with [`Error::AlreadyPresent`] if the identifier is already tracked, in which case
    /// the pool is left unchanged.
    pub fn complete_write(&self, id: ObjectId) -> Result<()> {
        let mut pool = self.lock();
        pool.reserved.remove(&id);
        if pool.insert(id) {
            Ok(())
        } else {
            Err(Error::AlreadyPresent(id))
        }
    }

    /// Drops the reservation of a failed write without adding it to the pool.
    pub fn abort_write(&self, id: ObjectId) {
        self.lock().reserved.remove(&id);
    }

    /// Checks out an available identifier for a read, overwrite or metadata request.
    ///
    /// Fails with [`Error::EmptyPool`] if nothing is available.
    pub fn acquire_for_read(&self) -> Result<ObjectId> {
        self.lock().check_out().ok_or(Error::EmptyPool)
    }

    /// Returns an identifier checked out by [`acquire_for_read`](Self::acquire_for_read).
    pub fn release_from_read(&self, id: ObjectId) -> Result<()> {
        self.lock().check_in(id)
    }

    /// Checks out an available identifier for a delete.
    ///
    /// Once the delete succeeded, call [`complete_delete`](Self::complete_delete). If it failed,
    /// return the identifier with [`release_from_delete`](Self::release_from_delete).
    pub fn acquire_for_delete(&self) -> Result<ObjectId> {
        self.lock().check_out().ok_or(Error::EmptyPool)
    }

    /// Removes a deleted identifier for good.
    pub fn complete_delete(&self, id: ObjectId) -> Result<()> {
        if self.lock().checked_out.remove(&id) {
            Ok(())
        } else {
            Err(Error::NotCheckedOut(id))
        }
    }

    /// Returns the identifier of a failed delete to the pool.
    pub fn release_from_delete(&self, id: ObjectId) -> Result<()> {
        self.lock().check_in(id)
    }

    /// Number of identifiers available for checkout.
    pub fn available_len(&self) -> usize {
        self.lock().available.len()
    }

    /// Number of identifiers currently checked out.
    pub fn checked_out_len(&self) -> usize {
        self.lock().checked_out.len()
    }

    /// Copies the available identifiers.
    ///
    /// The lock is held only for the duration of the copy.
    pub fn export_available(&self) -> Vec<ObjectId> {
        self.lock().available.clone()
    }

    /// Persists the available identifiers to `path`.
    ///
    /// Checked-out identifiers are transient and not included.
    pub fn checkpoint(&self, path: &Path) -> Result<usize> {
        let ids = self.export_available();
        persist::write_pool(path, &ids)?;
        tracing::debug!(count = ids.len(), path = %path.display(), "checkpointed object pool");
        Ok(ids.len())
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.lock();
        f.debug_struct("ObjectManager")
            .field("available", &pool.available.len())
            .field("checked_out", &pool.checked_out.len())
            .field("reserved", &pool.reserved.len())
            .finish_non_exhaustive()
    }
}
