//! Synthesis of requests from a configured operation mix.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::choice::WeightedChoice;
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::manager::ObjectManager;
use crate::object::ObjectId;
use crate::request::{Body, Data, Operation, Request};

/// Relative weights of the operations in a mix.
///
/// If all weights are zero, the mix consists of writes only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationWeights {
    /// Weight of [`Operation::Write`].
    pub write: f64,
    /// Weight of [`Operation::Overwrite`].
    pub overwrite: f64,
    /// Weight of [`Operation::Read`].
    pub read: f64,
    /// Weight of [`Operation::Metadata`].
    pub metadata: f64,
    /// Weight of [`Operation::Delete`].
    pub delete: f64,
    /// Weight of [`Operation::List`].
    pub list: f64,
}

impl OperationWeights {
    /// The weight of a single operation.
    pub fn get(&self, operation: Operation) -> f64 {
        match operation {
            Operation::Write => self.write,
            Operation::Overwrite => self.overwrite,
            Operation::Read => self.read,
            Operation::Metadata => self.metadata,
            Operation::Delete => self.delete,
            Operation::List => self.list,
        }
    }

    fn choices(&self) -> Result<WeightedChoice<Operation>> {
        let mut choices = WeightedChoice::new();
        for operation in Operation::ALL {
            let weight = self.get(operation);
            if !(weight >= 0.0 && weight.is_finite()) {
                return Err(Error::invalid(format!(
                    "{operation} weight must be >= 0.0 [{weight}]"
                )));
            }
            if weight > 0.0 {
                choices.add_choice(operation, weight)?;
            }
        }

        if choices.is_empty() {
            choices.add_choice(Operation::Write, 100.0)?;
        }
        Ok(choices)
    }
}

/// A builder for creating a [`RequestMix`].
#[derive(Debug)]
pub struct RequestMixBuilder {
    weights: OperationWeights,
    sizes: Vec<(Distribution, f64)>,
    data: Data,
    headers: BTreeMap<String, String>,
    seed: u64,
}

impl RequestMixBuilder {
    /// The ratio between the operations.
    pub fn operation_weights(mut self, weights: OperationWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Adds a distribution of body sizes in bytes, selected with the given weight.
    pub fn size_profile(mut self, distribution: Distribution, weight: f64) -> Self {
        self.sizes.push((distribution, weight));
        self
    }

    /// The contents of uploaded bodies.
    pub fn data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Seeds the selection of operations, sizes and body contents.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Creates the mix, validating weights and size profiles.
    pub fn build(self) -> Result<RequestMix> {
        let operations = self.weights.choices()?;

        let mut sizes = WeightedChoice::new();
        for (distribution, weight) in self.sizes {
            sizes.add_choice(distribution, weight)?;
        }
        if sizes.is_empty() && operations.items().any(|op| op.has_body()) {
            return Err(Error::invalid("writes require at least one size profile"));
        }

        Ok(RequestMix {
            operations,
            sizes,
            data: self.data,
            headers: self.headers,
            next_id: AtomicU64::new(0),
            rng: Mutex::new(SmallRng::seed_from_u64(self.seed)),
        })
    }
}

/// Produces the requests of a load test.
#[derive(Debug)]
pub struct RequestMix {
    operations: WeightedChoice<Operation>,
    sizes: WeightedChoice<Distribution>,
    data: Data,
    headers: BTreeMap<String, String>,
    next_id: AtomicU64,
    rng: Mutex<SmallRng>,
}

impl RequestMix {
    /// Constructs a new builder with a random seed and no size profiles.
    pub fn builder() -> RequestMixBuilder {
        RequestMixBuilder {
            weights: OperationWeights::default(),
            sizes: Vec::new(),
            data: Data::default(),
            headers: BTreeMap::new(),
            seed: rand::random(),
        }
    }

    fn rng(&self) -> MutexGuard<'_, SmallRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Chooses the next operation and acquires its target from `objects`.
    ///
    /// Fails with [`Error::EmptyPool`] if the operation needs an existing object but none is
    /// available. Nothing is acquired in that case.
    pub fn produce(&self, objects: &ObjectManager) -> Result<Request> {
        let (operation, body) = {
            let mut rng = self.rng();
            let operation = *self.operations.choose(&mut *rng)?;
            let body = if operation.has_body() {
                let size = self.sizes.choose(&mut *rng)?.sample(&mut *rng);
                Body {
                    data: self.data,
                    size: size.round() as u64,
                    seed: rng.random(),
                }
            } else {
                Body::empty()
            };
            (operation, body)
        };

        let object = match operation {
            Operation::Write => Some(objects.acquire_for_write()?),
            Operation::Overwrite | Operation::Read | Operation::Metadata => {
                Some(objects.acquire_for_read()?)
            }
            Operation::Delete => Some(objects.acquire_for_delete()?),
            Operation::List => None,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Request::new(id, operation, object, body, self.headers.clone()).inspect_err(|_| {
            if let Some(object) = object
                && let Err(error) = release(objects, operation, object)
            {
                tracing::warn!(error = &error as &dyn std::error::Error, "failed to release object");
            }
        })
    }
}

/// Returns `object` to the pool it was acquired from for `operation`.
///
/// Writes drop their reservation, while reads and deletes put the object back into the available
/// set.
pub(crate) fn release(objects: &ObjectManager, operation: Operation, object: ObjectId) -> Result<()> {
    match operation {
        Operation::Write => {
            objects.abort_write(object);
            Ok(())
        }
        Operation::Overwrite | Operation::Read | Operation::Metadata => {
            objects.release_from_read(object)
        }
        Operation::Delete => objects.release_from_delete(object),
        Operation::List => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_size(bytes: f64) -> Distribution {
        Distribution::constant(bytes).unwrap()
    }

    #[test]
    fn zero_weights_mean_writes() {
        let mix = RequestMix::builder()
            .size_profile(constant_size(1024.0), 1.0)
            .build()
            .unwrap();
        let objects = ObjectManager::new();

        for _ in 0..1000 {
            let request = mix.produce(&objects).unwrap();
            assert_eq!(request.operation(), Operation::Write);
            assert_eq!(request.body().size, 1024);
            assert!(request.object().is_some());
        }
    }

    #[test]
    fn rejects_invalid_weights() {
        let weights = OperationWeights {
            read: -1.0,
            ..Default::default()
        };
        assert!(RequestMix::builder().operation_weights(weights).build().is_err());
    }

    #[test]
    fn writes_require_sizes() {
        assert!(RequestMix::builder().build().is_err());

        let weights = OperationWeights {
            read: 1.0,
            ..Default::default()
        };
        assert!(RequestMix::builder().operation_weights(weights).build().is_ok());
    }

    #[test]
    fn empty_pool_acquires_nothing() {
        let weights = OperationWeights {
            read: 1.0,
            ..Default::default()
        };
        let mix = RequestMix::builder().operation_weights(weights).build().unwrap();
        let objects = ObjectManager::new();

        assert!(matches!(mix.produce(&objects), Err(Error::EmptyPool)));

        let id = objects.acquire_for_write().unwrap();
        objects.complete_write(id).unwrap();
        let request = mix.produce(&objects).unwrap();
        assert_eq!(request.object(), Some(id));
        assert_eq!(request.body(), Body::empty());
        assert_eq!(objects.checked_out_len(), 1);
    }

    #[test]
    fn list_has_no_target() {
        let weights = OperationWeights {
            list: 1.0,
            ..Default::default()
        };
        let mix = RequestMix::builder()
            .operation_weights(weights)
            .header("x-test", "1")
            .build()
            .unwrap();

        let request = mix.produce(&ObjectManager::new()).unwrap();
        assert_eq!(request.operation(), Operation::List);
        assert_eq!(request.object(), None);
        assert_eq!(request.headers().get("x-test").map(String::as_str), Some("1"));
    }

    #[test]
    fn ids_increase() {
        let mix = RequestMix::builder()
            .size_profile(constant_size(1.0), 1.0)
            .build()
            .unwrap();
        let objects = ObjectManager::new();

        let ids: Vec<_> = (0..5).map(|_| mix.produce(&objects).unwrap().id()).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn seeded_mix_is_reproducible() {
        let build = || {
            let weights = OperationWeights {
                write: 1.0,
                list: 1.0,
                ..Default::default()
            };
            RequestMix::builder()
                .operation_weights(weights)
                .size_profile(Distribution::uniform(500.0, 400.0).unwrap(), 1.0)
                .seed(42)
                .build()
                .unwrap()
        };
        let (a, b) = (build(), build());
        let objects = ObjectManager::new();

        for _ in 0..100 {
            let (x, y) = (a.produce(&objects).unwrap(), b.produce(&objects).unwrap());
            assert_eq!(x.operation(), y.operation());
            assert_eq!(x.body(), y.body());
        }
    }
}
