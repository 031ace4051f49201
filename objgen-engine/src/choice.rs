//! Selection among configured alternatives, such as operation kinds, size profiles or hosts.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;

use crate::error::{Error, Result};

/// Chooses items with probability proportional to their weight.
///
/// Every call to [`choose`](Self::choose) is independent.
#[derive(Clone, Debug)]
pub struct WeightedChoice<T> {
    items: Vec<T>,
    weights: Vec<f64>,
    index: Option<WeightedIndex<f64>>,
}

impl<T> WeightedChoice<T> {
    /// Creates an empty selector.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            weights: Vec::new(),
            index: None,
        }
    }

    /// Adds an item with the given weight, which must be positive.
    pub fn add_choice(&mut self, item: T, weight: f64) -> Result<()> {
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(Error::invalid(format!("weight must be > 0.0 [{weight}]")));
        }

        let mut weights = self.weights.clone();
        weights.push(weight);
        let index = WeightedIndex::new(&weights)
            .map_err(|error| Error::invalid(format!("invalid weights: {error}")))?;

        self.items.push(item);
        self.weights = weights;
        self.index = Some(index);
        Ok(())
    }

    /// Returns the number of choices.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no choices have been added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates all items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Picks one item.
    ///
    /// Fails if no choices have been added.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| Error::invalid("no choices to select from"))?;
        Ok(&self.items[index.sample(rng)])
    }
}

impl<T> Default for WeightedChoice<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycles through items in order, wrapping around at the end.
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    next: AtomicUsize,
}

impl<T> RoundRobin<T> {
    /// Creates a cycle over `items`, which must not be empty.
    pub fn new(items: Vec<T>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::invalid("round robin requires at least one item"));
        }
        Ok(Self {
            items,
            next: AtomicUsize::new(0),
        })
    }

    /// Returns the next item of the cycle.
    pub fn next(&self) -> &T {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.items.len();
        &self.items[index]
    }
}
