//! Bounded archive of best-known individuals.

use super::genome::{GenomeError, GenomeOps, Individual};
use super::ring::RingIndex;

/// Ring buffer of pre-allocated individual slots.
///
/// Insertion deep-copies into the oldest slot once the archive is full.
/// Lookup by logical index: 0 is the most recently inserted individual.
#[derive(Debug, Clone)]
pub struct Archive<G> {
    slots: Vec<Individual<G>>,
    ring: RingIndex,
}

impl<G: Clone> Archive<G> {
    /// Create an archive, allocating every slot up front.
    ///
    /// Fails without leaving a partial archive if any allocation fails.
    pub fn new<O>(capacity: usize, ops: &O) -> Result<Self, GenomeError>
    where
        O: GenomeOps<Genome = G>,
    {
        if capacity == 0 {
            return Err(GenomeError::Allocation(
                "archive capacity must be non-zero".to_string(),
            ));
        }

        let slots = (0..capacity)
            .map(|_| ops.allocate().map(Individual::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            slots,
            ring: RingIndex::new(capacity),
        })
    }

    /// Copy an individual into the archive and return the stored copy.
    ///
    /// The returned slot stays valid until `capacity` further insertions.
    pub fn insert(&mut self, individual: &Individual<G>) -> &mut Individual<G> {
        let slot = self.ring.advance();
        let stored = &mut self.slots[slot];
        stored.copy_from(individual);
        stored
    }

    /// Get the `index`-th most recent individual.
    ///
    /// Panics if `index >= len()`.
    pub fn get(&self, index: usize) -> &Individual<G> {
        &self.slots[self.ring.physical(index)]
    }

    /// Mutable access to the `index`-th most recent individual.
    pub fn get_mut(&mut self, index: usize) -> &mut Individual<G> {
        let slot = self.ring.physical(index);
        &mut self.slots[slot]
    }

    /// Most recently inserted individual.
    pub fn latest(&self) -> Option<&Individual<G>> {
        (!self.is_empty()).then(|| self.get(0))
    }

    /// Stored individuals, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Individual<G>> {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
