//! Collections used in `lightsync`.
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

/// A map with the ability to randomly select values.
#[derive(Debug)]
pub struct AddressBook<K, V> {
    inner: HashMap<K, V>,
    rng: fastrand::Rng,
}

impl<K: Hash + Eq + Ord, V> AddressBook<K, V> {
    /// Create a new address book.
    pub fn new(rng: fastrand::Rng) -> Self {
        Self {
            inner: HashMap::new(),
            rng,
        }
    }

    /// Pick a random value in the book matching a predicate.
    ///
    /// Candidates are visited in key order before sampling, so that the outcome
    /// only depends on the state of the RNG.
    pub fn sample_with(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> Option<(&K, &V)> {
        let mut pairs = self
            .inner
            .iter()
            .filter(|(k, v)| predicate(*k, *v))
            .collect::<Vec<_>>();

        if pairs.is_empty() {
            return None;
        }
        pairs.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let ix = self.rng.usize(..pairs.len());

        Some(pairs[ix])
    }
}

impl<K, V> Deref for AddressBook<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<K, V> DerefMut for AddressBook<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
