use std::collections::{BTreeMap, BTreeSet};

/// The (namespace, collection) pairs a caller is allowed to see.
///
/// The storage read APIs treat an empty filter like no filter and return
/// everything stored. Applied directly through [`TxPvtData::filtered`], an
/// empty filter allows no collection.
///
/// [`TxPvtData::filtered`]: crate::TxPvtData::filtered
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PvtNsCollFilter {
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl PvtNsCollFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a collection.
    pub fn add(&mut self, namespace: impl Into<String>, collection: impl Into<String>) {
        self.allowed
            .entry(namespace.into())
            .or_default()
            .insert(collection.into());
    }

    /// Returns `true` if the collection is allowed.
    pub fn has(&self, namespace: &str, collection: &str) -> bool {
        self.allowed
            .get(namespace)
            .is_some_and(|collections| collections.contains(collection))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Number of allowed pairs.
    pub fn len(&self) -> usize {
        self.allowed.values().map(BTreeSet::len).sum()
    }
}

impl<N, C> FromIterator<(N, C)> for PvtNsCollFilter
where
    N: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut filter = Self::new();
        for (namespace, collection) in iter {
            filter.add(namespace, collection);
        }
        filter
    }
}
