//! Presence snapshots.
//!
//! A [`PresenceSnapshot`] is the set of identities the status source
//! reported at one poll instant. Snapshots are immutable once captured; the
//! engine replaces its previous snapshot wholesale with the next one rather
//! than merging into it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::Identity;

/// The set of identities present at one poll instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot(BTreeSet<Identity>);

impl PresenceSnapshot {
    /// The empty snapshot (nobody present).
    pub const fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Identities present in `self` but absent from `previous`.
    ///
    /// Departures (present in `previous`, absent from `self`) are never
    /// reported.
    pub fn joined_since<'a>(
        &'a self,
        previous: &'a Self,
    ) -> impl Iterator<Item = &'a Identity> + 'a {
        self.0.difference(&previous.0)
    }

    /// Whether `identity` is present.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.0.contains(identity)
    }

    /// Number of identities present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nobody is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate identities in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.0.iter()
    }
}

impl FromIterator<Identity> for PresenceSnapshot {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PresenceSnapshot {
    type Item = &'a Identity;
    type IntoIter = std::collections::btree_set::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
