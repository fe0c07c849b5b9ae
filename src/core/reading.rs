use std::collections::BTreeMap;

use crate::quantity::{cost::Cost, energy::KilowattHours};

/// Published per-account reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reading {
    /// Monotonic cumulative usage: the accumulated total plus the current raw counter.
    pub total: KilowattHours,

    /// Raw month-to-date counter as it came from the API.
    pub raw: KilowattHours,

    pub cost: Cost,
}

/// Readings of all the accounts from one poll cycle, keyed by account ID.
#[derive(Clone, Debug, Default, PartialEq, derive_more::Deref, derive_more::IntoIterator)]
pub struct Readings(#[into_iterator(owned, ref)] pub BTreeMap<String, Reading>);

impl FromIterator<(String, Reading)> for Readings {
    fn from_iter<I: IntoIterator<Item = (String, Reading)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
