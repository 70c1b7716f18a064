//! Baseline comparison of PCR register maps.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::measurement::RegisterMap;

/// One changed register.
///
/// `old` is empty when the register is new; `new` is empty when the
/// register disappeared from the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    /// Baseline value.
    pub old: String,
    /// Freshly attested value.
    pub new: String,
}

impl Difference {
    /// Create a difference entry.
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Changed registers keyed by PCR index, iterated in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifferenceSet(BTreeMap<u32, Difference>);

impl DifferenceSet {
    /// True if no register changed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of changed registers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Difference for one register.
    pub fn get(&self, index: u32) -> Option<&Difference> {
        self.0.get(&index)
    }

    /// Changed registers in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Difference)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Changed register indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        self.0.keys().copied().collect()
    }

    /// One `"<index>: <old> --> <new>"` line per changed register.
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn insert(&mut self, index: u32, difference: Difference) {
        self.0.insert(index, difference);
    }
}

impl fmt::Display for DifferenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diff) in self.iter() {
            writeln!(f, "{index}: {} --> {}", diff.old, diff.new)?;
        }
        Ok(())
    }
}

impl FromIterator<(u32, Difference)> for DifferenceSet {
    fn from_iter<I: IntoIterator<Item = (u32, Difference)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compare a baseline register map with a freshly attested one.
///
/// Every baseline register is looked up in `new`, defaulting to the empty
/// string, so a register that vanished is reported as a change to `""`.
/// Registers only present in `new` are reported with an empty old value.
/// Returns the differences and whether anything changed.
pub fn compare(old: &RegisterMap, new: &RegisterMap) -> (DifferenceSet, bool) {
    let mut differences = DifferenceSet::default();
    let mut visited = BTreeSet::new();

    for (index, old_value) in old {
        visited.insert(*index);
        let new_value = new.get(index).map(String::as_str).unwrap_or("");
        if new_value != old_value {
            differences.insert(*index, Difference::new(old_value.as_str(), new_value));
        }
    }

    for (index, new_value) in new {
        if !visited.contains(index) {
            differences.insert(*index, Difference::new("", new_value.as_str()));
        }
    }

    let changed = !differences.is_empty();
    (differences, changed)
}
