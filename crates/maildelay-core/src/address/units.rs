//! Delay unit letters.

use std::collections::BTreeMap;

use crate::{Error, Result};

/// Mapping from a single unit letter to a day multiplier.
///
/// Unit codes are lowercase ASCII letters and multipliers are positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayUnitTable {
    units: BTreeMap<char, u32>,
}

impl DelayUnitTable {
    /// Create a table from explicit entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table is empty, a unit is not a
    /// lowercase ASCII letter, or a multiplier is zero.
    pub fn new(units: BTreeMap<char, u32>) -> Result<Self> {
        if units.is_empty() {
            return Err(Error::Config("delay unit table is empty".into()));
        }
        for (&unit, &days) in &units {
            if !unit.is_ascii_lowercase() {
                return Err(Error::Config(format!(
                    "delay unit '{unit}' must be a lowercase ASCII letter"
                )));
            }
            if days == 0 {
                return Err(Error::Config(format!(
                    "delay unit '{unit}' has a zero multiplier"
                )));
            }
        }
        Ok(Self { units })
    }

    /// Day multiplier of a unit letter.
    #[must_use]
    pub fn multiplier(&self, unit: char) -> Option<u32> {
        self.units.get(&unit).copied()
    }

    /// All configured unit letters, in order.
    pub fn units(&self) -> impl Iterator<Item = char> + '_ {
        self.units.keys().copied()
    }

    /// Consume the table into its raw entries.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<char, u32> {
        self.units
    }

    /// Regex character class matching any configured unit, e.g. `[dmw]`.
    pub(crate) fn char_class(&self) -> String {
        let mut class = String::with_capacity(self.units.len() + 2);
        class.push('[');
        class.extend(self.units());
        class.push(']');
        class
    }
}

impl Default for DelayUnitTable {
    fn default() -> Self {
        Self {
            units: BTreeMap::from([('d', 1), ('w', 7), ('m', 30)]),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_units() {
        let table = DelayUnitTable::default();
        assert_eq!(table.multiplier('d'), Some(1));
        assert_eq!(table.multiplier('w'), Some(7));
        assert_eq!(table.multiplier('m'), Some(30));
        assert_eq!(table.multiplier('y'), None);
        assert_eq!(table.char_class(), "[dmw]");
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(DelayUnitTable::new(BTreeMap::new()).is_err());
        assert!(DelayUnitTable::new(BTreeMap::from([('D', 1)])).is_err());
        assert!(DelayUnitTable::new(BTreeMap::from([('.', 1)])).is_err());
        assert!(DelayUnitTable::new(BTreeMap::from([('h', 0)])).is_err());
        assert!(DelayUnitTable::new(BTreeMap::from([('y', 365)])).is_ok());
    }
}
