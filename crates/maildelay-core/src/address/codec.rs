//! Parsing of delay-encoded addresses.
//!
//! A delay address looks like `3d.k4x9q2m7ab@example.org`: a number, a unit
//! letter from the [`DelayUnitTable`], a dot and a ten character correlation
//! key. The key is optional for the purpose of computing the delay.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::units::DelayUnitTable;
use crate::{Error, Result};

/// A recipient of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Email address.
    pub email: String,
    /// Display name, if the header carried one.
    #[serde(default)]
    pub name: Option<String>,
}

impl Recipient {
    /// Creates a recipient without display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }
}

/// Decoded delay address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelaySpec {
    /// Requested delay in days.
    pub delay_days: u32,
    /// Correlation key, if the address carried a well-formed one.
    pub key: Option<String>,
}

impl DelaySpec {
    /// When a message received at `received` becomes due.
    ///
    /// Returns `None` if the result is outside the representable range.
    #[must_use]
    pub fn due_at(&self, received: DateTime<Utc>) -> Option<DateTime<Utc>> {
        received.checked_add_signed(Duration::days(i64::from(self.delay_days)))
    }
}

/// Decoder for delay-encoded local-parts.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    units: DelayUnitTable,
    /// `<digits><letter>` at the start, unit checked against the table.
    prefix: Regex,
    /// `<digits><unit>` at the start, used to spot delay recipients.
    tagged: Regex,
    /// `<digits><unit>.<key>@`.
    keyed: Regex,
}

impl AddressCodec {
    /// Build a codec for the given unit table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the unit table cannot be turned into a
    /// pattern.
    pub fn new(units: DelayUnitTable) -> Result<Self> {
        let class = units.char_class();
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| Error::Config(e.to_string()));

        Ok(Self {
            prefix: compile(r"^([0-9]+)([A-Za-z])")?,
            tagged: compile(&format!(r"^[0-9]+{class}"))?,
            keyed: compile(&format!(r"^[0-9]+{class}\.([0-9a-z]{{10}})@"))?,
            units,
        })
    }

    /// The unit table this codec decodes against.
    #[must_use]
    pub const fn units(&self) -> &DelayUnitTable {
        &self.units
    }

    /// Decode the delay and correlation key of a delay address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDelay`] if the address does not start with
    /// `<digits><unit>`, the unit is unknown, or the delay overflows.
    pub fn decode_delay_spec(&self, address: &str) -> Result<DelaySpec> {
        let captures = self
            .prefix
            .captures(address)
            .ok_or_else(|| Error::InvalidDelay(format!("no delay prefix in '{address}'")))?;

        let amount: u32 = captures[1]
            .parse()
            .map_err(|_| Error::InvalidDelay(format!("delay amount too large in '{address}'")))?;
        let unit = captures[2].chars().next().unwrap_or_default();
        let multiplier = self
            .units
            .multiplier(unit)
            .ok_or_else(|| Error::InvalidDelay(format!("unknown delay unit '{unit}'")))?;
        let delay_days = amount
            .checked_mul(multiplier)
            .ok_or_else(|| Error::InvalidDelay(format!("delay too large in '{address}'")))?;

        let key = self.key_of(address);
        debug!(address, delay_days, has_key = key.is_some(), "Decoded delay address");

        Ok(DelaySpec { delay_days, key })
    }

    /// Correlation key of a delay address, if it carries a well-formed one.
    #[must_use]
    pub fn key_of(&self, address: &str) -> Option<String> {
        self.keyed
            .captures(address)
            .map(|captures| captures[1].to_string())
    }

    /// Whether an address starts with `<digits><unit>`.
    #[must_use]
    pub fn is_delay_address(&self, address: &str) -> bool {
        self.tagged.is_match(address)
    }

    /// Pick the delay addresses out of a recipient list, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDelayAddress`] if no recipient is a delay address.
    pub fn extract_delay_addresses(&self, recipients: &[Recipient]) -> Result<Vec<String>> {
        let addresses: Vec<String> = recipients
            .iter()
            .filter(|recipient| self.is_delay_address(&recipient.email))
            .map(|recipient| recipient.email.clone())
            .collect();

        if addresses.is_empty() {
            return Err(Error::NoDelayAddress);
        }
        Ok(addresses)
    }
}

impl Default for AddressCodec {
    #[allow(clippy::expect_used)] // the default unit table always compiles
    fn default() -> Self {
        Self::new(DelayUnitTable::default()).expect("default unit table is valid")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_decode_with_key() {
        let codec = AddressCodec::default();
        let spec = codec.decode_delay_spec("3d.abcdefgh23@rmd.io").unwrap();
        assert_eq!(spec.delay_days, 3);
        assert_eq!(spec.key.as_deref(), Some("abcdefgh23"));

        let spec = codec.decode_delay_spec("2w.k4x9q2m7ab@rmd.io").unwrap();
        assert_eq!(spec.delay_days, 14);

        let spec = codec.decode_delay_spec("1m.k4x9q2m7ab@rmd.io").unwrap();
        assert_eq!(spec.delay_days, 30);
    }

    #[test]
    fn test_decode_without_key() {
        let codec = AddressCodec::default();

        let spec = codec.decode_delay_spec("5d@rmd.io").unwrap();
        assert_eq!(spec.delay_days, 5);
        assert_eq!(spec.key, None);

        // Key must be exactly ten characters followed by '@'.
        let spec = codec.decode_delay_spec("5d.short@rmd.io").unwrap();
        assert_eq!(spec.key, None);
        let spec = codec.decode_delay_spec("5d.abcdefgh23").unwrap();
        assert_eq!(spec.key, None);
        let spec = codec.decode_delay_spec("5d.ABCDEFGH23@rmd.io").unwrap();
        assert_eq!(spec.key, None);
    }

    #[test]
    fn test_decode_invalid() {
        let codec = AddressCodec::default();
        for address in ["", "d3.abcdefgh23@rmd.io", "3.abc@rmd.io", "abc@rmd.io", "3@x"] {
            assert!(
                matches!(codec.decode_delay_spec(address), Err(Error::InvalidDelay(_))),
                "{address} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_unknown_unit() {
        let codec = AddressCodec::default();
        let err = codec.decode_delay_spec("3y.abcdefgh23@rmd.io").unwrap_err();
        assert!(matches!(err, Error::InvalidDelay(_)));
        let err = codec.decode_delay_spec("3D@rmd.io").unwrap_err();
        assert!(matches!(err, Error::InvalidDelay(_)));
    }

    #[test]
    fn test_decode_overflow() {
        let codec = AddressCodec::default();
        let err = codec.decode_delay_spec("99999999999d@rmd.io").unwrap_err();
        assert!(matches!(err, Error::InvalidDelay(_)));
        let err = codec.decode_delay_spec("4000000000m@rmd.io").unwrap_err();
        assert!(matches!(err, Error::InvalidDelay(_)));
    }

    #[test]
    fn test_custom_units() {
        let units = DelayUnitTable::new(BTreeMap::from([('y', 365), ('d', 1)])).unwrap();
        let codec = AddressCodec::new(units).unwrap();

        let spec = codec.decode_delay_spec("2y.abcdefgh23@rmd.io").unwrap();
        assert_eq!(spec.delay_days, 730);
        assert_eq!(spec.key.as_deref(), Some("abcdefgh23"));
        assert!(codec.decode_delay_spec("2w@rmd.io").is_err());
        assert!(!codec.is_delay_address("2w.abcdefgh23@rmd.io"));
    }

    #[test]
    fn test_due_at() {
        let received = Utc.with_ymd_and_hms(2024, 1, 30, 8, 0, 0).unwrap();
        let spec = DelaySpec {
            delay_days: 3,
            key: None,
        };
        assert_eq!(
            spec.due_at(received),
            Some(Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap())
        );

        let huge = DelaySpec {
            delay_days: u32::MAX,
            key: None,
        };
        assert_eq!(huge.due_at(received), None);
    }

    #[test]
    fn test_extract_empty() {
        let codec = AddressCodec::default();
        assert!(matches!(
            codec.extract_delay_addresses(&[]),
            Err(Error::NoDelayAddress)
        ));
    }

    #[test]
    fn test_extract_mixed() {
        let codec = AddressCodec::default();
        let recipients = vec![
            Recipient::new("alice@example.org"),
            Recipient::new("2w@rmd.io"),
            Recipient::new("bob.3d@example.org"),
        ];
        assert_eq!(
            codec.extract_delay_addresses(&recipients).unwrap(),
            vec!["2w@rmd.io".to_string()]
        );
    }

    #[test]
    fn test_extract_keeps_order() {
        let codec = AddressCodec::default();
        let recipients = vec![
            Recipient::new("1m.abcdefgh23@rmd.io"),
            Recipient::new("carol@example.org"),
            Recipient::new("4d@rmd.io"),
        ];
        assert_eq!(
            codec.extract_delay_addresses(&recipients).unwrap(),
            vec!["1m.abcdefgh23@rmd.io".to_string(), "4d@rmd.io".to_string()]
        );
    }

    #[test]
    fn test_extract_none_match() {
        let codec = AddressCodec::default();
        let recipients = vec![Recipient::new("alice@example.org"), Recipient::new("3y@rmd.io")];
        assert!(matches!(
            codec.extract_delay_addresses(&recipients),
            Err(Error::NoDelayAddress)
        ));
    }

    #[test]
    fn test_recipient_from_json() {
        let recipients: Vec<Recipient> =
            serde_json::from_str(r#"[{"email": "3d@rmd.io"}, {"email": "a@b.c", "name": "A"}]"#)
                .unwrap();
        assert_eq!(recipients[0], Recipient::new("3d@rmd.io"));
        assert_eq!(recipients[1].name.as_deref(), Some("A"));

        let missing: std::result::Result<Recipient, _> = serde_json::from_str(r#"{"name": "A"}"#);
        assert!(missing.is_err());
    }

    proptest! {
        #[test]
        fn prop_decode_valid(
            amount in 0u32..100_000,
            unit in prop::sample::select(vec!['d', 'w', 'm']),
            key in "[0-9a-z]{10}",
            domain in "[a-z]{1,12}\\.[a-z]{2,3}",
        ) {
            let codec = AddressCodec::default();
            let address = format!("{amount}{unit}.{key}@{domain}");
            let spec = codec.decode_delay_spec(&address).unwrap();
            let multiplier = codec.units().multiplier(unit).unwrap();
            prop_assert_eq!(spec.delay_days, amount * multiplier);
            prop_assert_eq!(spec.key, Some(key));
        }

        #[test]
        fn prop_decode_rejects_non_delay(local in "[a-zA-Z._-][a-zA-Z0-9._-]{0,20}") {
            let codec = AddressCodec::default();
            let address = format!("{local}@rmd.io");
            prop_assert!(matches!(
                codec.decode_delay_spec(&address),
                Err(Error::InvalidDelay(_))
            ));
        }
    }
}
