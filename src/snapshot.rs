//! Snapshot loading: the address → amount allocation driving the airdrop

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, info};

use crate::error::{AirdropError, AirdropResult};

/// One recipient and the amount allocated to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub address: Address,
    pub amount: U256,
}

/// Immutable, ordered allocation list. Order is the order of keys in the file.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    allocations: Vec<Allocation>,
}

/// Raw JSON object entries in document order, duplicates included.
/// `serde_json::Map` would silently keep only the last duplicate. Values stay
/// as source text so integers wider than 64 bits keep every digit.
struct RawEntries(Vec<(String, Box<RawValue>)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object mapping addresses to amounts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Box<RawValue>>()? {
                    entries.push((key, value));
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Snapshot {
    /// Read and validate a snapshot file. Any bad entry fails the whole load.
    pub fn load<P: AsRef<Path>>(path: P) -> AirdropResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AirdropError::MalformedSnapshot(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let snapshot = Self::from_json_str(&content)?;
        info!(
            "Loaded snapshot {} with {} recipients, {} total units allocated",
            path.display(),
            snapshot.len(),
            snapshot.total_amount()
        );
        Ok(snapshot)
    }

    pub fn from_json_str(content: &str) -> AirdropResult<Self> {
        let RawEntries(entries) = serde_json::from_str(content)
            .map_err(|e| AirdropError::MalformedSnapshot(format!("Invalid JSON object: {}", e)))?;

        let mut seen = HashSet::with_capacity(entries.len());
        let mut allocations = Vec::with_capacity(entries.len());

        for (index, (key, value)) in entries.iter().enumerate() {
            let address = parse_address(key).map_err(|reason| {
                AirdropError::MalformedSnapshot(format!("Entry #{} ('{}'): {}", index, key, reason))
            })?;
            let amount = parse_amount(value).map_err(|reason| {
                AirdropError::MalformedSnapshot(format!("Entry #{} ({}): {}", index, address, reason))
            })?;

            if !seen.insert(address) {
                return Err(AirdropError::MalformedSnapshot(format!(
                    "Entry #{}: duplicate address {}",
                    index, address
                )));
            }

            allocations.push(Allocation { address, amount });
        }

        debug!("Parsed {} snapshot entries", allocations.len());
        Ok(Self { allocations })
    }

    pub fn from_allocations(allocations: Vec<Allocation>) -> AirdropResult<Self> {
        let mut seen = HashSet::with_capacity(allocations.len());
        for allocation in &allocations {
            if !seen.insert(allocation.address) {
                return Err(AirdropError::MalformedSnapshot(format!(
                    "duplicate address {}",
                    allocation.address
                )));
            }
        }
        Ok(Self { allocations })
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.allocations.iter().map(|a| a.address).collect()
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn total_amount(&self) -> U256 {
        self.allocations
            .iter()
            .fold(U256::ZERO, |acc, a| acc.saturating_add(a.amount))
    }
}

/// Strict account identifier check: `0x` + 40 hex digits, EIP-55 checksum
/// enforced when the digits are mixed-case, zero address refused.
fn parse_address(raw: &str) -> Result<Address, String> {
    let hex_part = raw
        .strip_prefix("0x")
        .ok_or_else(|| "address must start with 0x".to_string())?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("address must be 40 hexadecimal characters".to_string());
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());

    let address = if has_lower && has_upper {
        Address::parse_checksummed(raw, None).map_err(|e| format!("bad checksum: {}", e))?
    } else {
        Address::from_str(raw).map_err(|e| e.to_string())?
    };

    if address == Address::ZERO {
        return Err("zero address is not a valid recipient".to_string());
    }

    Ok(address)
}

fn parse_amount(raw: &RawValue) -> Result<U256, String> {
    let text = raw.get().trim();

    if text.starts_with('"') {
        let s: String = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(format!("negative amount {}", trimmed));
        }
        return parse_decimal(trimmed).ok_or_else(|| format!("amount '{}' is not a decimal integer", s))?;
    }

    match text.chars().next() {
        Some('-') => Err(format!("negative amount {}", text)),
        Some(c) if c.is_ascii_digit() => {
            parse_decimal(text).ok_or_else(|| format!("amount {} is not an integer", text))?
        }
        _ => Err(format!("amount must be an integer, got {}", text)),
    }
}

/// `None` unless `digits` is a plain base-10 integer
fn parse_decimal(digits: &str) -> Option<Result<U256, String>> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(U256::from_str_radix(digits, 10).map_err(|e| format!("amount {}: {}", digits, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";
    const C: &str = "0x3333333333333333333333333333333333333333";

    #[test]
    fn test_preserves_file_order() {
        let content = format!(r#"{{"{C}": 1, "{A}": 2, "{B}": 3}}"#);
        let snapshot = Snapshot::from_json_str(&content).unwrap();

        let addresses: Vec<Address> = snapshot.addresses();
        assert_eq!(
            addresses,
            vec![C.parse::<Address>().unwrap(), A.parse::<Address>().unwrap(), B.parse::<Address>().unwrap()]
        );
        assert_eq!(snapshot.total_amount(), U256::from(6));
    }

    #[test]
    fn test_large_amount_as_string() {
        let content = format!(r#"{{"{A}": "1000000000000000000000000"}}"#);
        let snapshot = Snapshot::from_json_str(&content).unwrap();

        assert_eq!(
            snapshot.allocations()[0].amount,
            U256::from_str_radix("1000000000000000000000000", 10).unwrap()
        );
    }

    #[test]
    fn test_amount_wider_than_u64() {
        let content = format!(r#"{{"{A}": 18446744073709551616, "{B}": 340282366920938463463374607431768211456}}"#);
        let snapshot = Snapshot::from_json_str(&content).unwrap();

        assert_eq!(snapshot.allocations()[0].amount, U256::from(u64::MAX) + U256::from(1));
        assert_eq!(snapshot.allocations()[1].amount, U256::from(u128::MAX) + U256::from(1));
    }

    #[test]
    fn test_amount_beyond_uint256_rejected() {
        let too_big = format!("1{}", "0".repeat(78));
        let content = format!(r#"{{"{A}": {too_big}}}"#);

        assert!(Snapshot::from_json_str(&content).is_err());
    }

    #[test]
    fn test_non_numeric_amount_rejected() {
        for bad in ["true", "null", "[1]", r#""1e3""#, r#""-5""#, "1e3"] {
            let content = format!(r#"{{"{A}": {bad}}}"#);
            assert!(Snapshot::from_json_str(&content).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_negative_amount_rejected() {
        let content = format!(r#"{{"{A}": 1, "{B}": -1}}"#);
        let err = Snapshot::from_json_str(&content).unwrap_err();

        assert!(matches!(err, AirdropError::MalformedSnapshot(ref msg) if msg.contains("negative")));
    }

    #[test]
    fn test_fractional_amount_rejected() {
        let content = format!(r#"{{"{A}": 1.5}}"#);
        assert!(Snapshot::from_json_str(&content).is_err());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let content = format!(r#"{{"{A}": 1, "{B}": 1, "{A}": 2}}"#);
        let err = Snapshot::from_json_str(&content).unwrap_err();

        assert!(matches!(err, AirdropError::MalformedSnapshot(ref msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_duplicate_differing_only_in_case_rejected() {
        let upper = format!("0x{}", "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        let lower = upper.to_lowercase();
        let content = format!(r#"{{"{upper}": 1, "{lower}": 1}}"#);

        assert!(Snapshot::from_json_str(&content).is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        for bad in ["0x1234", "1111111111111111111111111111111111111111", "0xZZ11111111111111111111111111111111111111"] {
            let content = format!(r#"{{"{bad}": 1}}"#);
            assert!(Snapshot::from_json_str(&content).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // valid checksum form is 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed
        let good = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        let bad = "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

        assert!(Snapshot::from_json_str(&format!(r#"{{"{good}": 1}}"#)).is_ok());
        assert!(Snapshot::from_json_str(&format!(r#"{{"{bad}": 1}}"#)).is_err());
    }

    #[test]
    fn test_zero_address_rejected() {
        let content = format!(r#"{{"0x{}": 1}}"#, "0".repeat(40));
        assert!(Snapshot::from_json_str(&content).is_err());
    }

    #[test]
    fn test_not_an_object_rejected() {
        assert!(Snapshot::from_json_str("[1, 2, 3]").is_err());
        assert!(Snapshot::from_json_str("not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Snapshot::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, AirdropError::MalformedSnapshot(_)));
    }
}
