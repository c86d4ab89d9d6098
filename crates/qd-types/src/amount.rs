//! Base-unit monetary amounts.
//!
//! All settlement math is done on arbitrary-precision unsigned integers of
//! the smallest currency unit (wei-equivalent). Amounts are persisted as
//! decimal `TEXT` columns and serialized as decimal strings — never as JSON
//! numbers, which silently lose precision past 2^53 in most clients.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// An unsigned base-unit amount.
///
/// `Amount` is deliberately closed over the operations settlement needs:
/// addition, checked subtraction, doubling, and basis-point scaling. There is
/// no division, no float conversion, and no silent overflow anywhere.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(BigUint);

/// Returned when a string is not a plain decimal base-unit integer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid base-unit amount: {0:?}")]
pub struct AmountParseError(pub String);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn from_u64(n: u64) -> Self {
        Self(BigUint::from(n))
    }

    /// Parse a decimal string of base units. Rejects signs, whitespace,
    /// hex prefixes, and empty input.
    pub fn parse(s: &str) -> Result<Self, AmountParseError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError(s.to_string()));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| AmountParseError(s.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// `self - other`, or `None` if the result would be negative.
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    /// `self × bps / 10_000`, floor division. Used for the platform fee cut.
    ///
    /// Callers must validate `bps <= 10_000`; `Settings::from_env` enforces
    /// this at boot so a fee can never exceed the pool it is cut from.
    pub fn mul_bps(&self, bps: u32) -> Amount {
        Amount(&self.0 * BigUint::from(bps) / BigUint::from(10_000u32))
    }

    /// `2 × self` — the gross pool of a two-sided stake, and the lifetime
    /// disbursement ceiling of a StakeRecord.
    pub fn double(&self) -> Amount {
        Amount(&self.0 * BigUint::from(2u32))
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Lowercase hex with `0x` prefix, as JSON-RPC quantity encoding wants.
    pub fn to_hex(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    /// Parse a `0x`-prefixed hex quantity (JSON-RPC responses).
    pub fn from_hex(s: &str) -> Result<Self, AmountParseError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AmountParseError(s.to_string()))?;
        if digits.is_empty() {
            return Err(AmountParseError(s.to_string()));
        }
        BigUint::parse_bytes(digits.as_bytes(), 16)
            .map(Self)
            .ok_or_else(|| AmountParseError(s.to_string()))
    }
}

impl From<BigUint> for Amount {
    fn from(v: BigUint) -> Self {
        Self(v)
    }
}

impl Add<&Amount> for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_str_radix(10))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for s in ["0", "1", "100000", "340282366920938463463374607431768211456"] {
            let a = Amount::parse(s).unwrap();
            assert_eq!(a.to_string(), s);
        }
    }

    #[test]
    fn parse_rejects_non_decimal_input() {
        for s in ["", "-1", "+1", "1.5", "0x10", " 7", "7 ", "1e9"] {
            assert!(Amount::parse(s).is_err(), "{s:?} must be rejected");
        }
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        let a = Amount::from_u64(5);
        let b = Amount::from_u64(7);
        assert_eq!(b.checked_sub(&a), Some(Amount::from_u64(2)));
        assert_eq!(a.checked_sub(&b), None);
    }

    #[test]
    fn mul_bps_floors() {
        // 999 * 300 / 10_000 = 29.97 → 29
        assert_eq!(Amount::from_u64(999).mul_bps(300), Amount::from_u64(29));
        assert_eq!(Amount::from_u64(0).mul_bps(300), Amount::zero());
        // 10_000 bps is the whole amount
        assert_eq!(Amount::from_u64(123).mul_bps(10_000), Amount::from_u64(123));
    }

    #[test]
    fn mul_bps_does_not_overflow_past_u128() {
        // 2^200-ish value scaled by bps must stay exact.
        let big = Amount::parse(
            "1606938044258990275541962092341162602522202993782792835301376",
        )
        .unwrap();
        let fee = big.mul_bps(300);
        let expected = Amount::parse(
            "48208141327769708266258862770234878075666089813483785059041",
        )
        .unwrap();
        assert_eq!(fee, expected);
    }

    #[test]
    fn hex_quantity_codec() {
        let a = Amount::from_u64(194_000);
        assert_eq!(a.to_hex(), "0x2f5d0");
        assert_eq!(Amount::from_hex("0x2f5d0").unwrap(), a);
        assert_eq!(Amount::from_hex("0x0").unwrap(), Amount::zero());
        assert!(Amount::from_hex("2f5d0").is_err());
        assert!(Amount::from_hex("0x").is_err());
        assert!(Amount::from_hex("0xzz").is_err());
    }

    #[test]
    fn serde_as_decimal_string() {
        let a = Amount::from_u64(200_000);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"200000\"");
        let back: Amount = serde_json::from_str("\"200000\"").unwrap();
        assert_eq!(back, a);
        assert!(serde_json::from_str::<Amount>("200000").is_err());
    }
}
