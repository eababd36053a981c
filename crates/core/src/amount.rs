use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::assets::AssetDescriptor;
use crate::errors::IntentError;

/// Integer amount in an asset's smallest unit. Travels on the wire as a
/// decimal string because solvers and contracts compare raw strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinorUnits(pub u128);

impl MinorUnits {
    pub const ZERO: Self = Self(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Outgoing leg of a token diff.
    pub fn negated(self) -> String {
        format!("-{}", self.0)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MinorUnits {
    type Err = IntentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(IntentError::InvalidAmount(format!(
                "`{raw}` is not a non-negative integer amount"
            )));
        }
        digits
            .parse::<u128>()
            .map(Self)
            .map_err(|_| IntentError::InvalidAmount(format!("`{raw}` overflows 128 bits")))
    }
}

impl Serialize for MinorUnits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MinorUnits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn require_positive(value: Decimal) -> Result<(), IntentError> {
    if value <= Decimal::ZERO {
        return Err(IntentError::InvalidAmount(format!("amount must be greater than 0, got {value}")));
    }
    Ok(())
}

/// Exact conversion; refuses to drop digits beyond `decimals`.
pub fn to_minor_units(amount: Decimal, decimals: u32) -> Result<MinorUnits, IntentError> {
    if amount < Decimal::ZERO {
        return Err(IntentError::InvalidAmount(format!("amount must not be negative, got {amount}")));
    }

    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > decimals {
        return Err(IntentError::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }

    let mantissa = u128::try_from(normalized.mantissa())
        .map_err(|_| IntentError::InvalidAmount(format!("{amount} is not representable")))?;
    10_u128
        .checked_pow(decimals - scale)
        .and_then(|factor| mantissa.checked_mul(factor))
        .map(MinorUnits)
        .ok_or_else(|| {
            IntentError::InvalidAmount(format!("{amount} overflows at {decimals} decimals"))
        })
}

pub fn from_minor_units(units: MinorUnits, decimals: u32) -> Result<Decimal, IntentError> {
    let value = i128::try_from(units.0)
        .map_err(|_| IntentError::InvalidAmount(format!("{units} is too large to display")))?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .map(|decimal| decimal.normalize())
        .map_err(|error| {
            IntentError::InvalidAmount(format!("{units} at {decimals} decimals: {error}"))
        })
}

/// Display formatting that works for any `u128`, including balances that do
/// not fit a 96-bit decimal mantissa.
pub fn format_minor_units(units: MinorUnits, decimals: u32) -> String {
    let digits = units.0.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{digits}", "0".repeat(decimals + 1 - digits.len()))
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// A decimal value bound to its asset, with the minor-unit form precomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Amount {
    pub asset: AssetDescriptor,
    pub value: Decimal,
    pub units: MinorUnits,
}

impl Amount {
    pub fn new(asset: &AssetDescriptor, value: Decimal) -> Result<Self, IntentError> {
        let units = to_minor_units(value, asset.decimals)?;
        Ok(Self { asset: asset.clone(), value, units })
    }

    pub fn positive(asset: &AssetDescriptor, value: Decimal) -> Result<Self, IntentError> {
        require_positive(value)?;
        Self::new(asset, value)
    }

    pub fn from_units(asset: &AssetDescriptor, units: MinorUnits) -> Result<Self, IntentError> {
        let value = from_minor_units(units, asset.decimals)?;
        Ok(Self { asset: asset.clone(), value, units })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value.normalize(), self.asset.symbol)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{format_minor_units, from_minor_units, to_minor_units, Amount, MinorUnits};
    use crate::assets::AssetRegistry;
    use crate::errors::IntentError;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("valid decimal literal")
    }

    #[test]
    fn converts_to_minor_units_exactly() {
        assert_eq!(to_minor_units(dec("1.0"), 6).expect("usdc"), MinorUnits(1_000_000));
        assert_eq!(to_minor_units(dec("0.01"), 24).expect("near").to_string(), "10000000000000000000000");
        assert_eq!(to_minor_units(dec("12.34567800"), 8).expect("zec"), MinorUnits(1_234_567_800));
    }

    #[test]
    fn rejects_precision_beyond_decimals() {
        let error = to_minor_units(dec("1.0000001"), 6).expect_err("7 dp at 6 decimals");
        assert!(matches!(error, IntentError::InvalidAmount(ref message) if message.contains("decimal places")));
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(matches!(to_minor_units(dec("-1"), 6), Err(IntentError::InvalidAmount(_))));
    }

    #[test]
    fn positive_amount_requires_value_above_zero() {
        let registry = AssetRegistry::default();
        let usdc = registry.resolve("USDC").expect("usdc");

        assert!(matches!(Amount::positive(usdc, Decimal::ZERO), Err(IntentError::InvalidAmount(_))));
        let amount = Amount::positive(usdc, dec("2.5")).expect("positive");
        assert_eq!(amount.units, MinorUnits(2_500_000));
        assert_eq!(amount.to_string(), "2.5 USDC");
    }

    #[test]
    fn round_trips_for_values_representable_at_precision() {
        for (raw, decimals) in [("1", 6), ("0.000001", 6), ("123.456", 8), ("0.5", 24), ("42", 0)] {
            let value = dec(raw);
            let units = to_minor_units(value, decimals).expect("representable");
            assert_eq!(from_minor_units(units, decimals).expect("inverse"), value, "{raw}@{decimals}");
        }
    }

    #[test]
    fn formats_arbitrarily_large_balances() {
        let units = MinorUnits(123_456_789_000_000_000_000_000_000_000_000);
        assert_eq!(format_minor_units(units, 24), "123456789");
        assert_eq!(format_minor_units(MinorUnits(1_500_000), 6), "1.5");
        assert_eq!(format_minor_units(MinorUnits(7), 3), "0.007");
        assert_eq!(format_minor_units(MinorUnits::ZERO, 6), "0");
    }

    #[test]
    fn parses_wire_strings() {
        assert_eq!(MinorUnits::from_str("500000000").expect("digits"), MinorUnits(500_000_000));
        assert_eq!(MinorUnits::from_str("+25").expect("signed"), MinorUnits(25));
        assert!(MinorUnits::from_str("-1").is_err());
        assert!(MinorUnits::from_str("1.5").is_err());
        assert_eq!(MinorUnits(9).negated(), "-9");

        let json = serde_json::to_string(&MinorUnits(1_000)).expect("serialize");
        assert_eq!(json, "\"1000\"");
    }
}
