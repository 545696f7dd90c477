use std::fmt;
use thiserror::Error;

/// Number of fractional digits carried by on-chain amounts.
pub const DECIMALS: u32 = 18;

const SCALE: u128 = 10u128.pow(DECIMALS);

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid character {0:?} in amount")]
    InvalidCharacter(char),
    #[error("amount has more than {DECIMALS} fractional digits")]
    TooPrecise,
    #[error("amount does not fit in 128 bits")]
    Overflow,
}

/// Token amount in minor units (18-decimal fixed point).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u128) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parses an integer string of minor units, as exchanged with the chain.
    pub fn from_minor_str(raw: &str) -> Result<Self, AmountError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AmountError::Empty);
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_digit()) {
            return Err(AmountError::InvalidCharacter(bad));
        }
        raw.parse::<u128>()
            .map(Self)
            .map_err(|_| AmountError::Overflow)
    }

    /// Parses a human decimal such as `"10"` or `"0.25"` without rounding.
    pub fn parse_decimal(raw: &str) -> Result<Self, AmountError> {
        let raw = raw.trim();
        let (whole, fraction) = match raw.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (raw, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::Empty);
        }
        if let Some(bad) = whole.chars().chain(fraction.chars()).find(|c| !c.is_ascii_digit())
        {
            return Err(AmountError::InvalidCharacter(bad));
        }
        if fraction.len() > DECIMALS as usize {
            return Err(AmountError::TooPrecise);
        }

        let whole = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| AmountError::Overflow)?
        };
        let fraction = if fraction.is_empty() {
            0
        } else {
            let padding = DECIMALS - fraction.len() as u32;
            fraction.parse::<u128>().map_err(|_| AmountError::Overflow)?
                * 10u128.pow(padding)
        };
        whole
            .checked_mul(SCALE)
            .and_then(|minor| minor.checked_add(fraction))
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    pub fn to_minor_string(self) -> String {
        self.0.to_string()
    }

    /// Decimal rendering with trailing fractional zeros trimmed.
    pub fn to_decimal_string(self) -> String {
        let whole = self.0 / SCALE;
        let fraction = self.0 % SCALE;
        if fraction == 0 {
            return whole.to_string();
        }
        let digits = format!("{fraction:018}");
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// Lossy conversion for display and comparisons only.
    pub fn as_f64(self) -> f64 {
        let whole = (self.0 / SCALE) as f64;
        let fraction = (self.0 % SCALE) as f64 / SCALE as f64;
        whole + fraction
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_decimal__whole_number__scales_to_minor_units() {
        // when
        let amount = Amount::parse_decimal("10").unwrap();

        // then
        assert_eq!(amount.to_minor_string(), "10000000000000000000");
    }

    #[test]
    fn parse_decimal__minor_string_round_trip__recovers_exact_value() {
        // given
        let minor = Amount::parse_decimal("10").unwrap().to_minor_string();

        // when
        let decoded = Amount::from_minor_str(&minor).unwrap();

        // then
        assert_eq!(decoded.as_f64(), 10.0);
        assert_eq!(decoded.to_decimal_string(), "10");
    }

    #[test]
    fn parse_decimal__fractional_input__keeps_every_digit() {
        let amount = Amount::parse_decimal("0.000000000000000001").unwrap();
        assert_eq!(amount.minor(), 1);

        let amount = Amount::parse_decimal(".5").unwrap();
        assert_eq!(amount.to_decimal_string(), "0.5");
    }

    #[test]
    fn parse_decimal__malformed_input__is_rejected() {
        assert_eq!(Amount::parse_decimal(""), Err(AmountError::Empty));
        assert_eq!(Amount::parse_decimal("."), Err(AmountError::Empty));
        assert_eq!(
            Amount::parse_decimal("-1"),
            Err(AmountError::InvalidCharacter('-'))
        );
        assert_eq!(
            Amount::parse_decimal("1.2.3"),
            Err(AmountError::InvalidCharacter('.'))
        );
        assert_eq!(
            Amount::parse_decimal("0.0000000000000000001"),
            Err(AmountError::TooPrecise)
        );
        assert_eq!(
            Amount::parse_decimal("999999999999999999999999999"),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn from_minor_str__non_digit__is_rejected() {
        assert_eq!(
            Amount::from_minor_str("0x10"),
            Err(AmountError::InvalidCharacter('x'))
        );
        assert_eq!(Amount::from_minor_str("  "), Err(AmountError::Empty));
    }

    proptest! {
        #[test]
        fn parse_decimal__formatted_amount__parses_back(minor in any::<u64>(), whole in 0u64..1_000_000) {
            let amount = Amount::from_minor(whole as u128 * SCALE + minor as u128 % SCALE);
            let reparsed = Amount::parse_decimal(&amount.to_decimal_string()).unwrap();
            prop_assert_eq!(amount, reparsed);
        }

        #[test]
        fn parse_decimal__integer_input__converts_exactly_to_f64(whole in 0u32..1_000_000) {
            let amount = Amount::parse_decimal(&whole.to_string()).unwrap();
            let decoded = Amount::from_minor_str(&amount.to_minor_string()).unwrap();
            prop_assert_eq!(decoded.as_f64(), whole as f64);
        }
    }
}
