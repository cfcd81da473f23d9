use alloy::primitives::U256;
use multisig_error::{MultisigError, Result};
use serde::Serialize;
use std::fmt;
use std::ops;

/// Decimals assumed for the multisig token when none is configured.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Largest decimals value for which `10^decimals` fits in a U256.
pub const MAX_TOKEN_DECIMALS: u8 = 77;

/// A token quantity: the raw integer amount plus the decimals used to display it.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Serialize)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    /// Wraps a raw on-chain amount.
    pub fn from_raw(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Parses a decimal string such as `"12.5"` into the token's smallest unit.
    ///
    /// More fractional digits than `decimals` is an error, never a rounding.
    pub fn parse(input: &str, decimals: u8) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MultisigError::MissingField("amount".to_string()));
        }
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(MultisigError::InvalidAmount(format!(
                "unsupported token decimals {decimals}"
            )));
        }

        let (int_part, frac_part) = match input.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (input, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(input));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid(input));
        }
        if frac_part.len() > decimals as usize {
            return Err(MultisigError::InvalidAmount(format!(
                "'{input}' has more than {decimals} decimal places"
            )));
        }

        let mut raw = U256::ZERO;
        let padded = frac_part.to_string() + &"0".repeat(decimals as usize - frac_part.len());
        for digit in int_part.bytes().chain(padded.bytes()) {
            raw = raw
                .checked_mul(U256::from(10u8))
                .and_then(|v| v.checked_add(U256::from(digit - b'0')))
                .ok_or_else(|| MultisigError::AmountOverflow(format!("'{input}' does not fit in uint256")))?;
        }

        Ok(Self { raw, decimals })
    }

    /// Parses like [`TokenAmount::parse`] and rejects zero.
    pub fn parse_positive(input: &str, decimals: u8) -> Result<Self> {
        let amount = Self::parse(input, decimals)?;
        if amount.is_zero() {
            return Err(invalid(input.trim()));
        }
        Ok(amount)
    }

    /// The amount in the token's smallest unit
    pub fn raw(&self) -> U256 {
        self.raw
    }

    /// Decimals used for display
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// True when the amount is zero
    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn unit(&self) -> U256 {
        U256::from(10u8).pow(U256::from(self.decimals.min(MAX_TOKEN_DECIMALS)))
    }

    fn check_same_decimals(&self, other: &Self) -> Result<()> {
        if self.decimals != other.decimals {
            return Err(MultisigError::InvalidAmount(format!(
                "cannot combine amounts with {} and {} decimals",
                self.decimals, other.decimals
            )));
        }
        Ok(())
    }
}

fn invalid(input: &str) -> MultisigError {
    MultisigError::InvalidAmount(format!(
        "'{input}': please enter a valid amount greater than 0"
    ))
}

impl fmt::Display for TokenAmount {
    /// Renders without trailing zeros: `1500000000000000000` with 18 decimals is `1.5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let unit = self.unit();
        let whole = self.raw / unit;
        let frac = self.raw % unit;
        if frac.is_zero() {
            return write!(f, "{whole}");
        }
        let frac = format!("{:0>width$}", frac.to_string(), width = self.decimals.min(MAX_TOKEN_DECIMALS) as usize);
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl ops::Add<Self> for TokenAmount {
    type Output = Result<Self>;

    fn add(self, rhs: Self) -> Result<Self> {
        self.check_same_decimals(&rhs)?;
        Ok(Self {
            raw: self.raw.checked_add(rhs.raw).ok_or_else(|| {
                MultisigError::AmountOverflow(format!("adding {} to {}", rhs.raw, self.raw))
            })?,
            decimals: self.decimals,
        })
    }
}

impl ops::Sub for TokenAmount {
    type Output = Result<Self>;

    fn sub(self, rhs: Self) -> Result<Self> {
        self.check_same_decimals(&rhs)?;
        Ok(Self {
            raw: self.raw.checked_sub(rhs.raw).ok_or_else(|| {
                MultisigError::AmountOverflow(format!("subtracting {} from {}", rhs.raw, self.raw))
            })?,
            decimals: self.decimals,
        })
    }
}

/// Formats a raw amount with the given decimals.
pub fn format_units(raw: U256, decimals: u8) -> String {
    TokenAmount::from_raw(raw, decimals).to_string()
}
