//! Address validation and display helpers shared by the CLI and the
//! transaction views.

use alloy::primitives::Address;
use multisig_error::{MultisigError, Result};
use std::str::FromStr;

const INVALID_ADDRESS: &str = "Please enter a valid Ethereum address";

/// Parses a `0x`-prefixed 20-byte hex address.
///
/// All-lowercase and all-uppercase input is accepted as is. Mixed case must
/// carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address> {
    let input = input.trim();
    let invalid = |reason: &str| MultisigError::InvalidAddress {
        address: input.to_string(),
        reason: reason.to_string(),
    };

    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| invalid(INVALID_ADDRESS))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid(INVALID_ADDRESS));
    }

    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        let prefixed = format!("0x{hex}");
        return Address::parse_checksummed(&prefixed, None)
            .map_err(|_| invalid("checksum mismatch"));
    }

    Address::from_str(hex).map_err(|e| invalid(&e.to_string()))
}

/// True when `input` is a well-formed address.
pub fn is_valid_address(input: &str) -> bool {
    parse_address(input).is_ok()
}

/// `0x1234...abcd` form used in headers and lists.
pub fn short_address(address: &Address) -> String {
    truncate(&address.to_checksum(None), 6, 4)
}

/// `0x12345678...abcdef` form used in detail views.
pub fn long_short_address(address: &Address) -> String {
    truncate(&address.to_checksum(None), 10, 6)
}

fn truncate(s: &str, head: usize, tail: usize) -> String {
    if s.len() <= head + tail {
        return s.to_string();
    }
    format!("{}...{}", &s[..head], &s[s.len() - tail..])
}

/// Confirmations still needed before a transaction can execute.
pub fn remaining_confirmations(confirmations: u64, threshold: u64) -> u64 {
    threshold.saturating_sub(confirmations)
}

/// Confirmation progress as a percentage, capped at 100.
pub fn confirmation_progress(confirmations: u64, threshold: u64) -> f64 {
    if threshold == 0 {
        return 100.0;
    }
    (confirmations as f64 / threshold as f64 * 100.0).min(100.0)
}

/// Human-readable readiness line for a transaction.
pub fn readiness_label(confirmations: u64, threshold: u64, executed: bool) -> String {
    if executed {
        return "Executed".to_string();
    }
    match remaining_confirmations(confirmations, threshold) {
        0 => "Ready for execution".to_string(),
        1 => "Needs 1 more confirmation".to_string(),
        n => format!("Needs {n} more confirmations"),
    }
}

/// `2/3` style counter.
pub fn confirmation_ratio(confirmations: u64, threshold: u64) -> String {
    format!("{confirmations}/{threshold}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const MULTISIG: &str = "0x5168f18e89fdd2e88114870d2837c0e31170564a";

    #[test]
    fn test_parse_lowercase_and_checksummed() {
        let lower = parse_address(MULTISIG).unwrap();
        let checksummed = lower.to_checksum(None);
        assert_eq!(parse_address(&checksummed).unwrap(), lower);
        assert_eq!(parse_address(&format!("  {MULTISIG}\n")).unwrap(), lower);
        assert_eq!(parse_address(&MULTISIG.to_uppercase().replacen("0X", "0x", 1)).unwrap(), lower);
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut bad = parse_address(MULTISIG).unwrap().to_checksum(None);
        // flip the case of the first letter after the prefix
        let pos = bad[2..].find(|c: char| c.is_ascii_alphabetic()).unwrap() + 2;
        let flipped: String = bad[pos..pos + 1]
            .chars()
            .map(|c| if c.is_ascii_uppercase() { c.to_ascii_lowercase() } else { c.to_ascii_uppercase() })
            .collect();
        bad.replace_range(pos..pos + 1, &flipped);

        let err = parse_address(&bad).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "0x", "5168f18e89fdd2e88114870d2837c0e31170564a", "0x1234", "0xzz68f18e89fdd2e88114870d2837c0e31170564a"] {
            assert!(!is_valid_address(input), "{input:?} should be invalid");
        }
        let err = parse_address("0x1234").unwrap_err();
        assert!(err.to_string().contains("valid Ethereum address"));
    }

    #[test]
    fn test_short_forms() {
        let addr = address!("5168f18e89fdd2e88114870d2837c0e31170564a");
        let full = addr.to_checksum(None);
        let short = short_address(&addr);
        assert_eq!(short.len(), 6 + 3 + 4);
        assert!(short.starts_with(&full[..6]));
        assert!(short.ends_with(&full[38..]));

        let long = long_short_address(&addr);
        assert_eq!(long.len(), 10 + 3 + 6);
        assert!(long.ends_with(&full[36..]));
    }

    #[test]
    fn test_progress_and_labels() {
        assert_eq!(confirmation_progress(1, 2), 50.0);
        assert_eq!(confirmation_progress(5, 2), 100.0);
        assert_eq!(confirmation_progress(0, 0), 100.0);
        assert_eq!(remaining_confirmations(1, 3), 2);
        assert_eq!(remaining_confirmations(4, 3), 0);
        assert_eq!(readiness_label(1, 3, false), "Needs 2 more confirmations");
        assert_eq!(readiness_label(2, 3, false), "Needs 1 more confirmation");
        assert_eq!(readiness_label(3, 3, false), "Ready for execution");
        assert_eq!(readiness_label(0, 3, true), "Executed");
        assert_eq!(confirmation_ratio(2, 3), "2/3");
    }
}
