//! Fixed-point and fixed-width encoding helpers used to build contract call payloads.
//!
//! Decimal literals are scaled exactly: a literal that carries more significant fractional
//! digits than the requested precision is rejected instead of being rounded.

use alloy_core::primitives::{B256, I256, Sign, U256};

use crate::error::{Error, Result};

/// Decimals of the native token (wei).
pub const NATIVE_DECIMALS: u8 = 18;

/// Width of an EVM word in bytes.
pub const WORD_BYTES: usize = 32;

/// Scale a signed base-10 literal by `10^precision`.
///
/// Trailing zeros of the fractional part are not significant: `"0.100000"` is accepted at
/// precision 5.
pub fn scale_decimal(literal: &str, precision: u8) -> Result<I256> {
    let (sign, magnitude) = parse_fixed(literal, precision)?;
    I256::checked_from_sign_and_abs(sign, magnitude).ok_or_else(|| Error::InvalidLiteral {
        literal: literal.to_string(),
        reason: "value does not fit in a signed 256-bit integer".to_string(),
    })
}

/// Scale a non-negative amount to its integer representation with `decimals` digits.
pub fn to_unit(literal: &str, decimals: u8) -> Result<U256> {
    let (sign, magnitude) = parse_fixed(literal, decimals)?;
    if sign == Sign::Negative && !magnitude.is_zero() {
        return Err(Error::InvalidLiteral {
            literal: literal.to_string(),
            reason: "amount must not be negative".to_string(),
        });
    }
    Ok(magnitude)
}

/// Scale a native token amount to wei.
pub fn to_wei(literal: &str) -> Result<U256> {
    to_unit(literal, NATIVE_DECIMALS)
}

/// Render an integer amount with `decimals` digits back into a decimal literal.
///
/// The output always carries a fractional part (`"1.0"`, `"0.02"`).
pub fn format_units(value: U256, decimals: u8) -> String {
    let decimals = decimals as usize;
    let digits = value.to_string();
    let digits = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (integer, fraction) = digits.split_at(digits.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{integer}.0")
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Right-pad a hex string with `'0'` to exactly `byte_width` bytes.
///
/// A `0x`/`0X` prefix is preserved and does not count towards the width. Inputs that already
/// reach (or exceed) the width are returned unchanged.
///
/// This right-aligns short byte strings inside a slot, the convention for `bytesN` values.
/// Integers are left-padded instead.
pub fn right_pad_hex(value: &str, byte_width: usize) -> String {
    let prefix_len = if value.starts_with("0x") || value.starts_with("0X") {
        2
    } else {
        0
    };
    let target_len = byte_width * 2 + prefix_len;

    if value.len() >= target_len {
        return value.to_string();
    }

    let mut padded = String::with_capacity(target_len);
    padded.push_str(value);
    padded.push_str(&"0".repeat(target_len - value.len()));
    padded
}

/// Right-pad a hex string into a full 32-byte word and read it as an unsigned integer.
pub fn right_pad_word(value: &str) -> Result<U256> {
    let padded = right_pad_hex(value, WORD_BYTES);
    let digits = padded
        .strip_prefix("0x")
        .or_else(|| padded.strip_prefix("0X"))
        .unwrap_or(&padded);

    if digits.len() != WORD_BYTES * 2 {
        return Err(Error::InvalidLiteral {
            literal: value.to_string(),
            reason: format!("does not fit in {WORD_BYTES} bytes"),
        });
    }

    U256::from_str_radix(digits, 16).map_err(|e| Error::InvalidLiteral {
        literal: value.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a short UTF-8 string into a right-padded `bytes32`, leaving room for a terminator.
pub fn bytes32_string(value: &str) -> Result<B256> {
    let bytes = value.as_bytes();
    if bytes.len() > WORD_BYTES - 1 {
        return Err(Error::InvalidConfig(format!(
            "'{value}' is longer than {} bytes",
            WORD_BYTES - 1
        )));
    }

    let mut word = [0u8; WORD_BYTES];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(B256::from(word))
}

/// Split a literal into its sign and its magnitude scaled by `10^precision`.
fn parse_fixed(literal: &str, precision: u8) -> Result<(Sign, U256)> {
    let invalid = |reason: &str| Error::InvalidLiteral {
        literal: literal.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = literal.trim();
    let (sign, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (Sign::Negative, rest),
        None => (Sign::Positive, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (unsigned, ""),
    };

    if integer.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a base-10 number"));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > precision as usize {
        return Err(Error::PrecisionOverflow {
            literal: literal.to_string(),
            precision,
        });
    }

    let mut digits = String::with_capacity(integer.len() + precision as usize);
    digits.push_str(integer);
    digits.push_str(fraction);
    digits.push_str(&"0".repeat(precision as usize - fraction.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok((sign, U256::ZERO));
    }

    let magnitude = U256::from_str_radix(digits, 10)
        .map_err(|_| invalid("value does not fit in 256 bits"))?;
    Ok((sign, magnitude))
}
