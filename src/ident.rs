//! Item identifier decoding.
//!
//! Feed items carry identifiers such as `t3_1abcde`: a fixed three character
//! kind tag followed by a base-36 encoded counter.  Decoding the suffix gives
//! a `u64` that grows monotonically with item age, which is what the poller
//! uses as its watermark.
//!
//! Only lowercase or uppercase ASCII alphanumerics are accepted.  Anything
//! else (including an empty suffix or a value that does not fit in 64 bits)
//! is reported as an [`IdError`] so the caller can skip the item.

use thiserror::Error;

/// Kind tag every relayable identifier starts with.
pub const ID_PREFIX: &str = "t3_";

const RADIX: u32 = 36;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier suffix is empty")]
    Empty,
    #[error("invalid base-36 digit {0:?}")]
    InvalidDigit(char),
    #[error("identifier {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// Return the encoded suffix of `raw` if it carries [`ID_PREFIX`].
pub fn split_prefixed(raw: &str) -> Option<&str> {
    raw.strip_prefix(ID_PREFIX)
}

/// Decode a base-36 suffix into its numeric value.
pub fn decode(suffix: &str) -> Result<u64, IdError> {
    if suffix.is_empty() {
        return Err(IdError::Empty);
    }

    suffix.chars().try_fold(0u64, |acc, c| {
        let digit = c.to_digit(RADIX).ok_or(IdError::InvalidDigit(c))?;
        acc.checked_mul(u64::from(RADIX))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| IdError::Overflow(suffix.to_string()))
    })
}
