//! Duration strings in the `300ms` / `1.5h` / `2h45m` format
//!
//! Experiment durations and latency parameters are written by users as a
//! sequence of decimal numbers, each with an optional fraction and a unit
//! suffix. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
//! Negative values are rejected: an experiment cannot run for less than zero time.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while parsing a duration string
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    /// The input was empty or whitespace
    #[error("duration is empty")]
    Empty,

    /// The input started with a minus sign
    #[error("negative duration {0:?} is not allowed")]
    Negative(String),

    /// A number was not followed by a unit
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    /// The unit suffix is not recognized
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit {
        /// The unrecognized unit
        unit: String,
        /// The full input string
        input: String,
    },

    /// The input is not a well-formed duration
    #[error("invalid duration {0:?}")]
    Invalid(String),

    /// The duration does not fit in 64 bits of nanoseconds
    #[error("duration {0:?} is out of range")]
    Overflow(String),
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration string such as `"2s"`, `"100ms"` or `"1h30m"`.
///
/// `"0"` is the only value accepted without a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let s = match s.as_bytes()[0] {
        b'-' => return Err(DurationError::Negative(input.to_string())),
        b'+' => &s[1..],
        _ => s,
    };

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        // Integer part
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        // Optional fraction
        let (frac_digits, after_frac) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        // Unit runs until the next digit or '.'
        let unit_len = after_frac
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_frac.len());
        let (unit, tail) = after_frac.split_at(unit_len);

        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let overflow = || DurationError::Overflow(input.to_string());

        let int_value: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| overflow())?
        };
        let mut nanos = int_value.checked_mul(scale).ok_or_else(overflow)?;

        if !frac_digits.is_empty() {
            // Digits beyond nanosecond precision cannot contribute
            let frac_digits = &frac_digits[..frac_digits.len().min(18)];
            let frac_value: u128 = frac_digits.parse().map_err(|_| overflow())?;
            let divisor = 10u128.pow(frac_digits.len() as u32);
            nanos = nanos
                .checked_add(frac_value * scale / divisor)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > u64::MAX as u128 {
            return Err(overflow());
        }

        rest = tail;
    }

    Ok(Duration::from_nanos(total as u64))
}

/// Render a duration as whole seconds, rounding up, never below one second.
///
/// Tools such as `stress --timeout` only accept integral seconds.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
