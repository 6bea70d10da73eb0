//! Lenient JSON field access for vendor payloads.
//!
//! Vendor payloads are untyped and routinely omit fields. These helpers
//! read by JSON pointer and treat missing or mistyped values as absent.

use serde_json::Value;

/// Non-negative integer at `pointer`, if present and numeric.
///
/// Integral floats (`120.0`) are accepted; fractional, negative or
/// out-of-range numbers are not.
pub(crate) fn count(value: &Value, pointer: &str) -> Option<u64> {
    let number = value.pointer(pointer)?;
    number.as_u64().or_else(|| number.as_f64().and_then(integral_f64))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn integral_f64(n: f64) -> Option<u64> {
    // 2^64 is exactly representable; anything below it fits after the checks.
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n < 18_446_744_073_709_551_616.0)
        .then_some(n as u64)
}

/// Non-negative integer at `pointer`, defaulting to zero.
pub(crate) fn count_or_zero(value: &Value, pointer: &str) -> u64 {
    count(value, pointer).unwrap_or(0)
}

/// Non-empty string at `pointer`.
pub(crate) fn non_empty_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Object at `pointer` with at least one key.
pub(crate) fn non_empty_object<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value
        .pointer(pointer)
        .filter(|v| v.as_object().is_some_and(|map| !map.is_empty()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
