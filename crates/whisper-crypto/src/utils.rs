//! Constant-time comparison helpers for secret-derived values.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices without leaking where they differ.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Returns `true` when every byte of `value` is zero, in constant time.
pub fn is_all_zero<const N: usize>(value: &[u8; N]) -> bool {
    constant_time_eq(value, &[0u8; N])
}
