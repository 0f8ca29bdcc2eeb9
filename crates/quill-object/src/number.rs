use tracing::warn;

/// Largest integer the format represents (32-bit signed on the wire).
pub const MAX_INTEGER: i64 = i32::MAX as i64;
/// Smallest integer the format represents.
pub const MIN_INTEGER: i64 = i32::MIN as i64;

/// Largest real magnitude the format represents (single-precision range).
pub const MAX_REAL: f64 = f32::MAX as f64;

/// Format an integer for output, clamping to the representable range.
///
/// Out-of-range magnitudes are clamped rather than overflowed silently; the
/// clamp is diagnosed, never hidden.
pub fn format_integer(value: i64) -> String {
    let clamped = value.clamp(MIN_INTEGER, MAX_INTEGER);
    if clamped != value {
        warn!(value, clamped, "integer outside representable range, clamping");
    }
    clamped.to_string()
}

/// Format a real for output.
///
/// NaN and infinite values serialize as `0` with a diagnostic. Finite values
/// are clamped to the representable magnitude and written in fixed decimal
/// notation with at most six fractional digits, trailing zeros trimmed.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        warn!(value, "non-finite real serialized as 0");
        return "0".to_string();
    }
    let clamped = if value > MAX_REAL {
        warn!(value, "real above representable range, clamping");
        MAX_REAL
    } else if value < -MAX_REAL {
        warn!(value, "real below representable range, clamping");
        -MAX_REAL
    } else {
        value
    };

    let mut s = format!("{clamped:.6}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_in_range_pass_through() {
        assert_eq!(format_integer(0), "0");
        assert_eq!(format_integer(-42), "-42");
        assert_eq!(format_integer(MAX_INTEGER), MAX_INTEGER.to_string());
    }

    #[test]
    fn integers_out_of_range_clamp() {
        assert_eq!(format_integer(MAX_INTEGER + 1), MAX_INTEGER.to_string());
        assert_eq!(format_integer(i64::MIN), MIN_INTEGER.to_string());
    }

    #[test]
    fn nan_and_infinity_become_zero() {
        assert_eq!(format_real(f64::NAN), "0");
        assert_eq!(format_real(f64::INFINITY), "0");
        assert_eq!(format_real(f64::NEG_INFINITY), "0");
    }

    #[test]
    fn trailing_zeros_are_trimmed() {
        assert_eq!(format_real(1.0), "1");
        assert_eq!(format_real(-0.5), "-0.5");
        assert_eq!(format_real(2.25), "2.25");
        assert_eq!(format_real(0.125), "0.125");
    }

    #[test]
    fn six_fractional_digits_max() {
        assert_eq!(format_real(0.123456789), "0.123457");
    }

    #[test]
    fn negative_zero_normalizes() {
        assert_eq!(format_real(-0.0), "0");
        assert_eq!(format_real(-0.0000001), "0");
    }

    proptest::proptest! {
        #[test]
        fn formatted_reals_parse_back_close(v in -1.0e6f64..1.0e6f64) {
            let s = format_real(v);
            let back: f64 = s.parse().unwrap();
            proptest::prop_assert!((back - v).abs() <= 1e-6);
        }
    }
}
