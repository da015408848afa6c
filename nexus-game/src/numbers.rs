//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round a f64 and clamp it to the i32 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_i32(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let min = cast::<i32, f64>(i32::MIN).unwrap_or(f64::MIN);
    let max = cast::<i32, f64>(i32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i32>(clamped).unwrap_or(0)
}

/// Round a f64 and clamp it to the i64 range, returning 0 for non-finite values.
#[must_use]
pub fn round_f64_to_i64(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i64>(clamped).unwrap_or(0)
}

/// Round a f64 into the u32 range; negative and NaN values become 0.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    let max = f64::from(u32::MAX);
    cast::<f64, u32>(value.min(max).round()).unwrap_or(u32::MAX)
}

/// Ceil a f64 and clamp it to the i32 range, returning 0 for non-finite values.
#[must_use]
pub fn ceil_f64_to_i32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let min = f64::from(i32::MIN);
    let max = f64::from(i32::MAX);
    cast::<f64, i32>(value.clamp(min, max).ceil()).unwrap_or(0)
}

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounders_cover_ranges() {
        assert_eq!(round_f64_to_i32(1.6), 2);
        assert_eq!(round_f64_to_i32(f64::NAN), 0);
        assert_eq!(round_f64_to_i32(f64::from(i32::MAX) * 2.0), i32::MAX);
        assert_eq!(round_f64_to_i64(f64::INFINITY), 0);
        assert_eq!(round_f64_to_i64(-2.5), -3);
    }

    #[test]
    fn unsigned_rounding_floors_at_zero() {
        assert_eq!(round_f64_to_u32(-4.2), 0);
        assert_eq!(round_f64_to_u32(f64::NAN), 0);
        assert_eq!(round_f64_to_u32(49.5), 50);
    }

    #[test]
    fn ceil_clamps_and_handles_nan() {
        assert_eq!(ceil_f64_to_i32(22.5), 23);
        assert_eq!(ceil_f64_to_i32(15.0), 15);
        assert_eq!(ceil_f64_to_i32(f64::NAN), 0);
    }
}
