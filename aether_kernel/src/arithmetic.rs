/// Cell value arithmetic.
///
/// The engines are generic over the cell value type. Fixed-width types
/// (`i32`, `i64`) use checked operations and report overflow instead of
/// wrapping; `BigInt` never overflows. Division is floor division toward
/// negative infinity for every type, so all instantiations agree on the
/// same seed.
use std::fmt::Debug;

use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

pub trait CellValue:
    Clone + Debug + PartialEq + Eq + PartialOrd + Ord + Send + Sync + 'static
{
    /// Name used in overflow errors.
    const TYPE_NAME: &'static str;

    fn zero() -> Self;

    fn is_zero(&self) -> bool;

    /// `None` if the value does not fit.
    fn from_bigint(value: &BigInt) -> Option<Self>;

    fn to_bigint(&self) -> BigInt;

    fn add_checked(&self, other: &Self) -> Option<Self>;

    fn sub_checked(&self, other: &Self) -> Option<Self>;

    fn mul_small_checked(&self, factor: u32) -> Option<Self>;

    /// Floor quotient and remainder for a positive divisor.
    /// The remainder is always in `[0, divisor)`.
    fn div_rem_floor(&self, divisor: u32) -> (Self, Self);
}

/// Values with a fixed little-endian encoding, storable in a file grid.
pub trait FixedWidthValue: CellValue + Copy {
    const WIDTH: usize;

    fn write_le(&self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! fixed_width_value {
    ($t:ty, $name:expr, $to:ident) => {
        impl CellValue for $t {
            const TYPE_NAME: &'static str = $name;

            fn zero() -> Self {
                0
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn from_bigint(value: &BigInt) -> Option<Self> {
                value.$to()
            }

            fn to_bigint(&self) -> BigInt {
                BigInt::from(*self)
            }

            fn add_checked(&self, other: &Self) -> Option<Self> {
                self.checked_add(*other)
            }

            fn sub_checked(&self, other: &Self) -> Option<Self> {
                self.checked_sub(*other)
            }

            fn mul_small_checked(&self, factor: u32) -> Option<Self> {
                let factor = <$t>::try_from(factor).ok()?;
                self.checked_mul(factor)
            }

            fn div_rem_floor(&self, divisor: u32) -> (Self, Self) {
                debug_assert!(divisor > 0);
                let divisor = divisor as $t;
                (self.div_euclid(divisor), self.rem_euclid(divisor))
            }
        }

        impl FixedWidthValue for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn write_le(&self, out: &mut [u8]) {
                out[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

fixed_width_value!(i32, "i32", to_i32);
fixed_width_value!(i64, "i64", to_i64);

impl CellValue for BigInt {
    const TYPE_NAME: &'static str = "BigInt";

    fn zero() -> Self {
        Zero::zero()
    }

    fn is_zero(&self) -> bool {
        Zero::is_zero(self)
    }

    fn from_bigint(value: &BigInt) -> Option<Self> {
        Some(value.clone())
    }

    fn to_bigint(&self) -> BigInt {
        self.clone()
    }

    fn add_checked(&self, other: &Self) -> Option<Self> {
        Some(self + other)
    }

    fn sub_checked(&self, other: &Self) -> Option<Self> {
        Some(self - other)
    }

    fn mul_small_checked(&self, factor: u32) -> Option<Self> {
        Some(self * factor)
    }

    fn div_rem_floor(&self, divisor: u32) -> (Self, Self) {
        debug_assert!(divisor > 0);
        let divisor = BigInt::from(divisor);
        // `/` and `%` truncate toward zero
        let quotient = self / &divisor;
        let remainder = self % &divisor;
        if remainder.sign() == Sign::Minus {
            (quotient - 1, remainder + divisor)
        } else {
            (quotient, remainder)
        }
    }
}

/// Binomial coefficient `C(n, k)` with overflow detection.
pub fn checked_binomial(n: u64, k: u64) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // exact at every step: result * (n - i) / (i + 1) == C(n, i + 1)
        result = result.checked_mul(u128::from(n - i))? / u128::from(i + 1);
        if result > u128::from(u64::MAX) {
            return None;
        }
    }
    u64::try_from(result).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division_agrees_across_types() {
        for value in [-3000i64, -7, -5, -1, 0, 1, 4, 5, 3001] {
            for divisor in [1u32, 3, 5, 7] {
                let (q64, r64) = value.div_rem_floor(divisor);
                let (qb, rb) = BigInt::from(value).div_rem_floor(divisor);
                assert_eq!(BigInt::from(q64), qb, "{} / {}", value, divisor);
                assert_eq!(BigInt::from(r64), rb, "{} % {}", value, divisor);
                assert!(r64 >= 0 && r64 < i64::from(divisor));
                assert_eq!(q64 * i64::from(divisor) + r64, value);
            }
        }
    }

    #[test]
    fn test_negative_floor_division() {
        assert_eq!((-3000i32).div_rem_floor(5), (-600, 0));
        assert_eq!((-7i32).div_rem_floor(5), (-2, 3));
        assert_eq!(BigInt::from(-7).div_rem_floor(5), (BigInt::from(-2), BigInt::from(3)));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(i32::MAX.add_checked(&1), None);
        assert_eq!(3i32.add_checked(&4), Some(7));
        assert_eq!(i64::MIN.sub_checked(&1), None);
    }

    #[test]
    fn test_checked_mul_overflow() {
        assert_eq!(i64::MAX.mul_small_checked(2), None);
        assert_eq!((-4i64).mul_small_checked(3), Some(-12));
        assert_eq!(5i32.mul_small_checked(u32::MAX), None);
    }

    #[test]
    fn test_from_bigint_range() {
        let big = BigInt::from(i64::MAX) + 1;
        assert_eq!(i64::from_bigint(&big), None);
        assert_eq!(i32::from_bigint(&BigInt::from(-3000)), Some(-3000));
        assert_eq!(BigInt::from_bigint(&big), Some(big.clone()));
    }

    #[test]
    fn test_fixed_width_encoding() {
        let mut buf = [0u8; 8];
        (-3000i64).write_le(&mut buf);
        assert_eq!(i64::read_le(&buf), -3000);
        let mut buf = [0u8; 4];
        i32::MIN.write_le(&mut buf);
        assert_eq!(i32::read_le(&buf), i32::MIN);
    }

    #[test]
    fn test_checked_binomial() {
        assert_eq!(checked_binomial(5, 2), Some(10));
        assert_eq!(checked_binomial(3, 5), Some(0));
        assert_eq!(checked_binomial(40, 20), Some(137_846_528_820));
        assert_eq!(checked_binomial(10, 0), Some(1));
        assert_eq!(checked_binomial(200, 100), None);
    }
}
