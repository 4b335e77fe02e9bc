use std::{
    fmt,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign},
    str::FromStr,
};

use ethers::types::U256;
use eyre::{eyre, Error, Result};
use fixed_point_macros::{fixed, uint256};
use rand::{
    distributions::{
        uniform::{SampleBorrow, SampleUniform, UniformSampler},
        Distribution, Standard,
    },
    Rng,
};

/// The number of decimals carried by a `FixedPoint`.
pub const DECIMALS: usize = 18;

/// The largest token precision that `from_units` and `to_units` accept.
pub const MAX_TOKEN_DECIMALS: u8 = 36;

/// An 18 decimal fixed point wrapper around the `U256` type from ethers-rs.
///
/// The arithmetic mirrors Solidity's FixedPointMath library, which is what the
/// fund contracts use to price shares. Token amounts with other precisions
/// (USDC has 6 decimals, WBTC has 8) are brought into this representation with
/// `from_units` before any math is done on them.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct FixedPoint(U256);

impl Default for FixedPoint {
    fn default() -> FixedPoint {
        fixed!(0)
    }
}

/// Formatting ///

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint({})", self.to_scaled_string(DECIMALS))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scaled_string(DECIMALS))
    }
}

/// Conversions ///

impl From<[u8; 32]> for FixedPoint {
    fn from(bytes: [u8; 32]) -> FixedPoint {
        U256::from(bytes).into()
    }
}

impl From<U256> for FixedPoint {
    fn from(u: U256) -> FixedPoint {
        FixedPoint(u)
    }
}

impl From<u128> for FixedPoint {
    fn from(u: u128) -> FixedPoint {
        FixedPoint(U256::from(u))
    }
}

impl From<FixedPoint> for U256 {
    fn from(f: FixedPoint) -> U256 {
        f.0
    }
}

impl TryFrom<FixedPoint> for u128 {
    type Error = Error;

    fn try_from(f: FixedPoint) -> Result<u128> {
        if f.0 > U256::from(u128::MAX) {
            return Err(eyre!("fixed-point: {} does not fit in a u128", f));
        }
        Ok(f.0.as_u128())
    }
}

/// Parses a human readable decimal number ("1.5", "2_000", "3e3") into its
/// 18 decimal representation.
impl FromStr for FixedPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<FixedPoint> {
        Ok(FixedPoint(parse_units(s, DECIMALS)?))
    }
}

/// Math ///

impl Add for FixedPoint {
    type Output = FixedPoint;

    fn add(self, other: FixedPoint) -> FixedPoint {
        FixedPoint(self.0 + other.0)
    }
}

impl AddAssign for FixedPoint {
    fn add_assign(&mut self, other: FixedPoint) {
        *self = *self + other;
    }
}

impl Sub for FixedPoint {
    type Output = FixedPoint;

    fn sub(self, other: FixedPoint) -> FixedPoint {
        FixedPoint(self.0 - other.0)
    }
}

impl SubAssign for FixedPoint {
    fn sub_assign(&mut self, other: FixedPoint) {
        *self = *self - other;
    }
}

/// The operator overloaded multiplication is the version that rounds down. A
/// `mul_up` function is also available.
impl Mul for FixedPoint {
    type Output = FixedPoint;

    fn mul(self, other: FixedPoint) -> FixedPoint {
        self.mul_down(other)
    }
}

impl MulAssign for FixedPoint {
    fn mul_assign(&mut self, other: FixedPoint) {
        *self = *self * other;
    }
}

/// The operator overloaded division is the version that rounds down. A
/// `div_up` function is also available.
impl Div for FixedPoint {
    type Output = FixedPoint;

    fn div(self, other: FixedPoint) -> FixedPoint {
        self.div_down(other)
    }
}

impl DivAssign for FixedPoint {
    fn div_assign(&mut self, other: FixedPoint) {
        *self = *self / other;
    }
}

impl FixedPoint {
    /// One whole unit, `1e18`.
    pub fn one() -> FixedPoint {
        fixed!(1e18)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_sub(self, other: FixedPoint) -> FixedPoint {
        FixedPoint(self.0.saturating_sub(other.0))
    }

    /// The absolute difference between two values.
    pub fn abs_diff(self, other: FixedPoint) -> FixedPoint {
        if self >= other {
            self - other
        } else {
            other - self
        }
    }

    pub fn mul_div_down(self, other: FixedPoint, divisor: FixedPoint) -> FixedPoint {
        FixedPoint((self.0 * other.0) / divisor.0)
    }

    pub fn mul_div_up(self, other: FixedPoint, divisor: FixedPoint) -> FixedPoint {
        let offset = (self.0 * other.0 % divisor.0 > U256::zero()) as u128;
        FixedPoint((self.0 * other.0) / divisor.0 + offset)
    }

    pub fn mul_down(self, other: FixedPoint) -> FixedPoint {
        self.mul_div_down(other, fixed!(1e18))
    }

    pub fn mul_up(self, other: FixedPoint) -> FixedPoint {
        self.mul_div_up(other, fixed!(1e18))
    }

    pub fn div_down(self, other: FixedPoint) -> FixedPoint {
        self.mul_div_down(fixed!(1e18), other)
    }

    pub fn div_up(self, other: FixedPoint) -> FixedPoint {
        self.mul_div_up(fixed!(1e18), other)
    }

    /// Token units ///

    /// Brings a raw token amount with `decimals` of precision into the 18
    /// decimal representation. Scaling up is exact; scaling down from tokens
    /// with more than 18 decimals rounds down.
    pub fn from_units(amount: U256, decimals: u8) -> Result<FixedPoint> {
        check_decimals(decimals)?;
        let decimals = decimals as usize;
        if decimals <= DECIMALS {
            amount
                .checked_mul(U256::exp10(DECIMALS - decimals))
                .map(FixedPoint)
                .ok_or_else(|| eyre!("fixed-point: {} overflows at {} decimals", amount, decimals))
        } else {
            Ok(FixedPoint(amount / U256::exp10(decimals - DECIMALS)))
        }
    }

    /// Converts back to a raw token amount with `decimals` of precision,
    /// rounding down.
    pub fn to_units(self, decimals: u8) -> Result<U256> {
        check_decimals(decimals)?;
        let decimals = decimals as usize;
        if decimals <= DECIMALS {
            Ok(self.0 / U256::exp10(DECIMALS - decimals))
        } else {
            self.0
                .checked_mul(U256::exp10(decimals - DECIMALS))
                .ok_or_else(|| eyre!("fixed-point: {} overflows at {} decimals", self, decimals))
        }
    }

    /// Renders the value as a percentage with two decimals, e.g. `0.995e18`
    /// becomes "99.50%".
    pub fn to_percentage_string(self) -> String {
        let basis_points = self.mul_down(fixed!(10_000e18)).0 / U256::exp10(DECIMALS);
        format!(
            "{}.{:02}%",
            basis_points / uint256!(100),
            (basis_points % uint256!(100)).low_u32()
        )
    }

    pub fn to_scaled_string(self, decimals: usize) -> String {
        let mut value = self.0;
        let mut digits = 0;
        let mut result = vec![];
        while value > uint256!(0) {
            if digits == decimals && decimals > 0 {
                result.push('.');
            }
            result.push(((value % uint256!(10)).low_u32() + 48) as u8 as char);
            value /= uint256!(10);
            digits += 1;
        }

        // Add leading zeros.
        if digits < decimals {
            result.resize(result.len() + decimals - digits, '0');
            digits += decimals - digits;
        }

        // Add the decimal point and leading zero.
        if digits == decimals {
            if decimals > 0 {
                result.push('.');
            }
            result.push('0');
        }

        result.iter().rev().collect()
    }
}

fn check_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(eyre!(
            "fixed-point: {} decimals exceeds the supported maximum of {}",
            decimals,
            MAX_TOKEN_DECIMALS
        ));
    }
    Ok(())
}

/// Literals ///

/// Parses an amount written in the same grammar the `uint256!` macro accepts
/// and scales it by `10^decimals`. `parse_units("1_000.5", 6)` is the raw
/// amount of 1000.5 USDC.
pub fn parse_units(s: &str, decimals: usize) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Err(eyre!("amount literal is empty"));
    }

    let mut found_dot = false;
    let mut found_e = false;
    let mut found_digit = false;
    let mut mantissa = U256::zero();
    let mut exponent = 0_usize;
    let mut fraction_digits = 0_usize;
    for c in s.chars() {
        match c {
            '0'..='9' => {
                let d = c as u8 - b'0';
                found_digit = true;
                if found_e {
                    exponent = exponent
                        .checked_mul(10)
                        .and_then(|e| e.checked_add(d as usize))
                        .ok_or_else(|| eyre!("exponent of {:?} is too large", s))?;
                } else {
                    mantissa = mantissa
                        .checked_mul(uint256!(10))
                        .and_then(|m| m.checked_add(U256::from(d)))
                        .ok_or_else(|| eyre!("amount literal {:?} overflows", s))?;
                    if found_dot {
                        fraction_digits += 1;
                    }
                }
            }
            '_' => {}
            'e' | 'E' if !found_e && found_digit => found_e = true,
            '.' if !found_dot && !found_e => found_dot = true,
            _ => return Err(eyre!("unexpected character {:?} in amount {:?}", c, s)),
        }
    }
    if !found_digit {
        return Err(eyre!("amount literal {:?} has no digits", s));
    }

    let exponent = exponent + decimals;
    if exponent < fraction_digits {
        return Err(eyre!(
            "amount {:?} has more fractional digits than {} decimals allow",
            s,
            decimals
        ));
    }
    let shift = exponent - fraction_digits;
    if shift > 77 {
        return Err(eyre!("amount literal {:?} overflows", s));
    }
    mantissa
        .checked_mul(U256::exp10(shift))
        .ok_or_else(|| eyre!("amount literal {:?} overflows", s))
}

/// Sampling ///

impl Distribution<FixedPoint> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> FixedPoint {
        FixedPoint(U256::from(rng.gen::<[u8; 32]>()))
    }
}

pub struct UniformFixedPoint {
    low: FixedPoint,
    high: FixedPoint,
}

impl SampleUniform for FixedPoint {
    type Sampler = UniformFixedPoint;
}

impl UniformSampler for UniformFixedPoint {
    type X = FixedPoint;

    #[inline]
    fn new<B1, B2>(low_b: B1, high_b: B2) -> Self
    where
        B1: SampleBorrow<Self::X> + Sized,
        B2: SampleBorrow<Self::X> + Sized,
    {
        let low = *low_b.borrow();
        let high = *high_b.borrow();
        if low >= high {
            panic!("UniformFixedPoint::new called with invalid range");
        }
        UniformFixedPoint { low, high }
    }

    #[inline]
    fn new_inclusive<B1, B2>(low_b: B1, high_b: B2) -> Self
    where
        B1: SampleBorrow<Self::X> + Sized,
        B2: SampleBorrow<Self::X> + Sized,
    {
        let low = *low_b.borrow();
        let high = *high_b.borrow();
        if low > high {
            panic!("UniformFixedPoint::new_inclusive called with invalid range");
        }
        UniformFixedPoint::new(low, high + FixedPoint::from(1))
    }

    #[inline]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> FixedPoint {
        let value = rng.gen::<FixedPoint>();
        let size: FixedPoint = self.high - self.low;
        let narrowed = FixedPoint::from(value.0 % size.0);
        narrowed + self.low
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use rand::{thread_rng, Rng};

    use super::*;

    const FUZZ_RUNS: usize = 10_000;

    #[test]
    fn test_fixed_point_fmt() {
        // fmt::Debug
        assert_eq!(
            format!("{:?}", fixed!(1)),
            "FixedPoint(0.000000000000000001)"
        );
        assert_eq!(
            format!("{:?}", fixed!(1.23456e18)),
            "FixedPoint(1.234560000000000000)"
        );

        // fmt::Display
        assert_eq!(format!("{}", fixed!(0)), "0.000000000000000000");
        assert_eq!(
            format!("{}", fixed!(50_000.234_56e18)),
            "50000.234560000000000000"
        );

        // Scaled to a token's precision.
        assert_eq!(fixed!(1_234_567).to_scaled_string(6), "1.234567");
        assert_eq!(fixed!(42).to_scaled_string(0), "42");
    }

    #[test]
    fn test_percentage_string() {
        assert_eq!(fixed!(0.995e18).to_percentage_string(), "99.50%");
        assert_eq!(fixed!(1e18).to_percentage_string(), "100.00%");
        assert_eq!(fixed!(0.000_01e18).to_percentage_string(), "0.00%");
        assert_eq!(fixed!(1.2345e18).to_percentage_string(), "123.45%");
    }

    #[test]
    fn test_rounding() {
        // 1 / 3 rounds down to ...333 and up to ...334.
        assert_eq!(
            fixed!(1e18).div_down(fixed!(3e18)),
            fixed!(333_333_333_333_333_333)
        );
        assert_eq!(
            fixed!(1e18).div_up(fixed!(3e18)),
            fixed!(333_333_333_333_333_334)
        );
        assert_eq!(fixed!(1.5e18) * fixed!(2e18), fixed!(3e18));
        assert_eq!(fixed!(1).mul_up(fixed!(1)), fixed!(1));
        assert_eq!(fixed!(1) * fixed!(1), fixed!(0));
    }

    #[test]
    fn test_division_by_zero_panics() {
        assert!(panic::catch_unwind(|| fixed!(1e18).mul_div_down(fixed!(1e18), 0.into())).is_err());
        assert!(panic::catch_unwind(|| fixed!(1e18).mul_div_up(fixed!(1e18), 0.into())).is_err());
        assert!(panic::catch_unwind(|| fixed!(1e18) / fixed!(0)).is_err());
    }

    #[test]
    fn test_from_units() -> Result<()> {
        // 1,000 USDC
        assert_eq!(
            FixedPoint::from_units(uint256!(1_000e6), 6)?,
            fixed!(1_000e18)
        );
        // 0.5 WBTC
        assert_eq!(FixedPoint::from_units(uint256!(0.5e8), 8)?, fixed!(0.5e18));
        // 18 decimal tokens are unchanged.
        assert_eq!(FixedPoint::from_units(uint256!(3e18), 18)?, fixed!(3e18));
        // More precise than 18 decimals rounds down.
        assert_eq!(FixedPoint::from_units(uint256!(19), 19)?, fixed!(1));
        assert!(FixedPoint::from_units(uint256!(1), 37).is_err());
        assert!(FixedPoint::from_units(U256::MAX, 6).is_err());
        Ok(())
    }

    #[test]
    fn test_to_units() -> Result<()> {
        assert_eq!(fixed!(1_000e18).to_units(6)?, uint256!(1_000e6));
        // Dust below the token's precision is dropped.
        assert_eq!(fixed!(1.000_000_9e18).to_units(6)?, uint256!(1e6));
        assert_eq!(fixed!(1).to_units(20)?, uint256!(100));
        Ok(())
    }

    #[test]
    fn test_parse_units() -> Result<()> {
        assert_eq!(parse_units("1000", 6)?, uint256!(1_000e6));
        assert_eq!(parse_units("1_000.5", 6)?, uint256!(1_000.5e6));
        assert_eq!(parse_units("2e3", 0)?, uint256!(2_000));
        assert_eq!(parse_units(" 0.05 ", 18)?, uint256!(0.05e18));
        assert_eq!("99.5".parse::<FixedPoint>()?, fixed!(99.5e18));

        assert!(parse_units("", 6).is_err());
        assert!(parse_units("abc", 6).is_err());
        assert!(parse_units("1.2.3", 6).is_err());
        assert!(parse_units("e5", 6).is_err());
        assert!(parse_units("0.0000001", 6).is_err());
        assert!(parse_units("1e80", 0).is_err());
        Ok(())
    }

    #[test]
    fn fuzz_mul_div_up_is_at_most_one_above_down() {
        let mut rng = thread_rng();
        for _ in 0..FUZZ_RUNS {
            let a = rng.gen_range(fixed!(0)..=fixed!(1_000_000_000e18));
            let b = rng.gen_range(fixed!(0)..=fixed!(1_000_000_000e18));
            let c = rng.gen_range(fixed!(1)..=fixed!(1_000_000_000e18));
            let down = a.mul_div_down(b, c);
            let up = a.mul_div_up(b, c);
            assert!(up >= down);
            assert!(up - down <= fixed!(1));
        }
    }

    #[test]
    fn fuzz_units_round_trip() -> Result<()> {
        let mut rng = thread_rng();
        for _ in 0..FUZZ_RUNS {
            let decimals = rng.gen_range(0..=18_u8);
            let amount = U256::from(rng.gen::<u128>());
            let fixed = FixedPoint::from_units(amount, decimals)?;
            assert_eq!(fixed.to_units(decimals)?, amount);
        }
        Ok(())
    }
}
