use ethers::types::U256;
use eyre::{eyre, Result};
use fixed_point::FixedPoint;
use fixed_point_macros::fixed;

use crate::{FundState, SECONDS_PER_YEAR};

impl FundState {
    /// The fraction of the fund owed as management fee for the time since
    /// the last collection.
    pub fn management_fee_fraction(&self, now: u64) -> FixedPoint {
        if now <= self.last_fee_collection {
            return fixed!(0);
        }
        let elapsed = U256::from(now - self.last_fee_collection);
        self.management_fee_rate.mul_div_down(
            FixedPoint::from(elapsed),
            FixedPoint::from(U256::from(SECONDS_PER_YEAR)),
        )
    }

    /// The shares minted to the fee recipient for the accrued management
    /// fee. The fee is taken by dilution: after minting `s` shares on a
    /// supply of `S`, the recipient owns `s / (S + s) = f` of the fund, so
    /// `s = S * f / (1 - f)`.
    pub fn accrued_management_fee_shares(&self, now: u64) -> Result<FixedPoint> {
        let fraction = self.management_fee_fraction(now);
        if fraction.is_zero() || self.total_supply.is_zero() {
            return Ok(fixed!(0));
        }
        if fraction >= FixedPoint::one() {
            return Err(eyre!(
                "management fee of {} exceeds the whole fund",
                fraction.to_percentage_string()
            ));
        }
        Ok(self
            .total_supply
            .mul_div_down(fraction, FixedPoint::one() - fraction))
    }

    /// Collects the management fee, returning the next state and the shares
    /// minted to the fee recipient.
    pub fn apply_management_fee(&self, now: u64) -> Result<(FundState, FixedPoint)> {
        let shares = self.accrued_management_fee_shares(now)?;
        let mut next = self.clone();
        next.total_supply += shares;
        next.last_fee_collection = next.last_fee_collection.max(now);
        Ok((next, shares))
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;

    #[test]
    fn test_no_fee_without_elapsed_time() -> Result<()> {
        let mut state = FundState::new(fixed!(1_000e18), fixed!(1_000e18));
        state.last_fee_collection = 1_000;
        assert_eq!(state.accrued_management_fee_shares(1_000)?, fixed!(0));
        assert_eq!(state.accrued_management_fee_shares(10)?, fixed!(0));
        Ok(())
    }

    #[test]
    fn test_one_year_of_fees() -> Result<()> {
        let state = FundState::new(fixed!(1_000e18), fixed!(1_000e18)).with_fees(100, 0)?;
        assert_eq!(state.management_fee_fraction(SECONDS_PER_YEAR), fixed!(0.01e18));

        let (next, shares) = state.apply_management_fee(SECONDS_PER_YEAR)?;
        // 1000 * 0.01 / 0.99
        assert_eq!(shares, fixed!(10.101010101010101010e18));
        assert_eq!(next.last_fee_collection, SECONDS_PER_YEAR);
        assert_eq!(next.nav, state.nav);
        // The recipient ends up with one percent of the fund.
        assert!(next.value_of(shares).abs_diff(fixed!(10e18)) <= fixed!(10));
        Ok(())
    }

    #[test]
    fn test_fee_fraction_of_whole_fund() -> Result<()> {
        let state = FundState::new(fixed!(1_000e18), fixed!(1_000e18)).with_fees(10_000, 0)?;
        assert!(state.accrued_management_fee_shares(SECONDS_PER_YEAR).is_err());
        Ok(())
    }

    #[test]
    fn fuzz_management_fee_dilution() -> Result<()> {
        let mut rng = thread_rng();
        for _ in 0..10_000 {
            let state = rng.gen::<FundState>();
            let now = rng.gen_range(60 * 60 * 24..=2 * SECONDS_PER_YEAR);
            let fraction = state.management_fee_fraction(now);
            let (next, shares) = state.apply_management_fee(now)?;
            let expected = state.nav.mul_down(fraction);
            let actual = next.value_of(shares);
            assert!(
                actual.abs_diff(expected) <= fixed!(1e9),
                "expected {} of fees, got {}",
                expected,
                actual
            );
        }
        Ok(())
    }
}
