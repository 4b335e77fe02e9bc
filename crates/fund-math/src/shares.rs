use eyre::{eyre, Result};
use fixed_point::FixedPoint;

use crate::FundState;

/// The steps of an investment, for showing the work behind a preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvestmentBreakdown {
    pub usdc_in: FixedPoint,
    pub share_price: FixedPoint,
    pub shares_out: FixedPoint,
    pub nav_after: FixedPoint,
    pub supply_after: FixedPoint,
}

/// The steps of a redemption, for showing the work behind a preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionBreakdown {
    pub shares_in: FixedPoint,
    pub share_price: FixedPoint,
    pub gross: FixedPoint,
    pub fee: FixedPoint,
    pub usdc_out: FixedPoint,
    pub nav_after: FixedPoint,
    pub supply_after: FixedPoint,
}

impl FundState {
    /// Calculates the shares minted for a USDC investment. Shares are issued
    /// at the current share price and round down in the fund's favor.
    pub fn shares_for_investment(&self, usdc: FixedPoint) -> Result<FixedPoint> {
        if usdc.is_zero() {
            return Err(eyre!("investment amount must be greater than zero"));
        }
        if usdc < self.minimum_investment {
            return Err(eyre!(
                "investment of {} USDC is below the minimum of {} USDC",
                usdc,
                self.minimum_investment
            ));
        }
        if self.total_supply.is_zero() || self.nav.is_zero() {
            return Ok(usdc);
        }
        Ok(usdc.mul_div_down(self.total_supply, self.nav))
    }

    /// The USDC value of shares before the redemption fee.
    pub fn gross_redemption_value(&self, shares: FixedPoint) -> Result<FixedPoint> {
        if shares.is_zero() {
            return Err(eyre!("redemption amount must be greater than zero"));
        }
        if shares > self.total_supply {
            return Err(eyre!(
                "cannot redeem {} shares from a supply of {}",
                shares,
                self.total_supply
            ));
        }
        Ok(shares.mul_div_down(self.nav, self.total_supply))
    }

    /// The fee kept by the fund on a gross redemption. Rounds up.
    pub fn redemption_fee(&self, gross: FixedPoint) -> FixedPoint {
        gross.mul_up(self.redemption_fee_rate).min(gross)
    }

    /// The USDC paid out for redeeming shares.
    pub fn redemption_value(&self, shares: FixedPoint) -> Result<FixedPoint> {
        let gross = self.gross_redemption_value(shares)?;
        Ok(gross - self.redemption_fee(gross))
    }

    /// Applies an investment, returning the next state and the shares minted.
    pub fn apply_investment(&self, usdc: FixedPoint) -> Result<(FundState, FixedPoint)> {
        let shares = self.shares_for_investment(usdc)?;
        let mut next = self.clone();
        next.nav += usdc;
        next.total_supply += shares;
        Ok((next, shares))
    }

    /// Applies a redemption, returning the next state and the USDC paid out.
    /// The redemption fee stays in the fund.
    pub fn apply_redemption(&self, shares: FixedPoint) -> Result<(FundState, FixedPoint)> {
        let usdc = self.redemption_value(shares)?;
        let mut next = self.clone();
        next.nav -= usdc;
        next.total_supply -= shares;
        Ok((next, usdc))
    }

    pub fn explain_investment(&self, usdc: FixedPoint) -> Result<InvestmentBreakdown> {
        let (next, shares_out) = self.apply_investment(usdc)?;
        Ok(InvestmentBreakdown {
            usdc_in: usdc,
            share_price: self.share_price(),
            shares_out,
            nav_after: next.nav,
            supply_after: next.total_supply,
        })
    }

    pub fn explain_redemption(&self, shares: FixedPoint) -> Result<RedemptionBreakdown> {
        let gross = self.gross_redemption_value(shares)?;
        let fee = self.redemption_fee(gross);
        let (next, usdc_out) = self.apply_redemption(shares)?;
        Ok(RedemptionBreakdown {
            shares_in: shares,
            share_price: self.share_price(),
            gross,
            fee,
            usdc_out,
            nav_after: next.nav,
            supply_after: next.total_supply,
        })
    }
}

#[cfg(test)]
mod tests {
    use fixed_point_macros::fixed;
    use rand::{thread_rng, Rng};

    use super::*;

    const FUZZ_RUNS: usize = 10_000;

    #[test]
    fn test_first_investment_is_at_par() -> Result<()> {
        let state = FundState::default();
        let (next, shares) = state.apply_investment(fixed!(1_000e18))?;
        assert_eq!(shares, fixed!(1_000e18));
        assert_eq!(next.nav, fixed!(1_000e18));
        assert_eq!(next.share_price(), FixedPoint::one());
        Ok(())
    }

    #[test]
    fn test_investment_at_premium() -> Result<()> {
        let state = FundState::new(fixed!(1_500e18), fixed!(1_000e18));
        assert_eq!(state.shares_for_investment(fixed!(300e18))?, fixed!(200e18));
        Ok(())
    }

    #[test]
    fn test_investment_below_minimum() {
        let mut state = FundState::new(fixed!(1_000e18), fixed!(1_000e18));
        state.minimum_investment = fixed!(10e18);
        let err = state.shares_for_investment(fixed!(9e18)).unwrap_err();
        assert!(err.to_string().contains("minimum"));
        assert!(state.shares_for_investment(fixed!(0)).is_err());
        assert!(state.shares_for_investment(fixed!(10e18)).is_ok());
    }

    #[test]
    fn test_redemption_fee_rounds_up() -> Result<()> {
        let state = FundState::new(fixed!(1_000e18), fixed!(1_000e18)).with_fees(100, 50)?;
        // 0.5% of 3 wei is 0.015 wei, which the fund rounds up to 1.
        assert_eq!(state.redemption_fee(fixed!(3)), fixed!(1));
        let breakdown = state.explain_redemption(fixed!(100e18))?;
        assert_eq!(breakdown.gross, fixed!(100e18));
        assert_eq!(breakdown.fee, fixed!(0.5e18));
        assert_eq!(breakdown.usdc_out, fixed!(99.5e18));
        // The fee stays behind, so remaining holders are better off.
        assert_eq!(breakdown.nav_after, fixed!(900.5e18));
        assert_eq!(breakdown.supply_after, fixed!(900e18));
        Ok(())
    }

    #[test]
    fn test_redeem_more_than_supply() {
        let state = FundState::new(fixed!(1_000e18), fixed!(1_000e18));
        assert!(state.redemption_value(fixed!(1_000.000001e18)).is_err());
        assert!(state.redemption_value(fixed!(0)).is_err());
    }

    #[test]
    fn fuzz_round_trip_never_profits() -> Result<()> {
        let mut rng = thread_rng();
        for _ in 0..FUZZ_RUNS {
            let mut state = rng.gen::<FundState>();
            state.redemption_fee_rate = fixed!(0);
            let usdc = rng.gen_range(fixed!(10e18)..=fixed!(1_000_000e18));
            let (next, shares) = state.apply_investment(usdc)?;
            let value = next.redemption_value(shares)?;
            assert!(value <= usdc, "round trip of {} returned {}", usdc, value);
            // Rounding costs at most a few wei.
            assert!(usdc - value <= fixed!(4), "lost {} on {}", usdc - value, usdc);
        }
        Ok(())
    }

    #[test]
    fn fuzz_investment_preserves_share_price() -> Result<()> {
        let mut rng = thread_rng();
        for _ in 0..FUZZ_RUNS {
            let state = rng.gen::<FundState>();
            let usdc = rng.gen_range(fixed!(10e18)..=fixed!(1_000_000e18));
            let (next, _) = state.apply_investment(usdc)?;
            let delta = next.share_price().abs_diff(state.share_price());
            assert!(delta <= fixed!(1), "share price moved by {}", delta);
            // Investors can only push the price up through rounding.
            assert!(next.share_price() + fixed!(1) >= state.share_price());
        }
        Ok(())
    }

    #[test]
    fn fuzz_redemption_fee_benefits_holders() -> Result<()> {
        let mut rng = thread_rng();
        for _ in 0..FUZZ_RUNS {
            let state = rng.gen::<FundState>();
            let shares = rng.gen_range(fixed!(1e18)..=state.total_supply / fixed!(2e18));
            let (next, _) = state.apply_redemption(shares)?;
            assert!(next.share_price() + fixed!(1) >= state.share_price());
        }
        Ok(())
    }
}
