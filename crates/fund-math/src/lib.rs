//! Off-chain mirror of the fund's share accounting: NAV, share pricing,
//! investment and redemption previews, management fee accrual, and the
//! fixed-rate conversions used by the test swap integration.

mod allocation;
mod fees;
mod nav;
mod shares;
mod swap;

pub use allocation::*;
use ethers::types::U256;
use eyre::{eyre, Result};
use fixed_point::FixedPoint;
use fixed_point_macros::{fixed, uint256};
pub use nav::*;
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
pub use shares::*;
pub use swap::*;

/// Basis points in a whole.
pub const BPS: u32 = 10_000;

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

pub const USDC_DECIMALS: u8 = 6;

/// Fund shares (MFC) carry 18 decimals, the same as `FixedPoint`.
pub const SHARE_DECIMALS: u8 = 18;

/// Converts a rate in basis points to a fixed point fraction.
pub fn bps_to_fixed(bps: u32) -> Result<FixedPoint> {
    if bps > BPS {
        return Err(eyre!("{} bps is more than 100%", bps));
    }
    Ok(FixedPoint::from(U256::from(bps) * uint256!(1e14)))
}

/// The fund's accounting state, in 18 decimal fixed point. NAV is
/// denominated in USDC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundState {
    pub nav: FixedPoint,
    pub total_supply: FixedPoint,
    /// Annual management fee as a fraction.
    pub management_fee_rate: FixedPoint,
    /// Fraction of redemption proceeds kept by the fund.
    pub redemption_fee_rate: FixedPoint,
    /// Unix timestamp the management fee was last collected at.
    pub last_fee_collection: u64,
    pub minimum_investment: FixedPoint,
}

impl Default for FundState {
    fn default() -> Self {
        Self {
            nav: fixed!(0),
            total_supply: fixed!(0),
            management_fee_rate: fixed!(0.01e18),
            redemption_fee_rate: fixed!(0),
            last_fee_collection: 0,
            minimum_investment: fixed!(0),
        }
    }
}

impl FundState {
    pub fn new(nav: FixedPoint, total_supply: FixedPoint) -> Self {
        Self {
            nav,
            total_supply,
            ..Default::default()
        }
    }

    /// Sets the fee rates from basis points.
    pub fn with_fees(mut self, management_fee_bps: u32, redemption_fee_bps: u32) -> Result<Self> {
        self.management_fee_rate = bps_to_fixed(management_fee_bps)?;
        self.redemption_fee_rate = bps_to_fixed(redemption_fee_bps)?;
        Ok(self)
    }

    /// USDC per share. An empty fund prices shares at exactly one USDC.
    pub fn share_price(&self) -> FixedPoint {
        if self.total_supply.is_zero() || self.nav.is_zero() {
            return FixedPoint::one();
        }
        self.nav.div_down(self.total_supply)
    }

    /// The USDC value of a holding of shares at the current share price,
    /// before any redemption fee.
    pub fn value_of(&self, shares: FixedPoint) -> FixedPoint {
        if self.total_supply.is_zero() {
            return shares;
        }
        shares.mul_div_down(self.nav, self.total_supply)
    }

    pub fn is_empty(&self) -> bool {
        self.total_supply.is_zero()
    }
}

impl Distribution<FundState> for Standard {
    // Samples states that look like a live fund: share prices between 0.5
    // and 2.5 USDC and fees in the range the contracts accept in practice.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> FundState {
        let nav = rng.gen_range(fixed!(1_000e18)..=fixed!(100_000_000e18));
        let share_price = rng.gen_range(fixed!(0.5e18)..=fixed!(2.5e18));
        FundState {
            nav,
            total_supply: nav.div_down(share_price),
            management_fee_rate: rng.gen_range(fixed!(0)..=fixed!(0.05e18)),
            redemption_fee_rate: rng.gen_range(fixed!(0)..=fixed!(0.01e18)),
            last_fee_collection: 0,
            minimum_investment: rng.gen_range(fixed!(0)..=fixed!(10e18)),
        }
    }
}

/// Output over input, e.g. the USDC received from a round trip over the USDC
/// invested. Zero input has zero efficiency.
pub fn efficiency(input: FixedPoint, output: FixedPoint) -> FixedPoint {
    if input.is_zero() {
        return fixed!(0);
    }
    output.div_down(input)
}
