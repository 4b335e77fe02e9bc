use ethers::types::{I256, U256};
use eyre::{eyre, Result};
use fixed_point::FixedPoint;
use fixed_point_macros::fixed;

/// A price feed answer, e.g. Chainlink's `latestRoundData().answer` with the
/// feed's `decimals()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Price {
    pub answer: U256,
    pub decimals: u8,
}

impl Price {
    pub fn new(answer: U256, decimals: u8) -> Self {
        Self { answer, decimals }
    }

    /// Builds a price from a signed feed answer. Feeds report stale or broken
    /// rounds as zero or negative answers, which can't price anything.
    pub fn from_answer(answer: I256, decimals: u8) -> Result<Self> {
        if answer <= I256::zero() {
            return Err(eyre!("price feed answered {}, expected a positive price", answer));
        }
        Ok(Self {
            answer: answer.into_raw(),
            decimals,
        })
    }

    /// A price of exactly one dollar, which is how USDC is valued.
    pub fn par() -> Self {
        Self {
            answer: U256::exp10(8),
            decimals: 8,
        }
    }

    pub fn to_fixed(&self) -> Result<FixedPoint> {
        FixedPoint::from_units(self.answer, self.decimals)
    }
}

/// A token balance held by the fund together with its price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub balance: U256,
    pub decimals: u8,
    pub price: Price,
}

impl Holding {
    /// The USD value of the holding as fixed point.
    pub fn value(&self) -> Result<FixedPoint> {
        let balance = FixedPoint::from_units(self.balance, self.decimals)?;
        Ok(balance.mul_down(self.price.to_fixed()?))
    }
}

/// The net asset value of a set of holdings.
pub fn calculate_nav(holdings: &[Holding]) -> Result<FixedPoint> {
    holdings.iter().try_fold(fixed!(0), |nav, holding| {
        let value = holding
            .value()
            .map_err(|e| eyre!("failed to value {}: {}", holding.symbol, e))?;
        Ok(nav + value)
    })
}
