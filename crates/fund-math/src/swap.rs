use ethers::types::U256;
use eyre::{eyre, Result};

use crate::{Price, USDC_DECIMALS};

/// A hard-coded exchange rate against USDC, as used by the Uniswap
/// integration in fixed-rate mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedRate {
    /// USDC base units (6 decimals) for one whole token.
    pub usdc_per_token: U256,
}

impl FixedRate {
    pub fn new(usdc_per_token: U256) -> Result<Self> {
        if usdc_per_token.is_zero() {
            return Err(eyre!("fixed rate must be greater than zero"));
        }
        Ok(Self { usdc_per_token })
    }

    /// The fixed rate that matches a price feed answer.
    pub fn from_price(price: &Price) -> Result<Self> {
        Self::new(price.to_fixed()?.to_units(USDC_DECIMALS)?)
    }

    /// Converts a raw token amount to USDC base units, rounding down.
    pub fn token_to_usdc(&self, amount: U256, token_decimals: u8) -> Result<U256> {
        amount
            .checked_mul(self.usdc_per_token)
            .map(|value| value / U256::exp10(token_decimals as usize))
            .ok_or_else(|| eyre!("{} tokens overflow at rate {}", amount, self.usdc_per_token))
    }

    /// Converts USDC base units to a raw token amount, rounding down.
    pub fn usdc_to_token(&self, usdc: U256, token_decimals: u8) -> Result<U256> {
        usdc.checked_mul(U256::exp10(token_decimals as usize))
            .map(|value| value / self.usdc_per_token)
            .ok_or_else(|| eyre!("{} USDC overflows at {} decimals", usdc, token_decimals))
    }
}
