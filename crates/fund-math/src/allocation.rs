use ethers::types::U256;
use eyre::{eyre, Result};

use crate::BPS;

/// The USDC earmarked for one token when seeding the fund.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub symbol: String,
    pub usdc: U256,
}

/// Splits an initial USDC amount across tokens by weight in basis points.
/// Whatever isn't allocated, including rounding dust, stays in USDC and is
/// returned as the remainder.
pub fn allocate<S: AsRef<str>>(
    initial_usdc: U256,
    weights: &[(S, u32)],
) -> Result<(Vec<Allocation>, U256)> {
    let total = weights.iter().map(|(_, bps)| *bps as u64).sum::<u64>();
    if total > BPS as u64 {
        return Err(eyre!(
            "allocations add up to {} bps, more than {} bps",
            total,
            BPS
        ));
    }
    let allocations = weights
        .iter()
        .map(|(symbol, bps)| {
            initial_usdc
                .checked_mul(U256::from(*bps))
                .map(|usdc| Allocation {
                    symbol: symbol.as_ref().to_string(),
                    usdc: usdc / U256::from(BPS),
                })
                .ok_or_else(|| eyre!("{} USDC is too large to allocate", initial_usdc))
        })
        .collect::<Result<Vec<_>>>()?;
    let allocated = allocations
        .iter()
        .fold(U256::zero(), |sum, allocation| sum + allocation.usdc);
    Ok((allocations, initial_usdc - allocated))
}
