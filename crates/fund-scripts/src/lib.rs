#![allow(clippy::comparison_chain)]
#[macro_use]
extern crate lazy_static;

pub mod agent;
pub mod chain;
pub mod cli;
pub mod config;
pub mod constants;
pub mod deploy;
pub mod inspect;
pub mod manifest;

use ethers::types::{TransactionReceipt, U256, U64};
use eyre::{eyre, Result};
use fixed_point::FixedPoint;

/// Renders a raw token amount with its decimals, e.g. `1500000` with 6
/// decimals is "1.500000".
pub fn format_units(amount: U256, decimals: u8) -> String {
    FixedPoint::from(amount).to_scaled_string(decimals as usize)
}

/// Renders a unix timestamp from a deployment record as RFC 3339.
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Checks that a sent transaction was mined and didn't revert.
pub fn confirm(receipt: Option<TransactionReceipt>, action: &str) -> Result<TransactionReceipt> {
    let receipt = receipt.ok_or_else(|| eyre!("{} transaction was dropped", action))?;
    if receipt.status != Some(U64::from(1)) {
        return Err(eyre!("{} reverted in {:?}", action, receipt.transaction_hash));
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use fixed_point::parse_units;
    use fixed_point_macros::uint256;
    use rand::{thread_rng, Rng};

    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(uint256!(1.5e6), 6), "1.500000");
        assert_eq!(format_units(uint256!(0), 6), "0.000000");
        assert_eq!(format_units(uint256!(42), 0), "42");
    }

    #[test]
    fn test_format_units_parses_back() {
        let mut rng = thread_rng();
        for _ in 0..1_000 {
            let amount = U256::from(rng.gen::<u128>());
            let decimals = rng.gen_range(0..=18);
            let rendered = format_units(amount, decimals);
            assert_eq!(parse_units(&rendered, decimals as usize).unwrap(), amount);
        }
    }

    #[test]
    fn test_confirm() {
        assert_eq!(
            confirm(None, "invest").unwrap_err().to_string(),
            "invest transaction was dropped"
        );
        let reverted = TransactionReceipt {
            status: Some(U64::zero()),
            ..Default::default()
        };
        assert!(confirm(Some(reverted), "mint")
            .unwrap_err()
            .to_string()
            .starts_with("mint reverted"));
        let mined = TransactionReceipt {
            status: Some(U64::one()),
            ..Default::default()
        };
        assert!(confirm(Some(mined), "invest").is_ok());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_714_564_800), "2024-05-01T12:00:00+00:00");
        assert_eq!(format_timestamp(u64::MAX), u64::MAX.to_string());
    }
}
