//! An investor that drives the fund the way a user would: approving USDC,
//! investing, redeeming, and comparing what came back against the off-chain
//! math.

use std::{fmt, sync::Arc};

use ethers::{
    prelude::EthLogDecode,
    providers::Middleware,
    types::{Address, Log, H256, U256},
};
use eyre::{eyre, Result, WrapErr};
use fixed_point::FixedPoint;
use fund_addresses::{Addresses, Deployment};
use fund_math::{efficiency, SHARE_DECIMALS, USDC_DECIMALS};
use fund_wrappers::wrappers::{
    mock_erc20::MockERC20,
    mock_fund::{MockFund, MockFundEvents},
};
use tracing::info;

use crate::{
    confirm, format_units,
    inspect::{ensure_minimum_balance, fund_state},
};

/// Raw USDC and MFC balances of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    pub usdc: U256,
    pub mfc: U256,
}

impl fmt::Display for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} USDC, {} MFC",
            format_units(self.usdc, USDC_DECIMALS),
            format_units(self.mfc, SHARE_DECIMALS)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvestOutcome {
    pub usdc_in: U256,
    pub shares_out: U256,
    /// What the off-chain math predicted before the investment.
    pub expected_shares: FixedPoint,
    pub before: Balances,
    pub after: Balances,
    pub tx: H256,
}

impl fmt::Display for InvestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "invested {} USDC for {} MFC (expected {}) in {:?}",
            format_units(self.usdc_in, USDC_DECIMALS),
            format_units(self.shares_out, SHARE_DECIMALS),
            self.expected_shares,
            self.tx
        )?;
        writeln!(f, "  before: {}", self.before)?;
        writeln!(f, "  after:  {}", self.after)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemOutcome {
    pub shares_in: U256,
    pub usdc_out: U256,
    pub expected_usdc: FixedPoint,
    pub before: Balances,
    pub after: Balances,
    pub tx: H256,
}

impl fmt::Display for RedeemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "redeemed {} MFC for {} USDC (expected {}) in {:?}",
            format_units(self.shares_in, SHARE_DECIMALS),
            format_units(self.usdc_out, USDC_DECIMALS),
            self.expected_usdc,
            self.tx
        )?;
        writeln!(f, "  before: {}", self.before)?;
        writeln!(f, "  after:  {}", self.after)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundTrip {
    pub invest: InvestOutcome,
    pub redeem: RedeemOutcome,
    /// USDC back over USDC in.
    pub efficiency: FixedPoint,
}

impl RoundTrip {
    pub fn passes(&self, min_efficiency: FixedPoint) -> bool {
        self.efficiency >= min_efficiency
    }
}

impl fmt::Display for RoundTrip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.invest)?;
        write!(f, "{}", self.redeem)?;
        writeln!(f, "efficiency: {}", self.efficiency.to_percentage_string())
    }
}

pub struct Investor<M> {
    address: Address,
    client: Arc<M>,
    deployment: Deployment,
    fund: MockFund<M>,
    usdc: MockERC20<M>,
    share_token: MockERC20<M>,
}

impl<M> fmt::Debug for Investor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Investor")
            .field("address", &self.address)
            .field("network", &self.deployment.network)
            .finish()
    }
}

impl<M: Middleware + 'static> Investor<M> {
    /// An investor acting as the client's signer.
    pub fn new(client: Arc<M>, deployment: Deployment) -> Result<Self> {
        let address = client
            .default_sender()
            .ok_or_else(|| eyre!("the client has no signer to invest with"))?;
        let Addresses {
            fund,
            share_token,
            usdc,
            ..
        } = deployment.addresses()?;
        Ok(Self {
            address,
            fund: MockFund::new(fund, client.clone()),
            usdc: MockERC20::new(usdc, client.clone()),
            share_token: MockERC20::new(share_token, client.clone()),
            client,
            deployment,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn balances(&self) -> Result<Balances> {
        Ok(Balances {
            usdc: self.usdc.balance_of(self.address).call().await?,
            mfc: self.share_token.balance_of(self.address).call().await?,
        })
    }

    /// Mints USDC so that the investor holds at least `amount`.
    pub async fn top_up(&self, amount: U256) -> Result<bool> {
        ensure_minimum_balance(&self.usdc, self.address, amount, amount).await
    }

    pub async fn invest(&self, usdc_amount: U256) -> Result<InvestOutcome> {
        let before = self.balances().await?;
        if before.usdc < usdc_amount {
            return Err(eyre!(
                "insufficient USDC to invest: {} < {}; rerun with --top-up to mint some",
                format_units(before.usdc, USDC_DECIMALS),
                format_units(usdc_amount, USDC_DECIMALS)
            ));
        }
        let state = fund_state(self.client.clone(), &self.deployment).await?;
        let expected_shares =
            state.shares_for_investment(FixedPoint::from_units(usdc_amount, USDC_DECIMALS)?)?;

        confirm(
            self.usdc.approve(self.fund.address(), usdc_amount).send().await?.await?,
            "approve",
        )?;
        let receipt = confirm(
            self.fund.invest(usdc_amount).send().await?.await?,
            "invest",
        )?;
        let event = decode_events(&receipt.logs)
            .into_iter()
            .find_map(|event| match event {
                MockFundEvents::InvestmentFilter(event) if event.investor == self.address => {
                    Some(event)
                }
                _ => None,
            })
            .ok_or_else(|| eyre!("invest in {:?} emitted no Investment event", receipt.transaction_hash))?;
        let after = self.balances().await?;

        info!(
            investor = ?self.address,
            usdc = %format_units(event.usdc_amount, USDC_DECIMALS),
            mfc = %format_units(event.mfc_amount, SHARE_DECIMALS),
            "invested"
        );
        Ok(InvestOutcome {
            usdc_in: event.usdc_amount,
            shares_out: event.mfc_amount,
            expected_shares,
            before,
            after,
            tx: receipt.transaction_hash,
        })
    }

    pub async fn redeem(&self, shares: U256) -> Result<RedeemOutcome> {
        let before = self.balances().await?;
        if before.mfc < shares {
            return Err(eyre!(
                "insufficient MFC to redeem: {} < {}",
                format_units(before.mfc, SHARE_DECIMALS),
                format_units(shares, SHARE_DECIMALS)
            ));
        }
        let state = fund_state(self.client.clone(), &self.deployment).await?;
        let expected_usdc =
            state.redemption_value(FixedPoint::from_units(shares, SHARE_DECIMALS)?)?;

        let receipt = confirm(self.fund.redeem(shares).send().await?.await?, "redeem")?;
        let event = decode_events(&receipt.logs)
            .into_iter()
            .find_map(|event| match event {
                MockFundEvents::RedemptionFilter(event) if event.investor == self.address => {
                    Some(event)
                }
                _ => None,
            })
            .ok_or_else(|| eyre!("redeem in {:?} emitted no Redemption event", receipt.transaction_hash))?;
        let after = self.balances().await?;

        info!(
            investor = ?self.address,
            mfc = %format_units(event.mfc_amount, SHARE_DECIMALS),
            usdc = %format_units(event.usdc_amount, USDC_DECIMALS),
            "redeemed"
        );
        Ok(RedeemOutcome {
            shares_in: event.mfc_amount,
            usdc_out: event.usdc_amount,
            expected_usdc,
            before,
            after,
            tx: receipt.transaction_hash,
        })
    }

    /// Invests and immediately redeems the shares received.
    pub async fn round_trip(&self, usdc_amount: U256) -> Result<RoundTrip> {
        let invest = self.invest(usdc_amount).await.wrap_err("round trip failed to invest")?;
        let redeem = self
            .redeem(invest.shares_out)
            .await
            .wrap_err("round trip failed to redeem")?;
        let efficiency = efficiency(
            FixedPoint::from_units(invest.usdc_in, USDC_DECIMALS)?,
            FixedPoint::from_units(redeem.usdc_out, USDC_DECIMALS)?,
        );
        Ok(RoundTrip {
            invest,
            redeem,
            efficiency,
        })
    }
}

/// Decodes the fund events in a set of logs, skipping everything else.
pub fn decode_events(logs: &[Log]) -> Vec<MockFundEvents> {
    logs.iter()
        .filter_map(|log| MockFundEvents::decode_log(&log.clone().into()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use ethers::{
        abi::{encode, Token},
        contract::EthEvent,
    };
    use fixed_point_macros::{fixed, uint256};
    use fund_wrappers::wrappers::mock_fund::InvestmentFilter;

    use super::*;

    fn investment_log(investor: Address, usdc: U256, mfc: U256) -> Log {
        Log {
            topics: vec![InvestmentFilter::signature(), H256::from(investor)],
            data: encode(&[Token::Uint(usdc), Token::Uint(mfc)]).into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_events() {
        let investor = Address::repeat_byte(7);
        let transfer = Log {
            topics: vec![H256::repeat_byte(1)],
            ..Default::default()
        };
        let logs = vec![
            transfer,
            investment_log(investor, uint256!(1_000e6), uint256!(990e18)),
        ];

        let events = decode_events(&logs);
        assert_eq!(events.len(), 1);
        match &events[0] {
            MockFundEvents::InvestmentFilter(event) => {
                assert_eq!(event.investor, investor);
                assert_eq!(event.usdc_amount, uint256!(1_000e6));
                assert_eq!(event.mfc_amount, uint256!(990e18));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_threshold() {
        let outcome = RoundTrip {
            invest: InvestOutcome {
                usdc_in: uint256!(1_000e6),
                shares_out: uint256!(1_000e18),
                expected_shares: fixed!(1_000e18),
                before: Balances::default(),
                after: Balances::default(),
                tx: H256::zero(),
            },
            redeem: RedeemOutcome {
                shares_in: uint256!(1_000e18),
                usdc_out: uint256!(950e6),
                expected_usdc: fixed!(950e18),
                before: Balances::default(),
                after: Balances::default(),
                tx: H256::zero(),
            },
            efficiency: fixed!(0.95e18),
        };
        assert!(outcome.passes(fixed!(0.95e18)));
        assert!(!outcome.passes(fixed!(0.96e18)));
        assert!(outcome.to_string().contains("efficiency: 95.00%"));
    }
}
