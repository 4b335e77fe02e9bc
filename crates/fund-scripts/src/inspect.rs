//! Read-only views of a deployed fund, plus the one remediation the
//! debugging workflow needs: minting test tokens to an account that is
//! running low.

use std::{fmt, sync::Arc};

use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use eyre::{eyre, Result, WrapErr};
use fixed_point::FixedPoint;
use fixed_point_macros::fixed;
use fund_addresses::{Deployment, FUND, PRICE_ORACLE, SHARE_TOKEN, USDC};
use fund_math::{
    calculate_nav, FundState, Holding, Price, SHARE_DECIMALS, USDC_DECIMALS,
};
use fund_wrappers::wrappers::{
    aggregator_v3::AggregatorV3, chainlink_price_oracle::ChainlinkPriceOracle,
    mock_erc20::MockERC20, mock_fund::MockFund,
};
use tracing::{debug, info, warn};

use crate::{confirm, format_units};

/// A token the fund holds, with its price and USDC value when a price could
/// be read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenHolding {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    pub balance: U256,
    pub price: Option<Price>,
    pub value: Option<FixedPoint>,
}

impl TokenHolding {
    pub fn new(
        symbol: impl Into<String>,
        address: Address,
        decimals: u8,
        balance: U256,
        price: Option<Price>,
    ) -> Result<Self> {
        let mut holding = Self {
            symbol: symbol.into(),
            address,
            decimals,
            balance,
            price,
            value: None,
        };
        holding.value = holding.priced().map(|priced| priced.value()).transpose()?;
        Ok(holding)
    }

    fn priced(&self) -> Option<Holding> {
        self.price.map(|price| Holding {
            symbol: self.symbol.clone(),
            balance: self.balance,
            decimals: self.decimals,
            price,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundReport {
    pub network: String,
    pub fund: Address,
    pub share_token: Option<Address>,
    pub initialized: bool,
    pub total_supply: FixedPoint,
    /// NAV as reported by the fund.
    pub nav: FixedPoint,
    pub share_price: FixedPoint,
    /// NAV recomputed from the holdings that could be priced.
    pub computed_nav: FixedPoint,
    pub holdings: Vec<TokenHolding>,
    pub problems: Vec<String>,
}

impl FundReport {
    /// Flags a computed NAV that is more than 1% away from the fund's.
    fn check_nav(&mut self) {
        let tolerance = self.nav.mul_down(fixed!(0.01e18)).max(fixed!(1e18));
        if self.nav.abs_diff(self.computed_nav) > tolerance {
            self.problems.push(format!(
                "computed NAV {} differs from the fund's NAV {}",
                self.computed_nav.to_scaled_string(18),
                self.nav.to_scaled_string(18)
            ));
        }
    }
}

impl fmt::Display for FundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fund ({}): {:?}", self.network, self.fund)?;
        match self.share_token {
            Some(share_token) => writeln!(f, "  share token:  {:?}", share_token)?,
            None => writeln!(f, "  share token:  unknown")?,
        }
        writeln!(f, "  initialized:  {}", self.initialized)?;
        writeln!(f, "  total supply: {} MFC", self.total_supply)?;
        writeln!(f, "  NAV:          {} USDC", self.nav)?;
        writeln!(f, "  share price:  {} USDC", self.share_price)?;
        writeln!(f, "  computed NAV: {} USDC", self.computed_nav)?;
        writeln!(f, "  holdings:")?;
        for holding in &self.holdings {
            let price = match (holding.price, holding.value) {
                (Some(price), Some(value)) => format!(
                    "@ {} USD = {} USDC",
                    format_units(price.answer, price.decimals),
                    value
                ),
                _ => "unpriced".to_string(),
            };
            writeln!(
                f,
                "    {:<5} {} {}",
                holding.symbol,
                format_units(holding.balance, holding.decimals),
                price
            )?;
        }
        if self.problems.is_empty() {
            writeln!(f, "  no problems found")?;
        } else {
            writeln!(f, "  problems:")?;
            for problem in &self.problems {
                writeln!(f, "    - {}", problem)?;
            }
        }
        Ok(())
    }
}

/// Reads the fund's state and holdings. Failing reads of a single token are
/// recorded as problems and don't stop the report.
pub async fn inspect_fund<M: Middleware + 'static>(
    client: Arc<M>,
    deployment: &Deployment,
) -> Result<FundReport> {
    let fund_address = deployment.contract(FUND)?;
    let fund = MockFund::new(fund_address, client.clone());
    let (nav, supply, initialized) = fund
        .get_fund_stats()
        .call()
        .await
        .wrap_err_with(|| format!("failed to read the stats of the fund at {:?}", fund_address))?;
    let nav = FixedPoint::from_units(nav, USDC_DECIMALS)?;
    let total_supply = FixedPoint::from_units(supply, SHARE_DECIMALS)?;

    let mut problems = vec![];
    if !initialized {
        problems.push("the fund has not been initialized".to_string());
    }
    let share_token = match deployment.contract(SHARE_TOKEN) {
        Ok(share_token) => Some(share_token),
        Err(_) => match fund.share_token().call().await {
            Ok(share_token) => Some(share_token),
            Err(e) => {
                warn!(error = %e, "share token not found");
                problems.push(format!("share token not found: {}", e));
                None
            }
        },
    };

    let oracle = match deployment.contract(PRICE_ORACLE) {
        Ok(address) => Some(ChainlinkPriceOracle::new(address, client.clone())),
        Err(e) => {
            problems.push(e.to_string());
            None
        }
    };

    let mut tokens = vec![];
    if let Ok(usdc) = deployment.token(USDC) {
        tokens.push(usdc);
    }
    match fund.get_supported_tokens().call().await {
        Ok(supported) => {
            for token in supported {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to read the supported tokens");
            problems.push(format!("failed to read the supported tokens: {}", e));
        }
    }

    let mut holdings = vec![];
    for token in tokens {
        let symbol = symbol_of(deployment, token);
        match read_holding(client.clone(), oracle.as_ref(), fund_address, &symbol, token).await {
            Ok((holding, problem)) => {
                if let Some(problem) = problem {
                    problems.push(problem);
                }
                holdings.push(holding);
            }
            Err(e) => {
                warn!(%symbol, error = %e, "failed to read holding");
                problems.push(format!("failed to read the {} holding: {}", symbol, e));
            }
        }
    }

    let priced = holdings
        .iter()
        .filter_map(TokenHolding::priced)
        .collect::<Vec<_>>();
    let computed_nav = calculate_nav(&priced)?;
    let state = FundState::new(nav, total_supply);

    let mut report = FundReport {
        network: deployment.network.clone(),
        fund: fund_address,
        share_token,
        initialized,
        total_supply,
        nav,
        share_price: state.share_price(),
        computed_nav,
        holdings,
        problems,
    };
    if priced.len() == report.holdings.len() {
        report.check_nav();
    }
    debug!(problems = report.problems.len(), "inspected fund");
    Ok(report)
}

/// The record's symbol for a token address, falling back to the address.
fn symbol_of(deployment: &Deployment, token: Address) -> String {
    deployment
        .tokens
        .iter()
        .find(|(_, address)| **address == token)
        .map(|(symbol, _)| symbol.clone())
        .unwrap_or_else(|| format!("{:?}", token))
}

async fn read_holding<M: Middleware + 'static>(
    client: Arc<M>,
    oracle: Option<&ChainlinkPriceOracle<M>>,
    holder: Address,
    symbol: &str,
    token: Address,
) -> Result<(TokenHolding, Option<String>)> {
    let erc20 = MockERC20::new(token, client.clone());
    let balance = erc20.balance_of(holder).call().await?;
    let decimals = erc20.decimals().call().await?;
    let (price, problem) = if symbol == USDC {
        (Some(Price::par()), None)
    } else {
        match oracle {
            Some(oracle) => match read_price(client, oracle, symbol, token).await {
                Ok(price) => (Some(price), None),
                Err(e) => (None, Some(e.to_string())),
            },
            None => (None, Some(format!("{} can't be priced without an oracle", symbol))),
        }
    };
    Ok((
        TokenHolding::new(symbol, token, decimals, balance, price)?,
        problem,
    ))
}

/// Reads a token's price from the feed the oracle has registered for it.
pub async fn read_price<M: Middleware + 'static>(
    client: Arc<M>,
    oracle: &ChainlinkPriceOracle<M>,
    symbol: &str,
    token: Address,
) -> Result<Price> {
    let feed = match oracle.price_feeds(token).call().await {
        Ok(feed) if !feed.is_zero() => feed,
        Ok(_) => {
            warn!(%symbol, "price feed not found for {}", symbol);
            return Err(eyre!("price feed not found for {}", symbol));
        }
        Err(e) => {
            warn!(%symbol, error = %e, "price feed not found for {}", symbol);
            return Err(eyre!("price feed not found for {}: {}", symbol, e));
        }
    };
    let aggregator = AggregatorV3::new(feed, client);
    let decimals = aggregator.decimals().call().await?;
    let (_, answer, _, _, _) = aggregator.latest_round_data().call().await?;
    Price::from_answer(answer, decimals)
        .map_err(|e| eyre!("bad price for {} from {:?}: {}", symbol, feed, e))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountReport {
    pub account: Address,
    pub eth: U256,
    pub usdc: U256,
    pub mfc: U256,
    /// What the account's MFC is worth in USDC before redemption fees.
    pub mfc_value: FixedPoint,
}

impl fmt::Display for AccountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "account {:?}", self.account)?;
        writeln!(f, "  ETH:  {}", format_units(self.eth, 18))?;
        writeln!(f, "  USDC: {}", format_units(self.usdc, USDC_DECIMALS))?;
        writeln!(
            f,
            "  MFC:  {} (worth {} USDC)",
            format_units(self.mfc, SHARE_DECIMALS),
            self.mfc_value
        )
    }
}

pub async fn inspect_account<M: Middleware + 'static>(
    client: Arc<M>,
    deployment: &Deployment,
    account: Address,
) -> Result<AccountReport> {
    let addresses = deployment.addresses()?;
    let eth = client
        .get_balance(account, None)
        .await
        .map_err(|e| eyre!("failed to read the ETH balance of {:?}: {}", account, e))?;
    let usdc = MockERC20::new(addresses.usdc, client.clone())
        .balance_of(account)
        .call()
        .await?;
    let mfc = MockERC20::new(addresses.share_token, client.clone())
        .balance_of(account)
        .call()
        .await?;
    let state = fund_state(client, deployment).await?;
    Ok(AccountReport {
        account,
        eth,
        usdc,
        mfc,
        mfc_value: state.value_of(FixedPoint::from_units(mfc, SHARE_DECIMALS)?),
    })
}

/// Mints `top_up` of a mock token to an account whose balance is below
/// `minimum`. Returns whether anything was minted.
pub async fn ensure_minimum_balance<M: Middleware + 'static>(
    token: &MockERC20<M>,
    account: Address,
    minimum: U256,
    top_up: U256,
) -> Result<bool> {
    let balance = token.balance_of(account).call().await?;
    if balance >= minimum {
        debug!(?account, %balance, "balance is sufficient");
        return Ok(false);
    }
    let receipt = confirm(
        token.mint(account, top_up).send().await?.await?,
        &format!("mint to {:?}", account),
    )?;
    info!(
        ?account,
        token = ?token.address(),
        %balance,
        %top_up,
        tx = ?receipt.transaction_hash,
        "minted test tokens"
    );
    Ok(true)
}

/// The fund's accounting state as the off-chain math sees it.
pub async fn fund_state<M: Middleware + 'static>(
    client: Arc<M>,
    deployment: &Deployment,
) -> Result<FundState> {
    let fund = MockFund::new(deployment.contract(FUND)?, client);
    let (nav, supply, _) = fund.get_fund_stats().call().await?;
    let management_fee_bps = fund.management_fee_rate().call().await?;
    let last_fee_collection = fund.last_fee_collection().call().await?;
    let minimum_investment = fund.minimum_investment().call().await?;
    let state = FundState {
        nav: FixedPoint::from_units(nav, USDC_DECIMALS)?,
        total_supply: FixedPoint::from_units(supply, SHARE_DECIMALS)?,
        last_fee_collection: last_fee_collection.low_u64(),
        minimum_investment: FixedPoint::from_units(minimum_investment, USDC_DECIMALS)?,
        ..Default::default()
    };
    let management_fee_bps = u32::try_from(management_fee_bps)
        .map_err(|_| eyre!("management fee rate {} is out of range", management_fee_bps))?;
    state.with_fees(management_fee_bps, deployment.fees.redemption_fee_bps)
}

/// On-chain previews next to the off-chain math for one investment and the
/// redemption of the shares it would buy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewCheck {
    pub usdc_in: FixedPoint,
    pub expected_shares: FixedPoint,
    pub preview_shares: FixedPoint,
    pub expected_usdc: FixedPoint,
    pub preview_usdc: FixedPoint,
}

impl PreviewCheck {
    pub fn share_diff(&self) -> FixedPoint {
        self.expected_shares.abs_diff(self.preview_shares)
    }

    pub fn usdc_diff(&self) -> FixedPoint {
        self.expected_usdc.abs_diff(self.preview_usdc)
    }

    pub fn within(&self, tolerance: FixedPoint) -> bool {
        self.share_diff() <= tolerance && self.usdc_diff() <= tolerance
    }
}

impl fmt::Display for PreviewCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "investment of {} USDC", self.usdc_in)?;
        writeln!(
            f,
            "  shares: preview {} expected {} diff {}",
            self.preview_shares,
            self.expected_shares,
            self.share_diff()
        )?;
        writeln!(
            f,
            "  redemption: preview {} expected {} diff {}",
            self.preview_usdc,
            self.expected_usdc,
            self.usdc_diff()
        )
    }
}

pub async fn verify_previews<M: Middleware + 'static>(
    client: Arc<M>,
    deployment: &Deployment,
    usdc_amount: U256,
) -> Result<PreviewCheck> {
    let state = fund_state(client.clone(), deployment).await?;
    let fund = MockFund::new(deployment.contract(FUND)?, client);

    let usdc_in = FixedPoint::from_units(usdc_amount, USDC_DECIMALS)?;
    let expected_shares = state.shares_for_investment(usdc_in)?;
    let preview_shares = fund.get_investment_preview(usdc_amount).call().await?;
    let preview_shares = FixedPoint::from_units(preview_shares, SHARE_DECIMALS)?;

    // Redeem what the investment would buy, capped at what exists.
    let shares = preview_shares.min(state.total_supply);
    let expected_usdc = if shares.is_zero() {
        fixed!(0)
    } else {
        state.redemption_value(shares)?
    };
    let preview_usdc = fund
        .get_redemption_preview(shares.to_units(SHARE_DECIMALS)?)
        .call()
        .await?;

    Ok(PreviewCheck {
        usdc_in,
        expected_shares,
        preview_shares,
        expected_usdc,
        preview_usdc: FixedPoint::from_units(preview_usdc, USDC_DECIMALS)?,
    })
}
