//! Definitions of the `fund` command line and its commands.

use std::{fmt::Write as _, path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use eyre::{eyre, Result};
use fixed_point::{parse_units, FixedPoint};
use fund_addresses::{FeeConfig, FundMode};
use fund_math::{FundState, SHARE_DECIMALS, USDC_DECIMALS};
use fund_wrappers::wrappers::mock_erc20::MockERC20;
use tracing::{info, warn};

use crate::{
    agent::Investor,
    chain::Chain,
    config::{Config, Env, Network},
    confirm,
    deploy::{DeployOptions, Deployer},
    format_timestamp, format_units,
    inspect::{inspect_account, inspect_fund, verify_previews},
    manifest::{Manifest, MockFundParams},
};

#[derive(Debug, Parser)]
#[command(name = "fund", about = "Deploy, inspect and exercise the mock fund")]
pub struct Cli {
    /// Network to run against
    #[arg(long, value_enum, default_value_t = Network::Localhost, global = true)]
    pub network: Network,

    /// Directory of deployment records, overriding DEPLOYMENTS_DIR
    #[arg(long, global = true)]
    pub deployments_dir: Option<PathBuf>,

    /// Directory of compiled contract artifacts, overriding ARTIFACTS_DIR
    #[arg(long, global = true)]
    pub artifacts_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Deploy(DeployArgs),
    Inspect(InspectArgs),
    Mint(MintArgs),
    Invest(InvestArgs),
    Redeem(RedeemArgs),
    RoundTrip(RoundTripArgs),
    Verify(VerifyArgs),
    Calc(CalcArgs),
}

/// Deploy the fund system, reusing whatever is already deployed
#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Deployment manifest; the built-in mock fund manifest when omitted
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::FixedRate)]
    pub mode: Mode,

    /// Annual management fee in basis points
    #[arg(long, default_value_t = 100)]
    pub management_fee_bps: u32,

    /// Redemption fee in basis points
    #[arg(long, default_value_t = 0)]
    pub redemption_fee_bps: u32,

    /// USDC the fund is initialized with
    #[arg(long, value_parser = usdc_amount, default_value = "100_000")]
    pub initial_usdc: U256,

    /// Ignore the existing record and deploy everything again
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    FixedRate,
    Oracle,
}

impl From<Mode> for FundMode {
    fn from(mode: Mode) -> FundMode {
        match mode {
            Mode::FixedRate => FundMode::FixedRate,
            Mode::Oracle => FundMode::Oracle,
        }
    }
}

/// Print the fund's state and an account's balances
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Account to report on; the signer when omitted
    #[arg(long)]
    pub account: Option<Address>,
}

/// Mint mock tokens
#[derive(Debug, Args)]
pub struct MintArgs {
    /// Symbol of the token, e.g. USDC
    #[arg(long)]
    pub token: String,

    /// Amount in whole tokens, e.g. 1_000.5
    #[arg(long)]
    pub amount: String,

    /// Recipient; the signer when omitted
    #[arg(long)]
    pub to: Option<Address>,
}

/// Invest USDC in the fund
#[derive(Debug, Args)]
pub struct InvestArgs {
    /// USDC to invest
    #[arg(long, value_parser = usdc_amount)]
    pub amount: U256,

    /// Mint the USDC first if the balance is short
    #[arg(long)]
    pub top_up: bool,
}

/// Redeem MFC for USDC
#[derive(Debug, Args)]
pub struct RedeemArgs {
    /// MFC to redeem
    #[arg(long, value_parser = share_amount)]
    pub shares: U256,
}

/// Invest and redeem the shares received, failing below a minimum efficiency
#[derive(Debug, Args)]
pub struct RoundTripArgs {
    /// USDC to invest
    #[arg(long, value_parser = usdc_amount)]
    pub amount: U256,

    /// Minimum USDC back over USDC in, as a percentage
    #[arg(long, value_parser = percentage, default_value = "95")]
    pub min_efficiency: FixedPoint,

    /// Mint the USDC first if the balance is short
    #[arg(long)]
    pub top_up: bool,
}

/// Compare the fund's previews against the off-chain math
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// USDC investment to preview
    #[arg(long, value_parser = usdc_amount)]
    pub amount: U256,
}

/// Run the fund math offline
#[derive(Debug, Args)]
pub struct CalcArgs {
    /// Net asset value in USDC
    #[arg(long, value_parser = fixed_amount)]
    pub nav: FixedPoint,

    /// Total supply of MFC
    #[arg(long, value_parser = fixed_amount)]
    pub supply: FixedPoint,

    /// USDC to invest
    #[arg(long, value_parser = fixed_amount)]
    pub amount: FixedPoint,

    #[arg(long, default_value_t = 100)]
    pub management_fee_bps: u32,

    #[arg(long, default_value_t = 0)]
    pub redemption_fee_bps: u32,

    /// Seconds since the management fee was last collected
    #[arg(long, default_value_t = 0)]
    pub elapsed: u64,
}

fn usdc_amount(s: &str) -> Result<U256, String> {
    parse_units(s, USDC_DECIMALS as usize).map_err(|e| e.to_string())
}

fn share_amount(s: &str) -> Result<U256, String> {
    parse_units(s, SHARE_DECIMALS as usize).map_err(|e| e.to_string())
}

fn fixed_amount(s: &str) -> Result<FixedPoint, String> {
    s.parse::<FixedPoint>().map_err(|e| e.to_string())
}

/// "95" is 0.95 in fixed point.
fn percentage(s: &str) -> Result<FixedPoint, String> {
    parse_units(s, 16)
        .map(FixedPoint::from)
        .map_err(|e| e.to_string())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Command::Calc(args) = &self.command {
            print!("{}", calc(args)?);
            return Ok(());
        }

        let config = Config::new(
            self.network,
            Env::load()?,
            self.deployments_dir,
            self.artifacts_dir,
        )?;
        let chain = Chain::connect(config.rpc_url.clone()).await?;
        if let Some(expected) = config.network.expected_chain_id() {
            if chain.chain_id() != expected {
                return Err(eyre!(
                    "{} has chain id {} but the node reports {}",
                    config.network,
                    expected,
                    chain.chain_id()
                ));
            }
        }
        let client = chain.client(config.signer()?).await?;
        info!(network = %config.network, account = ?client.address(), "connected");

        self.command.run(&config, client).await
    }
}

impl Command {
    pub async fn run<M: Middleware + 'static>(self, config: &Config, client: Arc<M>) -> Result<()> {
        let signer = client
            .default_sender()
            .ok_or_else(|| eyre!("the client has no signer"))?;
        let store = config.store();
        let network = config.network;
        match self {
            Command::Deploy(args) => {
                let fees = FeeConfig {
                    management_fee_bps: args.management_fee_bps,
                    redemption_fee_bps: args.redemption_fee_bps,
                };
                let mode = FundMode::from(args.mode);
                let manifest = match &args.manifest {
                    Some(path) => Manifest::load(path)?,
                    None => Manifest::mock_fund(&MockFundParams {
                        initial_usdc: args.initial_usdc,
                        ..MockFundParams::for_network(network, mode, fees)
                    })?,
                };
                let deployer = Deployer::new(client, store, config.artifacts(), network.name());
                let options = DeployOptions {
                    fresh: args.fresh,
                    mode,
                    fees,
                };
                let (deployment, summary) = deployer.run(&manifest, &options).await?;
                println!(
                    "deployed {}, reused {}, ran {} steps, skipped {}",
                    summary.deployed.len(),
                    summary.reused.len(),
                    summary.steps_run.len(),
                    summary.steps_skipped.len()
                );
                for (name, address) in &deployment.contracts {
                    println!("  {:<28} {:?}", name, address);
                }
                println!(
                    "record written to {} at {}",
                    summary.record.display(),
                    format_timestamp(deployment.timestamp)
                );
            }
            Command::Inspect(args) => {
                let deployment = store.require(network.name())?;
                println!(
                    "record {} ({:?} mode, last written {})",
                    store.path(network.name()).display(),
                    deployment.mode,
                    format_timestamp(deployment.timestamp)
                );
                print!("{}", inspect_fund(client.clone(), &deployment).await?);
                let account = args.account.unwrap_or(signer);
                print!("{}", inspect_account(client, &deployment, account).await?);
            }
            Command::Mint(args) => {
                let deployment = store.require(network.name())?;
                let token = MockERC20::new(deployment.token(&args.token)?, client);
                let decimals = token.decimals().call().await?;
                let amount = parse_units(&args.amount, decimals as usize)?;
                let to = args.to.unwrap_or(signer);
                confirm(token.mint(to, amount).send().await?.await?, "mint")?;
                println!(
                    "minted {} {} to {:?}",
                    format_units(amount, decimals),
                    args.token,
                    to
                );
            }
            Command::Invest(args) => {
                let investor = Investor::new(client, store.require(network.name())?)?;
                if args.top_up {
                    investor.top_up(args.amount).await?;
                }
                print!("{}", investor.invest(args.amount).await?);
            }
            Command::Redeem(args) => {
                let investor = Investor::new(client, store.require(network.name())?)?;
                print!("{}", investor.redeem(args.shares).await?);
            }
            Command::RoundTrip(args) => {
                let investor = Investor::new(client, store.require(network.name())?)?;
                if args.top_up {
                    investor.top_up(args.amount).await?;
                }
                let outcome = investor.round_trip(args.amount).await?;
                print!("{}", outcome);
                if !outcome.passes(args.min_efficiency) {
                    return Err(eyre!(
                        "round trip efficiency {} is below the minimum of {}",
                        outcome.efficiency.to_percentage_string(),
                        args.min_efficiency.to_percentage_string()
                    ));
                }
            }
            Command::Verify(args) => {
                let deployment = store.require(network.name())?;
                let check = verify_previews(client, &deployment, args.amount).await?;
                print!("{}", check);
                // One base unit of USDC.
                if !check.within(FixedPoint::from(U256::exp10(12))) {
                    warn!("previews differ from the off-chain math");
                }
            }
            Command::Calc(args) => print!("{}", calc(&args)?),
        }
        Ok(())
    }
}

/// Previews an investment, the redemption of the shares it buys, and the
/// management fee accrued over `elapsed` seconds.
pub fn calc(args: &CalcArgs) -> Result<String> {
    let state = FundState::new(args.nav, args.supply)
        .with_fees(args.management_fee_bps, args.redemption_fee_bps)?;
    let investment = state.explain_investment(args.amount)?;
    let (after, _) = state.apply_investment(args.amount)?;
    let redemption = after.explain_redemption(investment.shares_out)?;
    let fee_shares = state.accrued_management_fee_shares(args.elapsed)?;

    let mut out = String::new();
    writeln!(out, "share price:   {}", state.share_price())?;
    writeln!(out, "investment of {} USDC", investment.usdc_in)?;
    writeln!(out, "  shares out:  {}", investment.shares_out)?;
    writeln!(out, "  nav after:   {}", investment.nav_after)?;
    writeln!(out, "  supply after: {}", investment.supply_after)?;
    writeln!(out, "redemption of {} MFC", redemption.shares_in)?;
    writeln!(out, "  gross:       {}", redemption.gross)?;
    writeln!(out, "  fee:         {}", redemption.fee)?;
    writeln!(out, "  usdc out:    {}", redemption.usdc_out)?;
    writeln!(
        out,
        "management fee after {}s: {} MFC",
        args.elapsed, fee_shares
    )?;
    Ok(out)
}
