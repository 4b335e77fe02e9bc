//! Connections to the chain: an RPC provider, an optional ephemeral anvil
//! node, and a signing client with retries and nonce management.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    core::utils::Anvil,
    middleware::{
        gas_escalator::{Frequency, GeometricGasPrice},
        nonce_manager::NonceManagerError,
        GasEscalatorMiddleware, MiddlewareError, NonceManagerMiddleware, SignerMiddleware,
    },
    providers::{
        Http, HttpClientError, HttpRateLimitRetryPolicy, Middleware, PendingTransaction, Provider,
        RetryClient, RetryClientBuilder, RetryPolicy,
    },
    signers::Signer,
    types::{transaction::eip2718::TypedTransaction, Address, BlockId, U256},
    utils::AnvilInstance,
};
use eyre::{eyre, Result};
use tracing::{debug, info};

/// A retry policy that will retry on rate limit errors, timeout errors, and
/// "intrinsic gas too high".
#[derive(Debug, Default)]
struct ChainRetryPolicy(HttpRateLimitRetryPolicy);

impl RetryPolicy<HttpClientError> for ChainRetryPolicy {
    fn should_retry(&self, error: &HttpClientError) -> bool {
        self.0.should_retry(error) || error.to_string().contains("intrinsic gas too high")
    }

    fn backoff_hint(&self, error: &HttpClientError) -> Option<Duration> {
        self.0.backoff_hint(error).or_else(|| {
            error
                .to_string()
                .contains("intrinsic gas too high")
                .then(|| Duration::from_millis(100))
        })
    }
}

type ChainClientProvider = Arc<RetryClient<Http>>;

type ChainClientInner<S> =
    NonceManagerMiddleware<SignerMiddleware<GasEscalatorMiddleware<Provider<ChainClientProvider>>, S>>;

/// A client with a provider stack that includes a retry policy, nonce manager,
/// signer, and gas escalator.
#[derive(Debug)]
pub struct ChainClient<S: Signer + 'static> {
    inner: ChainClientInner<S>,
    address: Address,
}

impl<S: Signer + 'static> ChainClient<S> {
    pub async fn new(provider: Provider<Http>, signer: S) -> Result<Self> {
        let interval = provider.get_interval();
        let provider = RetryClientBuilder::default()
            .rate_limit_retries(10)
            .timeout_retries(3)
            .initial_backoff(Duration::from_millis(100))
            .build(
                provider.as_ref().clone(),
                Box::<ChainRetryPolicy>::default(),
            );
        let provider = Provider::new(Arc::new(provider)).interval(interval);

        let inner = GasEscalatorMiddleware::new(
            provider,
            GeometricGasPrice::new(1.125, 10u64, None::<u64>),
            Frequency::PerBlock,
        );
        let inner = SignerMiddleware::new_with_provider_chain(inner, signer).await?;
        let address = inner.address();
        let inner = NonceManagerMiddleware::new(inner, address);

        Ok(Self { inner, address })
    }

    /// Gets the client's address.
    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl<S: Signer + 'static> Middleware for ChainClient<S> {
    // Pass-through middleware, so the error is the one from the top of the
    // stack.
    type Error = NonceManagerError<Self::Inner>;

    type Provider = ChainClientProvider;
    type Inner = ChainClientInner<S>;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn default_sender(&self) -> Option<Address> {
        Some(self.address)
    }

    async fn send_transaction<T: Into<TypedTransaction> + Send + Sync>(
        &self,
        tx: T,
        block: Option<BlockId>,
    ) -> Result<PendingTransaction<'_, Self::Provider>, Self::Error> {
        Ok(self
            .inner
            .send_transaction(tx, block)
            .await
            .map_err(MiddlewareError::from_err)?)
    }
}

/// A connected chain. Local development nodes (anvil or a Hardhat node) also
/// get the cheat-code helpers used by tests and by funding top-ups.
pub struct Chain {
    provider: Provider<Http>,
    chain_id: u64,
    client_version: String,
    _maybe_anvil: Option<AnvilInstance>,
}

impl Chain {
    /// Connects to an RPC URL. Without one, an ephemeral anvil node is
    /// spawned and lives as long as the `Chain`.
    pub async fn connect(maybe_rpc_url: Option<String>) -> Result<Self> {
        let (provider, maybe_anvil) = match maybe_rpc_url {
            Some(rpc_url) => (Provider::<Http>::try_from(rpc_url)?, None),
            None => {
                let anvil = Anvil::new().spawn();
                info!(endpoint = %anvil.endpoint(), "spawned anvil");
                (Provider::<Http>::try_from(anvil.endpoint())?, Some(anvil))
            }
        };
        let provider = provider.interval(Duration::from_millis(
            if maybe_anvil.is_some() { 10 } else { 1_000 },
        ));
        let chain_id = provider.get_chainid().await?.as_u64();
        let client_version = provider.client_version().await?;
        debug!(chain_id, client_version = %client_version, "connected");
        Ok(Self {
            provider,
            chain_id,
            client_version,
            _maybe_anvil: maybe_anvil,
        })
    }

    /// A provider that can access the chain.
    pub fn provider(&self) -> Provider<Http> {
        self.provider.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// A client that can access the chain.
    pub async fn client<S: Signer + 'static>(&self, signer: S) -> Result<Arc<ChainClient<S>>> {
        let signer = signer.with_chain_id(self.chain_id);
        Ok(Arc::new(ChainClient::new(self.provider(), signer).await?))
    }

    /// Checks to see if the chain is a local development node that accepts
    /// cheat codes.
    pub fn is_dev(&self) -> bool {
        let version = self.client_version.to_lowercase();
        version.contains("anvil") || version.contains("hardhat")
    }

    fn require_dev(&self, action: &str) -> Result<()> {
        if !self.is_dev() {
            return Err(eyre!(
                "can't {} on {}; only local development nodes support it",
                action,
                self.client_version
            ));
        }
        Ok(())
    }

    /// Snapshots the chain.
    pub async fn snapshot(&self) -> Result<U256> {
        self.require_dev("snapshot")?;
        Ok(self.provider.request("evm_snapshot", ()).await?)
    }

    /// Reverts the chain to a previous snapshot.
    pub async fn revert<U: Into<U256>>(&self, id: U) -> Result<()> {
        self.require_dev("revert")?;
        self.provider
            .request::<[U256; 1], bool>("evm_revert", [id.into()])
            .await?;
        Ok(())
    }

    /// Increases the chain's time and mines a block.
    pub async fn increase_time(&self, seconds: u64) -> Result<()> {
        self.require_dev("increase time")?;
        self.provider
            .request::<[u64; 1], serde_json::Value>("evm_increaseTime", [seconds])
            .await?;
        self.provider
            .request::<(), serde_json::Value>("evm_mine", ())
            .await?;
        Ok(())
    }

    /// Adds ether to an address.
    pub async fn deal<U: Into<U256>>(&self, address: Address, amount: U) -> Result<()> {
        self.require_dev("set balances")?;
        let balance = self.provider.get_balance(address, None).await?;
        self.provider
            .request::<(Address, U256), serde_json::Value>(
                "hardhat_setBalance",
                (address, balance + amount.into()),
            )
            .await?;
        Ok(())
    }
}
