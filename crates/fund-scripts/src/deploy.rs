//! The idempotent deploy runner. Contracts are deployed in dependency order,
//! contracts that are already recorded and have code are reused, steps that
//! have completed are skipped, and the record is saved after every action so
//! an interrupted run picks up where it left off.

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use ethers::{
    abi::{Abi, Function, Token},
    contract::ContractFactory,
    providers::Middleware,
    types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest},
};
use eyre::{eyre, Result, WrapErr};
use fund_addresses::{Deployment, DeploymentStore, FeeConfig, FundMode};
use fund_wrappers::ArtifactStore;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    confirm,
    manifest::{tokenize_all, ContractSpec, Manifest, Step, DEPLOYER},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Start from an empty record instead of the existing one.
    pub fresh: bool,
    pub mode: FundMode,
    pub fees: FeeConfig,
}

/// What a run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploySummary {
    pub deployed: Vec<String>,
    pub reused: Vec<String>,
    pub steps_run: Vec<String>,
    pub steps_skipped: Vec<String>,
    pub record: PathBuf,
}

pub struct Deployer<M> {
    client: Arc<M>,
    store: DeploymentStore,
    artifacts: ArtifactStore,
    network: String,
}

impl<M: Middleware + 'static> Deployer<M> {
    pub fn new(
        client: Arc<M>,
        store: DeploymentStore,
        artifacts: ArtifactStore,
        network: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            artifacts,
            network: network.into(),
        }
    }

    /// Runs a manifest against the network's record.
    pub async fn run(
        &self,
        manifest: &Manifest,
        options: &DeployOptions,
    ) -> Result<(Deployment, DeploySummary)> {
        // Manifest errors surface before anything is sent.
        manifest.validate()?;
        let order = manifest.deployment_order()?;

        let _lock = self.store.lock(&self.network)?;
        let chain_id = self.client.get_chainid().await?.as_u64();
        let deployer = self
            .client
            .default_sender()
            .ok_or_else(|| eyre!("the client has no signer to deploy with"))?;
        let mut deployment = self.starting_record(chain_id, deployer, options)?;
        let mut summary = DeploySummary {
            record: self.store.path(&self.network),
            ..Default::default()
        };

        let mut with_code = BTreeSet::new();
        for spec in &order {
            if let Some(address) = deployment.contracts.get(&spec.name).copied() {
                if self.has_code(address).await? {
                    with_code.insert(address);
                }
            }
        }
        for (spec, action) in plan_contracts(&order, &deployment, &with_code) {
            match action {
                ContractAction::Reuse(address) => {
                    debug!(name = %spec.name, ?address, "reusing deployed contract");
                    summary.reused.push(spec.name.clone());
                    continue;
                }
                ContractAction::Deploy => {}
                ContractAction::Redeploy(address) => warn!(
                    name = %spec.name,
                    ?address,
                    "recorded contract has no code; redeploying"
                ),
                ContractAction::Cascade(dependency) => info!(
                    name = %spec.name,
                    %dependency,
                    "dependency was redeployed; redeploying"
                ),
            }

            let address = self.deploy_contract(spec, &deployment, deployer).await?;
            let forgotten = record_deployed(manifest, &mut deployment, spec, address);
            if !forgotten.is_empty() {
                debug!(name = %spec.name, ?forgotten, "steps will run again");
            }
            summary.deployed.push(spec.name.clone());
            self.save(&mut deployment)?;
        }

        for step in &manifest.steps {
            if deployment.is_step_completed(step.id()) {
                debug!(id = step.id(), "skipping completed step");
                summary.steps_skipped.push(step.id().to_string());
                continue;
            }
            self.run_step(manifest, step, &mut deployment, deployer)
                .await
                .wrap_err_with(|| format!("step {} failed", step.id()))?;
            deployment.mark_step_completed(step.id());
            summary.steps_run.push(step.id().to_string());
            self.save(&mut deployment)?;
        }

        info!(
            network = %self.network,
            deployed = summary.deployed.len(),
            reused = summary.reused.len(),
            steps = summary.steps_run.len(),
            skipped = summary.steps_skipped.len(),
            "deployment complete"
        );
        Ok((deployment, summary))
    }

    fn starting_record(
        &self,
        chain_id: u64,
        deployer: Address,
        options: &DeployOptions,
    ) -> Result<Deployment> {
        let fresh = || Deployment::new(&self.network, chain_id, deployer, options.mode, options.fees);
        if options.fresh {
            return Ok(fresh());
        }
        let Some(mut deployment) = self.store.load(&self.network)? else {
            return Ok(fresh());
        };
        // Legacy records don't carry a chain id.
        if deployment.chain_id == 0 {
            deployment.chain_id = chain_id;
        }
        if deployment.chain_id != chain_id {
            return Err(eyre!(
                "the {} record is for chain {} but the node is on chain {}; rerun with --fresh to start over",
                self.network,
                deployment.chain_id,
                chain_id
            ));
        }
        if deployment.mode != options.mode && deployment.contracts.contains_key(fund_addresses::FUND) {
            return Err(eyre!(
                "the {} record has a {:?} fund; rerun with --fresh to deploy a {:?} fund",
                self.network,
                deployment.mode,
                options.mode
            ));
        }
        deployment.mode = options.mode;
        deployment.fees = options.fees;
        Ok(deployment)
    }

    fn save(&self, deployment: &mut Deployment) -> Result<()> {
        deployment.touch();
        self.store.save(deployment)?;
        Ok(())
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        Ok(!self.client.get_code(address, None).await?.is_empty())
    }

    async fn deploy_contract(
        &self,
        spec: &ContractSpec,
        deployment: &Deployment,
        deployer: Address,
    ) -> Result<Address> {
        let artifact = self.artifacts.find(spec.artifact())?;
        let params = artifact
            .abi
            .constructor()
            .map(|constructor| constructor.inputs.clone())
            .unwrap_or_default();
        let args = tokenize_all(&spec.args, &params, &resolver(deployment, deployer))
            .wrap_err_with(|| format!("invalid constructor arguments for {}", spec.name))?;

        let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode()?, self.client.clone());
        let (contract, receipt) = factory
            .deploy_tokens(args)
            .wrap_err_with(|| format!("failed to encode the deployment of {}", spec.name))?
            .send_with_receipt()
            .await
            .wrap_err_with(|| format!("failed to deploy {}", spec.name))?;
        info!(
            name = %spec.name,
            artifact = spec.artifact(),
            address = ?contract.address(),
            tx = ?receipt.transaction_hash,
            "deployed"
        );
        Ok(contract.address())
    }

    async fn run_step(
        &self,
        manifest: &Manifest,
        step: &Step,
        deployment: &mut Deployment,
        deployer: Address,
    ) -> Result<()> {
        let target = deployment.contract(step.contract())?;
        let abi = self.abi_for(manifest, step.contract())?;
        match step {
            Step::Call { function, args, .. } => {
                let function = select_function(&abi, function, args.len())?;
                let tokens = tokenize_all(args, &function.inputs, &resolver(deployment, deployer))?;
                let tx = TransactionRequest::new()
                    .to(target)
                    .data(function.encode_input(&tokens)?);
                let receipt = confirm(
                    self.client.send_transaction(tx, None).await?.await?,
                    &format!("{}.{}", step.contract(), function.name),
                )?;
                info!(id = step.id(), tx = ?receipt.transaction_hash, "ran step");
            }
            Step::Discover {
                function, record_as, ..
            } => {
                let function = select_function(&abi, function, 0)?;
                let tx: TypedTransaction = TransactionRequest::new()
                    .to(target)
                    .data(function.encode_input(&[])?)
                    .into();
                let output = self.client.call(&tx, None).await?;
                let address = match function.decode_output(&output)?.first() {
                    Some(Token::Address(address)) => *address,
                    other => {
                        return Err(eyre!(
                            "{}.{} returned {:?}, expected an address",
                            step.contract(),
                            function.name,
                            other
                        ))
                    }
                };
                info!(id = step.id(), name = %record_as, ?address, "discovered");
                deployment.set_contract(record_as.clone(), address);
            }
        }
        Ok(())
    }

    /// The ABI of a contract named in the manifest. Discovered contracts are
    /// assumed to be ERC20s.
    fn abi_for(&self, manifest: &Manifest, name: &str) -> Result<Abi> {
        let artifact = match manifest.contract(name) {
            Some(spec) => spec.artifact(),
            None => "MockERC20",
        };
        Ok(self.artifacts.find(artifact)?.abi)
    }
}

/// What a run does with one contract of the manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractAction {
    /// Recorded and has code.
    Reuse(Address),
    /// Not in the record yet.
    Deploy,
    /// Recorded, but nothing lives at the address.
    Redeploy(Address),
    /// A constructor dependency is being deployed again.
    Cascade(String),
}

/// Decides which contracts are reused and which are deployed. `order` must
/// be a deployment order; `with_code` holds the recorded addresses that have
/// code on chain.
pub fn plan_contracts<'a>(
    order: &[&'a ContractSpec],
    deployment: &Deployment,
    with_code: &BTreeSet<Address>,
) -> Vec<(&'a ContractSpec, ContractAction)> {
    let mut deploying = BTreeSet::new();
    order
        .iter()
        .map(|spec| {
            let stale = spec
                .dependencies()
                .into_iter()
                .find(|dep| deploying.contains(dep));
            let action = match (deployment.contracts.get(&spec.name), stale) {
                (None, _) => ContractAction::Deploy,
                (Some(_), Some(dependency)) => ContractAction::Cascade(dependency),
                (Some(address), None) if with_code.contains(address) => {
                    ContractAction::Reuse(*address)
                }
                (Some(address), None) => ContractAction::Redeploy(*address),
            };
            if !matches!(action, ContractAction::Reuse(_)) {
                deploying.insert(spec.name.clone());
            }
            (*spec, action)
        })
        .collect()
}

/// Records a newly deployed contract and forgets the completed steps that
/// touch it. Returns the forgotten step ids.
pub fn record_deployed(
    manifest: &Manifest,
    deployment: &mut Deployment,
    spec: &ContractSpec,
    address: Address,
) -> Vec<String> {
    deployment.set_contract(spec.name.clone(), address);
    if let Some(token) = &spec.token {
        deployment.set_token(token.symbol.clone(), address);
    }
    deployment.forget_steps(|id| {
        manifest
            .step(id)
            .is_some_and(|step| step.references().contains(&spec.name))
    })
}

/// Picks the overload of `name` that takes `arity` arguments.
fn select_function<'a>(abi: &'a Abi, name: &str, arity: usize) -> Result<&'a Function> {
    abi.functions_by_name(name)
        .map_err(|_| eyre!("the abi has no function {}", name))?
        .iter()
        .find(|function| function.inputs.len() == arity)
        .ok_or_else(|| eyre!("{} has no overload taking {} arguments", name, arity))
}

/// Resolves `$Name` references against the record.
fn resolver(deployment: &Deployment, deployer: Address) -> impl Fn(&str) -> Result<Address> + '_ {
    move |name: &str| {
        if name == DEPLOYER {
            Ok(deployer)
        } else {
            deployment.contract(name)
        }
    }
}
