use std::sync::Arc;
use tracing::info;

use crate::cli::database::DatabaseCliArgs;
use crate::cli::RunCmd;
use crate::core::client::{
    CacheClient, ImportStateClient, InMemoryCacheClient, InMemoryImportStateClient, InMemoryLockClient,
    LockClient, MongoCacheClient, MongoDbClient, MongoLockClient,
};
use crate::error::IndexerResult;
use crate::types::limitations::RpcProvider;
use crate::types::params::database::DatabaseBackend;
use crate::types::params::providers::ProvidersFile;
use crate::types::params::{
    ChainParams, ImportBehaviour, LockParams, OptimizerDefaults, RetryConfig, StreamConfig,
};

/// Storage clients sharing one backend.
#[derive(Clone)]
pub struct Clients {
    pub import_states: Arc<dyn ImportStateClient>,
    pub locks: Arc<dyn LockClient>,
    pub cache: Arc<dyn CacheClient>,
}

impl Clients {
    pub async fn new(backend: &DatabaseBackend) -> IndexerResult<Self> {
        match backend {
            DatabaseBackend::MongoDb(mongo_config) => {
                let database_client = MongoDbClient::new(mongo_config).await?;
                let database = database_client.database();
                let cache = MongoCacheClient::new(database.clone()).await?;
                info!(database = %mongo_config.database_name, "Using MongoDB storage");
                Ok(Self {
                    import_states: Arc::new(database_client),
                    locks: Arc::new(MongoLockClient::new(database)),
                    cache: Arc::new(cache),
                })
            }
            DatabaseBackend::Memory => {
                info!("Using in-memory storage, nothing survives a restart");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            import_states: Arc::new(InMemoryImportStateClient::new()),
            locks: Arc::new(InMemoryLockClient::new()),
            cache: Arc::new(InMemoryCacheClient::new()),
        }
    }

    pub async fn from_cli_args(args: &DatabaseCliArgs) -> IndexerResult<Self> {
        let backend = DatabaseBackend::try_from(args.clone())?;
        Self::new(&backend).await
    }
}

/// Everything a chain runner needs, built once at startup and shared by `Arc`.
pub struct Config {
    chain: ChainParams,
    providers: Vec<RpcProvider>,
    behaviour: ImportBehaviour,
    optimizer: OptimizerDefaults,
    stream: StreamConfig,
    retry: RetryConfig,
    lock_params: LockParams,
    clients: Clients,
}

/// Runtime parameters of a [`Config`], kept apart from the clients so tests can build one directly.
#[derive(Debug, Clone)]
pub struct ConfigParams {
    pub chain: ChainParams,
    pub providers: Vec<RpcProvider>,
    pub behaviour: ImportBehaviour,
    pub optimizer: OptimizerDefaults,
    pub stream: StreamConfig,
    pub retry: RetryConfig,
    pub lock_params: LockParams,
}

impl Config {
    pub fn new(params: ConfigParams, clients: Clients) -> Self {
        Self {
            chain: params.chain,
            providers: params.providers,
            behaviour: params.behaviour,
            optimizer: params.optimizer,
            stream: params.stream,
            retry: params.retry,
            lock_params: params.lock_params,
            clients,
        }
    }

    /// Validates the command line, reads the providers file and connects to the storage backend.
    pub async fn from_run_cmd(run_cmd: &RunCmd) -> IndexerResult<Self> {
        let providers_file = ProvidersFile::from_yaml_file(&run_cmd.rpc_args.providers_file)?;
        let params = ConfigParams {
            chain: providers_file.chain_params(),
            providers: providers_file.providers,
            behaviour: ImportBehaviour::try_from(&run_cmd.import_args)?,
            optimizer: OptimizerDefaults::from(&run_cmd.import_args),
            stream: StreamConfig::from(&run_cmd.service_args),
            retry: RetryConfig::from(&run_cmd.rpc_args),
            lock_params: LockParams::from(&run_cmd.rpc_args),
        };
        let clients = Clients::from_cli_args(&run_cmd.database_args).await?;
        info!(
            chain = %params.chain.chain,
            providers = params.providers.len(),
            mode = %params.behaviour.mode,
            "Configuration loaded"
        );
        Ok(Self::new(params, clients))
    }

    pub fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn providers(&self) -> &[RpcProvider] {
        &self.providers
    }

    pub fn behaviour(&self) -> &ImportBehaviour {
        &self.behaviour
    }

    pub fn optimizer(&self) -> &OptimizerDefaults {
        &self.optimizer
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn lock_params(&self) -> &LockParams {
        &self.lock_params
    }

    pub fn import_states(&self) -> Arc<dyn ImportStateClient> {
        self.clients.import_states.clone()
    }

    pub fn locks(&self) -> Arc<dyn LockClient> {
        self.clients.locks.clone()
    }

    pub fn cache(&self) -> Arc<dyn CacheClient> {
        self.clients.cache.clone()
    }
}
