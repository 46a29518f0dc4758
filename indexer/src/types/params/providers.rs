use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::limitations::RpcProvider;
use crate::types::params::ChainParams;

/// Contents of the providers file: one chain and the probed limits of its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersFile {
    pub chain: String,
    pub ms_per_block_estimate: u64,
    #[serde(default = "default_latest_block_cache_ttl_ms")]
    pub latest_block_cache_ttl_ms: u64,
    pub providers: Vec<RpcProvider>,
}

fn default_latest_block_cache_ttl_ms() -> u64 {
    10_000
}

impl ProvidersFile {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidProvidersFile(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ProvidersFile =
            serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidProvidersFile(e.to_string()))?;
        if file.providers.is_empty() {
            return Err(ConfigError::InvalidProvidersFile(format!("no provider configured for chain {}", file.chain)));
        }
        if file.ms_per_block_estimate == 0 {
            return Err(ConfigError::InvalidProvidersFile("ms_per_block_estimate must be positive".to_string()));
        }
        Ok(file)
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            chain: self.chain.clone(),
            ms_per_block_estimate: self.ms_per_block_estimate,
            latest_block_cache_ttl: Duration::from_millis(self.latest_block_cache_ttl_ms),
        }
    }
}
