use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::error::IndexerError;
use crate::types::entity::ImportEntity;
use crate::types::import_state::{ImportData, ImportRanges, ProductImportData};
use crate::worker::traits::EntitySource;

/// Which product feed a contract entry imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractFeed {
    Investment,
    ShareRate,
    Rewards,
}

impl ContractFeed {
    fn as_str(&self) -> &'static str {
        match self {
            ContractFeed::Investment => "investment",
            ContractFeed::ShareRate => "share-rate",
            ContractFeed::Rewards => "rewards",
        }
    }
}

/// One vault contract, as listed in the entities file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntity {
    pub product_id: String,
    pub chain: String,
    pub contract_address: String,
    pub feed: ContractFeed,
    pub created_at_block: u64,
    pub created_at: DateTime<Utc>,
    /// End-of-life contracts get no new deposits.
    #[serde(default)]
    pub eol: bool,
}

impl ImportEntity for ContractEntity {
    fn import_key(&self) -> String {
        format!("product:{}:{}", self.feed.as_str(), self.product_id)
    }

    fn address(&self) -> &str {
        &self.contract_address
    }

    fn is_live(&self) -> bool {
        !self.eol
    }

    fn initial_import_data(&self, now: DateTime<Utc>) -> ImportData {
        let data = ProductImportData {
            product_id: self.product_id.clone(),
            chain: self.chain.clone(),
            contract_address: self.contract_address.clone(),
            contract_created_at_block: self.created_at_block,
            contract_created_date: self.created_at,
            ranges: ImportRanges::empty(now),
        };
        match self.feed {
            ContractFeed::Investment => ImportData::ProductInvestment(data),
            ContractFeed::ShareRate => ImportData::ProductShareRate(data),
            ContractFeed::Rewards => ImportData::ProductRewards(data),
        }
    }
}

/// Reads the contracts of one chain from a JSON file on every poll.
pub struct FileEntitySource {
    path: PathBuf,
    chain: String,
}

impl FileEntitySource {
    pub fn new(path: PathBuf, chain: impl Into<String>) -> Self {
        Self { path, chain: chain.into() }
    }

    fn read(&self) -> anyhow::Result<Vec<ContractEntity>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read entities file {}", self.path.display()))?;
        let entities: Vec<ContractEntity> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse entities file {}", self.path.display()))?;
        Ok(entities.into_iter().filter(|entity| entity.chain == self.chain).collect())
    }
}

#[async_trait]
impl EntitySource<ContractEntity> for FileEntitySource {
    async fn fetch_entities(&self) -> Result<Vec<ContractEntity>, IndexerError> {
        let entities = self.read()?;
        debug!(path = %self.path.display(), entities = entities.len(), "Entities file read");
        Ok(entities)
    }
}
