use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use strum_macros::{Display, EnumIter};
use url::Url;
use uuid::Uuid;

/// RPC methods the engine knows how to budget for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RpcCallKind {
    EthCall,
    EthGetLogs,
    EthGetBlockByNumber,
    EthGetTransactionReceipt,
    EthGetBalance,
    EthBlockNumber,
}

/// Minimum spacing a provider requires between two physical calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MinDelay {
    /// The provider tolerates concurrent calls.
    NoLimit,
    /// Milliseconds between calls.
    #[serde(untagged)]
    Millis(u64),
}

impl MinDelay {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            MinDelay::NoLimit => None,
            MinDelay::Millis(ms) => Some(Duration::from_millis(*ms)),
        }
    }
}

/// Batching and pacing limits of one provider, probed once at startup.
///
/// A `None` batch size in `methods` means the provider was found unsafe to batch
/// for that method and calls have to go one at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcLimitations {
    #[serde(default)]
    pub is_archive_node: bool,
    pub min_delay_between_calls: MinDelay,
    #[serde(default)]
    pub max_get_logs_block_span: Option<u64>,
    #[serde(default)]
    pub max_get_logs_address_batch_size: Option<usize>,
    #[serde(default)]
    pub methods: HashMap<RpcCallKind, Option<usize>>,
    /// Overrides the weight derived from `min_delay_between_calls`.
    #[serde(default)]
    pub weight: Option<u64>,
}

/// How many calls of each kind one input object costs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcCallsPerEntity(HashMap<RpcCallKind, u32>);

impl RpcCallsPerEntity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: RpcCallKind, count: u32) -> Self {
        self.0.insert(kind, count);
        self
    }

    pub fn count(&self, kind: RpcCallKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or(0)
    }
}

/// An RPC endpoint together with its limitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcProvider {
    pub url: Url,
    pub limitations: RpcLimitations,
}

impl RpcProvider {
    /// Key under which the provider's lock and last-call record are stored, also its name in logs.
    ///
    /// API keys travel in the path or the query string, so both are replaced by a digest
    /// of the full URL. Two keys on one host still get separate records.
    pub fn lock_key(&self) -> String {
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, self.url.as_str().as_bytes()).simple().to_string();
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}://{}:{}/{}", self.url.scheme(), host, port, &digest[..12]),
            None => format!("{}://{}/{}", self.url.scheme(), host, &digest[..12]),
        }
    }
}
