use clap::Args;

/// Parameters used to config the storage backend.
#[derive(Debug, Clone, Args)]
pub struct DatabaseCliArgs {
    /// Keep import state, locks and cache in process memory. Nothing survives a restart.
    #[arg(env = "VAULT_INDEXER_MEMORY_DATABASE", long, default_value_t = false)]
    pub memory_database: bool,

    /// The connection string to the MongoDB server.
    #[arg(env = "VAULT_INDEXER_MONGODB_CONNECTION_URL", long, required_unless_present = "memory_database")]
    pub mongodb_connection_url: Option<String>,

    /// The name of the database.
    #[arg(env = "VAULT_INDEXER_DATABASE_NAME", long, default_value = "vault_indexer")]
    pub mongodb_database_name: Option<String>,
}
