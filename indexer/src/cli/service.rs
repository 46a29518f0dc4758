use clap::Args;

fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if value == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Args)]
pub struct ServiceCliArgs {
    /// Upper bound on input objects grouped in one batch, before provider limits.
    #[arg(env = "VAULT_INDEXER_MAX_INPUT_TAKE", long, default_value = "500", value_parser = parse_positive_usize)]
    pub max_input_take: usize,

    /// Batches sent in parallel to a provider that declares no minimum delay.
    #[arg(env = "VAULT_INDEXER_WORK_CONCURRENCY", long, default_value = "10", value_parser = parse_positive_usize)]
    pub work_concurrency: usize,

    /// Outcomes buffered before an import state is written.
    #[arg(env = "VAULT_INDEXER_UPDATER_MAX_BUFFER", long, default_value = "100", value_parser = parse_positive_usize)]
    pub updater_max_buffer: usize,

    /// Milliseconds an outcome may wait in the buffer before an import state is written.
    #[arg(env = "VAULT_INDEXER_UPDATER_MAX_WAIT_MS", long, default_value = "1000")]
    pub updater_max_wait_ms: u64,

    /// Seconds given to workers and the import state updater to stop.
    #[arg(env = "VAULT_INDEXER_GRACEFUL_SHUTDOWN_TIMEOUT", long, default_value = "60")]
    pub graceful_shutdown_timeout: u64,
}
