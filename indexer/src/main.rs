use clap::Parser as _;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use vault_indexer::cli::{Cli, Commands, InspectCmd, RunCmd};
use vault_indexer::connector::{ContractEntity, FileEntitySource, LoggingErrorSink, RawLogsFetcher};
use vault_indexer::core::config::{Clients, Config};
use vault_indexer::utils::logging::init_logging;
use vault_indexer::utils::signal_handler::SignalHandler;
use vault_indexer::worker::ChainRunner;
use vault_indexer::{IndexerError, IndexerResult};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { run_command } => {
            info!("Executing run command with args: {:?}", run_command);
            if let Err(e) = run_indexer(run_command).await {
                error!(error = %e, error_chain = ?e, "Indexer stopped with an error");
                panic!("Indexer stopped with an error: {}", e);
            }
            info!("Indexer stopped");
        }
        Commands::Inspect { inspect_command } => {
            if let Err(e) = inspect_import_state(inspect_command).await {
                error!(error = %e, error_chain = ?e, "Failed to inspect import state");
                panic!("Failed to inspect import state: {}", e);
            }
        }
    }
}

async fn run_indexer(run_cmd: &RunCmd) -> IndexerResult<()> {
    let config = Arc::new(Config::from_run_cmd(run_cmd).await?);
    debug!("Configuration initialized");

    let source =
        Arc::new(FileEntitySource::new(run_cmd.import_args.entities_file.clone(), config.chain().chain.clone()));
    let fetcher =
        Arc::new(RawLogsFetcher::new(config.providers(), Duration::from_secs(run_cmd.rpc_args.rpc_timeout_secs)));
    let runner: ChainRunner<ContractEntity> = ChainRunner::new(config.clone(), source, fetcher, Arc::new(LoggingErrorSink));

    let mut signal_handler = SignalHandler::new();
    let shutdown = signal_handler.shutdown_token();
    let runner_handle = tokio::spawn(async move {
        let result = runner.run(shutdown.clone()).await;
        // a runner that stops on its own takes the process down with it
        shutdown.cancel();
        result
    });

    signal_handler.wait_for_shutdown().await;
    signal_handler
        .handle_graceful_shutdown(
            || async move {
                runner_handle.await.map_err(anyhow::Error::from)?.map_err(anyhow::Error::from)
            },
            run_cmd.service_args.graceful_shutdown_timeout,
        )
        .await
        .map_err(IndexerError::from)
}

#[allow(clippy::print_stdout)]
async fn inspect_import_state(inspect_cmd: &InspectCmd) -> IndexerResult<()> {
    let clients = Clients::from_cli_args(&inspect_cmd.database_args).await?;
    match clients.import_states.get_import_state(&inspect_cmd.import_key).await? {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => info!(import_key = %inspect_cmd.import_key, "No import state stored under this key"),
    }
    Ok(())
}
