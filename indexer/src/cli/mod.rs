use clap::{Parser, Subcommand};

pub mod database;
pub mod import;
pub mod rpc;
pub mod service;

#[derive(Parser, Debug)]
#[command(
    name = "vault-indexer",
    about = "Keeps per-vault import state in sync with the chain",
    long_about = "Computes the block ranges each vault is missing, turns them into the fewest RPC queries \
    the configured providers accept, runs them and records what was covered.",
    after_help = "Examples:\n  \
    vault-indexer run --providers-file bsc.yaml --entities-file vaults.json --memory-database\n  \
    vault-indexer inspect --import-key product:investment:42 --mongodb-connection-url mongodb://localhost:27017"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the chain runner until SIGINT or SIGTERM
    Run {
        #[command(flatten)]
        run_command: Box<RunCmd>,
    },
    /// Print one import state as JSON
    Inspect {
        #[command(flatten)]
        inspect_command: InspectCmd,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct RunCmd {
    #[clap(flatten)]
    pub database_args: database::DatabaseCliArgs,

    #[clap(flatten)]
    pub rpc_args: rpc::RpcCliArgs,

    #[clap(flatten)]
    pub import_args: import::ImportCliArgs,

    #[clap(flatten)]
    pub service_args: service::ServiceCliArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectCmd {
    #[clap(flatten)]
    pub database_args: database::DatabaseCliArgs,

    #[arg(long)]
    pub import_key: String,
}
