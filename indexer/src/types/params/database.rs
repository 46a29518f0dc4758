use crate::cli::database::DatabaseCliArgs;
use crate::error::ConfigError;

/// Validated MongoDB parameters
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub connection_url: String,
    pub database_name: String,
}

/// Where import state, locks and cache entries live.
#[derive(Debug, Clone)]
pub enum DatabaseBackend {
    MongoDb(MongoConfig),
    /// Process-local storage, lost on restart.
    Memory,
}

impl TryFrom<DatabaseCliArgs> for DatabaseBackend {
    type Error = ConfigError;

    fn try_from(args: DatabaseCliArgs) -> Result<Self, Self::Error> {
        if args.memory_database {
            return Ok(DatabaseBackend::Memory);
        }
        let connection_url = args
            .mongodb_connection_url
            .ok_or_else(|| ConfigError::MissingArgument("mongodb_connection_url".to_string()))?;
        let database_name = args
            .mongodb_database_name
            .ok_or_else(|| ConfigError::MissingArgument("mongodb_database_name".to_string()))?;
        Ok(DatabaseBackend::MongoDb(MongoConfig { connection_url, database_name }))
    }
}
