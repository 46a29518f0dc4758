use async_trait::async_trait;
use tracing::warn;

use crate::types::entity::ImportEntity;
use crate::worker::traits::{ErrorReport, ErrorSink};

/// Logs every failed range; the range stays in `to_retry` for a later pass.
#[derive(Debug, Default)]
pub struct LoggingErrorSink;

#[async_trait]
impl<E: ImportEntity> ErrorSink<E> for LoggingErrorSink {
    async fn report(&self, obj: &E, report: ErrorReport) {
        warn!(
            import_key = %report.import_key,
            address = obj.address(),
            range = %report.range,
            provider = %report.provider,
            error_type = report.error_type,
            error = %report.message,
            "Range import failed"
        );
    }
}
