//! Warehouse contract: execute one statement, report success or failure

use eyre::{Context, Result};
use std::future::Future;

pub trait Warehouse: Send + Sync {
    /// Execute `statement` exactly once
    ///
    /// # Errors
    /// Returns the warehouse's error unchanged apart from added context
    fn execute_statement(&self, statement: &str) -> impl Future<Output = Result<()>> + Send;
}

// Redshift speaks the Postgres wire protocol; COPY goes through the simple
// query protocol so no parameter binding is attempted.
impl Warehouse for tokio_postgres::Client {
    async fn execute_statement(&self, statement: &str) -> Result<()> {
        self.batch_execute(statement)
            .await
            .with_context(|| "Warehouse rejected statement")
    }
}
