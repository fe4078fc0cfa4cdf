//! Extraction: run the source query and materialize every row as text

use crate::client::{RowCursor, SourceConnection, TextRow};
use crate::error::{Error, Result};
use crate::table::{Row, Table};
use eyre::Context;

/// Reads a full query result from a borrowed source connection
///
/// # Example
/// ```no_run
/// use db_to_redshift::etl::QueryExtractor;
///
/// # async fn example(source: &tokio_postgres::Client) -> db_to_redshift::Result<()> {
/// let table = QueryExtractor::new(source).extract("SELECT id, name FROM users").await?;
/// println!("{} rows x {} columns", table.len(), table.width());
/// # Ok(())
/// # }
/// ```
pub struct QueryExtractor<'a, S> {
    source: &'a S,
}

impl<'a, S: SourceConnection> QueryExtractor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Execute `query` and read every row
    ///
    /// The column count is fixed once from the result metadata; each row is
    /// then read as exactly that many nullable text values. The cursor is
    /// released on every exit path, and no partial table is returned.
    ///
    /// # Errors
    /// [`Error::Extraction`] if the query, the column metadata, or any row read fails
    pub async fn extract(&self, query: &str) -> Result<Table> {
        self.read_table(query).await.map_err(Error::Extraction)
    }

    async fn read_table(&self, query: &str) -> eyre::Result<Table> {
        let mut cursor = self.source.execute_query(query).await?;

        let columns = cursor
            .columns()
            .with_context(|| "Failed to read result columns")?;
        let width = columns.len();
        log::debug!("Query returned {} column(s): {}", width, columns.join(", "));

        let mut table = Table::new(columns);
        while let Some(row) = cursor
            .next_row()
            .await
            .with_context(|| format!("Failed to fetch row {}", table.len()))?
        {
            let mut fields = Vec::with_capacity(width);
            for index in 0..width {
                let value = row
                    .text(index)
                    .with_context(|| format!("Failed to read row {}", table.len()))?;
                fields.push(value);
            }
            table.push(Row::new(fields))?;
        }

        log::info!("Extracted {} row(s)", table.len());
        Ok(table)
    }
}
