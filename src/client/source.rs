//! Source database contract
//!
//! A source runs arbitrary query text and hands back a cursor whose rows can be
//! read column by column as nullable text. The query is not inspected or
//! sanitized here; that stays the caller's job.

use eyre::{Context, Result};
use std::future::Future;
use tokio_postgres::{SimpleQueryMessage, SimpleQueryRow};

/// A connection that can run a query and return its rows as text
pub trait SourceConnection: Send + Sync {
    /// Cursor over one query result
    type Cursor: RowCursor;

    /// Execute `query` and open a cursor over its result set
    ///
    /// # Errors
    /// Returns an error if the query cannot be executed
    fn execute_query(&self, query: &str) -> impl Future<Output = Result<Self::Cursor>> + Send;
}

/// A result cursor. Released when dropped.
pub trait RowCursor: Send {
    type Row: TextRow + Send;

    /// Ordered column names of the result set
    fn columns(&self) -> Result<Vec<String>>;

    /// Advance to the next row, `None` once the result is exhausted
    fn next_row(&mut self) -> impl Future<Output = Result<Option<Self::Row>>> + Send;
}

/// A row whose columns can each be read as nullable text
pub trait TextRow {
    fn text(&self, index: usize) -> Result<Option<String>>;
}

/// Rows returned by the Postgres simple-query protocol, which sends every
/// value in its text form regardless of column type.
pub struct SimpleQueryCursor {
    columns: Option<Vec<String>>,
    rows: std::vec::IntoIter<SimpleQueryRow>,
}

/// One step of a simple-query response
enum ResultEvent<R> {
    Columns(Vec<String>),
    Row(R),
    Complete,
}

/// Collect the only result set in `events`
///
/// Statements that return no rows (`SET`, DDL) may surround it. A row with no
/// description before it opens a set whose columns come from `columns_of`.
fn single_result_set<R>(
    events: impl IntoIterator<Item = ResultEvent<R>>,
    columns_of: impl Fn(&R) -> Vec<String>,
) -> Result<(Option<Vec<String>>, Vec<R>)> {
    let mut columns = None;
    let mut open = false;
    let mut rows = Vec::new();

    for event in events {
        match event {
            ResultEvent::Columns(names) => {
                if columns.is_some() {
                    eyre::bail!("Query returned more than one result set");
                }
                columns = Some(names);
                open = true;
            }
            ResultEvent::Row(row) => {
                if !open {
                    if columns.is_some() {
                        eyre::bail!("Query returned more than one result set");
                    }
                    columns = Some(columns_of(&row));
                    open = true;
                }
                rows.push(row);
            }
            ResultEvent::Complete => open = false,
        }
    }

    Ok((columns, rows))
}

impl SimpleQueryCursor {
    fn from_messages(messages: Vec<SimpleQueryMessage>) -> Result<Self> {
        let events = messages.into_iter().filter_map(|message| match message {
            SimpleQueryMessage::RowDescription(description) => Some(ResultEvent::Columns(
                description.iter().map(|c| c.name().to_string()).collect(),
            )),
            SimpleQueryMessage::Row(row) => Some(ResultEvent::Row(row)),
            SimpleQueryMessage::CommandComplete(_) => Some(ResultEvent::Complete),
            _ => None,
        });
        let (columns, rows) = single_result_set(events, |row: &SimpleQueryRow| {
            row.columns().iter().map(|c| c.name().to_string()).collect()
        })?;

        Ok(Self {
            columns,
            rows: rows.into_iter(),
        })
    }
}

impl RowCursor for SimpleQueryCursor {
    type Row = SimpleQueryRow;

    fn columns(&self) -> Result<Vec<String>> {
        self.columns
            .clone()
            .ok_or_else(|| eyre::eyre!("Query did not return a result set"))
    }

    async fn next_row(&mut self) -> Result<Option<Self::Row>> {
        Ok(self.rows.next())
    }
}

impl TextRow for SimpleQueryRow {
    fn text(&self, index: usize) -> Result<Option<String>> {
        let value = self
            .try_get(index)
            .with_context(|| format!("Failed to read column {} as text", index))?;
        Ok(value.map(str::to_string))
    }
}

impl SourceConnection for tokio_postgres::Client {
    type Cursor = SimpleQueryCursor;

    async fn execute_query(&self, query: &str) -> Result<Self::Cursor> {
        log::debug!("Running source query ({} bytes)", query.len());
        let messages = self
            .simple_query(query)
            .await
            .with_context(|| "Failed to execute source query")?;
        SimpleQueryCursor::from_messages(messages)
    }
}
