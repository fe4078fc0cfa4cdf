//! Database collaborators and credentials.
//!
//! The pipeline only ever borrows a [`SourceConnection`] and a [`Warehouse`];
//! opening and closing them is the caller's job. Both are implemented for
//! `tokio_postgres::Client`.

mod credentials;
mod source;
mod warehouse;

pub use credentials::{Credentials, CredentialsType};
pub use source::{RowCursor, SimpleQueryCursor, SourceConnection, TextRow};
pub use warehouse::Warehouse;
