//! DB to Redshift
//!
//! Runs a query against a source database, streams the result to S3 as
//! delimited text without touching local disk, then loads it into Redshift
//! with a single `COPY`.

pub mod cli;
pub mod client;
pub mod config;
pub mod destination;
pub mod error;
pub mod etl;
pub mod storage;
pub mod table;

// Re-exports for convenience
pub use client::{Credentials, CredentialsType, SourceConnection, Warehouse};
pub use config::Config;
pub use destination::{Delimiter, Destination, TargetTable};
pub use error::{Error, Result, Stage};
pub use etl::{CopyStatement, Pipeline, RunReport, StreamingTransform};
pub use storage::{BlobStore, ObjectStoreBlob, S3Settings};
pub use table::{Row, Table};
