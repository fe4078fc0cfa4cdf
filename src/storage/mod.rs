//! Staged object storage
//!
//! This module handles the object side of a run:
//! - the delimited-text dialect of the staged object
//! - streaming uploads to blob storage

mod blob;
pub mod delimited;

pub use blob::{BlobStore, ObjectStoreBlob, S3Settings};
