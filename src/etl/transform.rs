//! Streaming transform: serialize a table while uploading it
//!
//! Two tasks share a bounded [`pipe`]:
//! - the serializer (a blocking task) encodes rows into the writer half
//! - the uploader streams the reader half to blob storage
//!
//! The serialized object never exists in full anywhere but its destination.
//! Both tasks are always awaited before [`StreamingTransform::stage`] returns.

use super::pipe::{self, PipeWriter};
use crate::destination::Delimiter;
use crate::error::{Error, Result};
use crate::storage::{BlobStore, delimited};
use crate::table::Table;
use eyre::eyre;
use std::io;
use std::sync::Arc;

/// Outcome of a successful staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub bucket: String,
    pub key: String,
    pub rows: usize,
    pub bytes: u64,
}

/// Why the serializer stopped early
#[derive(Debug)]
enum SerializeError {
    /// The uploader stopped reading; its own error is the one to report
    ReaderGone,
    Failed(eyre::Report),
}

/// Serializes tables to delimited text and streams them into a bucket
///
/// # Example
/// ```no_run
/// use db_to_redshift::etl::StreamingTransform;
/// use db_to_redshift::storage::ObjectStoreBlob;
/// use db_to_redshift::{Delimiter, Table};
/// use object_store::memory::InMemory;
/// use std::sync::Arc;
///
/// # async fn example(table: Table) -> db_to_redshift::Result<()> {
/// let blob = ObjectStoreBlob::new().with_bucket("staging", Arc::new(InMemory::new()));
/// let transform = StreamingTransform::new(Arc::new(blob), "staging", Delimiter::TAB);
/// let staged = transform.stage(table, "exports/users.tsv").await?;
/// println!("staged {} bytes", staged.bytes);
/// # Ok(())
/// # }
/// ```
pub struct StreamingTransform<B> {
    blob: Arc<B>,
    bucket: String,
    delimiter: Delimiter,
    capacity: usize,
    chunk_size: usize,
}

impl<B: BlobStore> StreamingTransform<B> {
    pub fn new(blob: Arc<B>, bucket: impl Into<String>, delimiter: Delimiter) -> Self {
        Self {
            blob,
            bucket: bucket.into(),
            delimiter,
            capacity: pipe::DEFAULT_CAPACITY,
            chunk_size: pipe::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the pipe buffer: at most `capacity` chunks of `chunk_size` bytes in flight
    pub fn with_buffer(mut self, capacity: usize, chunk_size: usize) -> Self {
        self.capacity = capacity;
        self.chunk_size = chunk_size;
        self
    }

    /// Serialize `table` and upload it to `key`
    ///
    /// Consumes the table. On failure the object at `key` may be missing or
    /// left from an earlier run; nothing is cleaned up here.
    ///
    /// # Errors
    /// [`Error::Transform`] with the first meaningful error from either task
    pub async fn stage(&self, table: Table, key: &str) -> Result<StagedObject> {
        let rows = table.len();
        let (writer, reader) = pipe::pipe(self.capacity, self.chunk_size);

        log::debug!(
            "Streaming {} row(s) to s3://{}/{}",
            rows,
            self.bucket,
            key
        );

        let delimiter = self.delimiter;
        let serializer = tokio::task::spawn_blocking(move || serialize(table, delimiter, writer));

        let blob = Arc::clone(&self.blob);
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let uploader =
            tokio::spawn(async move { blob.put_stream(&bucket, &object_key, reader).await });

        // Full join: neither outcome is dropped, whichever finishes first
        let (serialized, uploaded) = tokio::join!(serializer, uploader);

        let serialized = serialized
            .map_err(|e| Error::Transform(eyre::Report::new(e).wrap_err("Serializer task failed")));
        let uploaded = uploaded
            .map_err(|e| Error::Transform(eyre::Report::new(e).wrap_err("Uploader task failed")));

        let (written, sent) = first_error(serialized, uploaded)?;
        if written != sent {
            return Err(Error::Transform(eyre!(
                "Serialized {} byte(s) but uploaded {}",
                written,
                sent
            )));
        }

        log::info!(
            "Staged {} row(s), {} byte(s) at s3://{}/{}",
            rows,
            sent,
            self.bucket,
            key
        );
        Ok(StagedObject {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            rows,
            bytes: sent,
        })
    }
}

type Joined<T> = Result<std::result::Result<T, SerializeError>>;
type Uploaded = Result<eyre::Result<u64>>;

/// Pick the error to surface once both tasks have finished
///
/// A task that died (panicked) wins first. Then a real serialization failure,
/// since the uploader only ever sees its echo. When the serializer merely saw
/// the uploader hang up, the uploader's own error is the cause.
fn first_error(serialized: Joined<u64>, uploaded: Uploaded) -> Result<(u64, u64)> {
    let serialized = serialized?;
    let uploaded = uploaded?;

    match (serialized, uploaded) {
        (Ok(written), Ok(sent)) => Ok((written, sent)),
        (Err(SerializeError::Failed(report)), _) => Err(Error::Transform(report)),
        (_, Err(report)) => Err(Error::Transform(report)),
        (Err(SerializeError::ReaderGone), Ok(sent)) => Err(Error::Transform(eyre!(
            "Upload finished after {} byte(s) without reading the whole stream",
            sent
        ))),
    }
}

/// Encode every row into the pipe, closing it cleanly only on success
///
/// On failure the writer is dropped unclosed, which the reader observes as an
/// aborted stream.
fn serialize(
    table: Table,
    delimiter: Delimiter,
    sink: PipeWriter,
) -> std::result::Result<u64, SerializeError> {
    let mut wtr = delimited::writer(delimiter, sink);

    for (index, row) in table.rows().iter().enumerate() {
        delimited::write_row(&mut wtr, row).map_err(|e| match e.kind() {
            csv::ErrorKind::Io(source) if source.kind() == io::ErrorKind::BrokenPipe => {
                SerializeError::ReaderGone
            }
            _ => SerializeError::Failed(eyre::Report::new(e).wrap_err(format!(
                "Failed to serialize row {}",
                index
            ))),
        })?;
    }

    let sink = wtr.into_inner().map_err(|e| classify(e.into_error()))?;
    let written = sink.close().map_err(classify)?;
    log::debug!("Serializer wrote {} row(s), {} byte(s)", table.len(), written);
    Ok(written)
}

fn classify(err: io::Error) -> SerializeError {
    if err.kind() == io::ErrorKind::BrokenPipe {
        SerializeError::ReaderGone
    } else {
        SerializeError::Failed(eyre::Report::new(err).wrap_err("Failed to flush serialized rows"))
    }
}
