//! Pipeline orchestration: extract, stage, load

use super::{CopyLoader, CopyStatement, QueryExtractor, StreamingTransform};
use crate::client::{SourceConnection, Warehouse};
use crate::destination::{Destination, TargetTable};
use crate::error::Result;
use crate::storage::BlobStore;
use std::sync::Arc;

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub rows: usize,
    pub bytes: u64,
    pub object_uri: String,
    /// The executed statement with credentials masked
    pub statement: String,
}

/// Moves one query result into a Redshift table through S3
///
/// Built purely from injected collaborators. The source and warehouse
/// connections are borrowed for the pipeline's lifetime and never opened or
/// closed here.
///
/// # Type Parameters
/// - `S`: source connection
/// - `B`: blob store receiving the staged object
/// - `W`: warehouse connection executing the COPY
///
/// # Example
/// ```no_run
/// use db_to_redshift::etl::Pipeline;
/// use db_to_redshift::storage::{ObjectStoreBlob, S3Settings};
/// use db_to_redshift::{Destination, TargetTable};
/// use std::sync::Arc;
///
/// # async fn example(
/// #     source: tokio_postgres::Client,
/// #     redshift: tokio_postgres::Client,
/// # ) -> eyre::Result<()> {
/// let destination = Destination::new("staging", "users.tsv").with_prefix("exports");
/// let blob = ObjectStoreBlob::s3("staging", &S3Settings {
///     region: destination.region.clone(),
///     ..Default::default()
/// })?;
///
/// let pipeline = Pipeline::new(
///     &source,
///     Arc::new(blob),
///     &redshift,
///     destination,
///     TargetTable::new("public", "users"),
/// );
///
/// let report = pipeline.run("SELECT * FROM users").await?;
/// println!("Loaded {} rows", report.rows);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<'a, S, B, W> {
    source: &'a S,
    blob: Arc<B>,
    warehouse: &'a W,
    destination: Destination,
    target: TargetTable,
    buffer: Option<(usize, usize)>,
}

impl<'a, S, B, W> Pipeline<'a, S, B, W>
where
    S: SourceConnection,
    B: BlobStore,
    W: Warehouse,
{
    /// Create a new pipeline
    pub fn new(
        source: &'a S,
        blob: Arc<B>,
        warehouse: &'a W,
        destination: Destination,
        target: TargetTable,
    ) -> Self {
        Self {
            source,
            blob,
            warehouse,
            destination,
            target,
            buffer: None,
        }
    }

    /// Override the transform's pipe buffer (chunks in flight, bytes per chunk)
    pub fn with_buffer(mut self, capacity: usize, chunk_size: usize) -> Self {
        self.buffer = Some((capacity, chunk_size));
        self
    }

    /// The COPY statement a run will execute
    pub fn statement(&self) -> CopyStatement {
        CopyStatement::new(&self.target, &self.destination)
    }

    /// Run the complete pipeline
    ///
    /// Steps:
    /// 1. Extract the query result
    /// 2. Serialize and stream it to `prefix/key`
    /// 3. COPY it into the target table
    ///
    /// An empty result still stages an empty object and runs the COPY.
    ///
    /// # Errors
    /// The first stage error, unchanged; later stages do not run.
    /// A failure after staging began can leave a partial or complete object
    /// behind with nothing loaded.
    pub async fn run(&self, query: &str) -> Result<RunReport> {
        self.destination.validate()?;
        self.target.validate()?;

        let key = self.destination.object_key();
        let statement = self.statement();
        log::info!("Starting pipeline into {}", self.target);

        // Extract
        log::debug!("Extracting from source...");
        let table = QueryExtractor::new(self.source).extract(query).await?;

        // Transform
        log::debug!("Staging {}...", statement.object_uri());
        let mut transform = StreamingTransform::new(
            Arc::clone(&self.blob),
            self.destination.bucket.clone(),
            self.destination.delimiter,
        );
        if let Some((capacity, chunk_size)) = self.buffer {
            transform = transform.with_buffer(capacity, chunk_size);
        }
        let staged = transform.stage(table, &key).await.inspect_err(|_| {
            log::warn!(
                "Staging failed; {} may hold a partial object",
                statement.object_uri()
            );
        })?;

        // Load
        log::debug!("Loading into {}...", self.target);
        CopyLoader::new(self.warehouse).load(&statement).await?;

        log::info!("Loaded {} row(s) into {}", staged.rows, self.target);

        Ok(RunReport {
            rows: staged.rows,
            bytes: staged.bytes,
            object_uri: statement.object_uri().to_string(),
            statement: statement.redacted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RowCursor, TextRow};
    use crate::error::{Error, Stage};
    use crate::storage::ObjectStoreBlob;
    use object_store::memory::InMemory;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncRead;

    struct MockSource {
        rows: Vec<Vec<&'static str>>,
        fail: bool,
        calls: AtomicUsize,
    }

    struct MockCursor(std::vec::IntoIter<Vec<&'static str>>);

    struct MockRow(Vec<&'static str>);

    impl TextRow for MockRow {
        fn text(&self, index: usize) -> eyre::Result<Option<String>> {
            Ok(self.0.get(index).map(|s| s.to_string()))
        }
    }

    impl RowCursor for MockCursor {
        type Row = MockRow;

        fn columns(&self) -> eyre::Result<Vec<String>> {
            Ok(vec!["col1".into(), "col2".into(), "col3".into()])
        }

        async fn next_row(&mut self) -> eyre::Result<Option<Self::Row>> {
            Ok(self.0.next().map(MockRow))
        }
    }

    impl SourceConnection for MockSource {
        type Cursor = MockCursor;

        async fn execute_query(&self, _query: &str) -> eyre::Result<Self::Cursor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                eyre::bail!("relation \"missing\" does not exist");
            }
            Ok(MockCursor(self.rows.clone().into_iter()))
        }
    }

    #[derive(Default)]
    struct MockWarehouse {
        statements: Mutex<Vec<String>>,
    }

    impl Warehouse for MockWarehouse {
        async fn execute_statement(&self, statement: &str) -> eyre::Result<()> {
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(())
        }
    }

    /// Counts uploads and forwards them to an in-memory store
    struct CountingBlob {
        inner: ObjectStoreBlob,
        uploads: AtomicUsize,
    }

    impl CountingBlob {
        fn new() -> Self {
            Self {
                inner: ObjectStoreBlob::new().with_bucket("test_bucket", Arc::new(InMemory::new())),
                uploads: AtomicUsize::new(0),
            }
        }
    }

    impl BlobStore for CountingBlob {
        async fn put_stream<R>(&self, bucket: &str, key: &str, body: R) -> eyre::Result<u64>
        where
            R: AsyncRead + Send + Unpin + 'static,
        {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.inner.put_stream(bucket, key, body).await
        }
    }

    fn source(rows: Vec<Vec<&'static str>>) -> MockSource {
        MockSource {
            rows,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn blob() -> Arc<ObjectStoreBlob> {
        Arc::new(ObjectStoreBlob::new().with_bucket("test_bucket", Arc::new(InMemory::new())))
    }

    fn destination() -> Destination {
        Destination::new("test_bucket", "test_key").with_prefix("test_prefix")
    }

    #[tokio::test]
    async fn test_pipeline() {
        let source = source(vec![vec!["1", "2", "3"], vec!["4", "5", "6"]]);
        let warehouse = MockWarehouse::default();

        let pipeline = Pipeline::new(
            &source,
            blob(),
            &warehouse,
            destination(),
            TargetTable::new("test_schema", "test_table"),
        );

        let report = pipeline.run("SELECT * FROM test_schema.test_table").await.unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.bytes, 12);
        assert_eq!(report.object_uri, "s3://test_bucket/test_prefix/test_key");

        let statements = warehouse.statements.lock().unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("FROM 's3://test_bucket/test_prefix/test_key'"));
        assert!(statements[0].contains("REGION 'us-east-1'"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_still_loads() {
        let source = source(vec![]);
        let warehouse = MockWarehouse::default();

        let pipeline = Pipeline::new(
            &source,
            blob(),
            &warehouse,
            destination(),
            TargetTable::new("s", "t"),
        );

        let report = pipeline.run("SELECT 1 WHERE false").await.unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(warehouse.statements.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_stops_pipeline() {
        let mut source = source(vec![]);
        source.fail = true;
        let blob = Arc::new(CountingBlob::new());
        let warehouse = MockWarehouse::default();

        let pipeline = Pipeline::new(
            &source,
            Arc::clone(&blob),
            &warehouse,
            destination(),
            TargetTable::new("s", "t"),
        );

        let err = pipeline.run("SELECT * FROM missing").await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Extract));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(blob.uploads.load(Ordering::SeqCst), 0);
        assert!(warehouse.statements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_stage_runs_once() {
        let source = source(vec![vec!["1", "2", "3"]]);
        let blob = Arc::new(CountingBlob::new());
        let warehouse = MockWarehouse::default();

        let pipeline = Pipeline::new(
            &source,
            Arc::clone(&blob),
            &warehouse,
            destination(),
            TargetTable::new("s", "t"),
        );

        pipeline.run("SELECT 1, 2, 3").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(blob.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(warehouse.statements.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rewritten_key_rejected_before_extraction() {
        for prefix in ["/p", "exports/"] {
            let source = source(vec![vec!["1", "2", "3"]]);
            let blob = Arc::new(CountingBlob::new());
            let warehouse = MockWarehouse::default();

            let pipeline = Pipeline::new(
                &source,
                Arc::clone(&blob),
                &warehouse,
                Destination::new("test_bucket", "k").with_prefix(prefix),
                TargetTable::new("s", "t"),
            );

            let err = pipeline.run("SELECT 1, 2, 3").await.unwrap_err();
            assert!(matches!(err, Error::Config(_)), "prefix {:?}: {}", prefix, err);
            assert_eq!(source.calls.load(Ordering::SeqCst), 0);
            assert_eq!(blob.uploads.load(Ordering::SeqCst), 0);
            assert!(warehouse.statements.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_destination_runs_nothing() {
        let source = source(vec![vec!["1", "2", "3"]]);
        let warehouse = MockWarehouse::default();

        let pipeline = Pipeline::new(
            &source,
            blob(),
            &warehouse,
            Destination::new("", "k"),
            TargetTable::new("s", "t"),
        );

        let err = pipeline.run("SELECT 1").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
