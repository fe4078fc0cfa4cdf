//! CLI helper functions

use crate::{
    config::Config,
    etl::{CopyStatement, Pipeline, RunReport},
    storage::ObjectStoreBlob,
};
use eyre::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};
use url::Url;

/// Resolve the query text from an argument or a file, exactly one of them
pub fn read_query(query: Option<String>, file: Option<&Path>) -> Result<String> {
    let text = match (query, file) {
        (Some(_), Some(_)) => eyre::bail!("Pass the query as an argument or with --file, not both"),
        (Some(query), None) => query,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file {}", path.display()))?,
        (None, None) => eyre::bail!("No query given. Pass it as an argument or with --file"),
    };

    if text.trim().is_empty() {
        eyre::bail!("Query is empty");
    }
    Ok(text)
}

/// Open a Postgres-protocol connection and drive it in the background
///
/// `label` names the connection in logs and errors.
pub async fn connect_postgres(url: &Url, label: &str) -> Result<Client> {
    log::debug!("Connecting to {} at {}", label, redact_url(url));
    let (client, connection) = tokio_postgres::connect(url.as_str(), NoTls)
        .await
        .with_context(|| format!("Failed to connect to {} at {}", label, redact_url(url)))?;

    let label = label.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("{} connection error: {}", label, e);
        }
    });

    Ok(client)
}

/// The URL with its password replaced, safe for logs
fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    if redacted.password().is_some() {
        // Only fails for URLs that cannot carry credentials at all
        let _ = redacted.set_password(Some("***"));
    }
    redacted.to_string()
}

/// Build the S3 store for the configured staging bucket
pub fn build_blob(config: &Config) -> Result<ObjectStoreBlob> {
    ObjectStoreBlob::s3(&config.destination.bucket, &config.s3)
}

/// Run a full export: query the source, stage to S3, COPY into Redshift
pub async fn run_export(config: &Config, query: &str) -> Result<RunReport> {
    log::info!("Connecting to source database...");
    let source = connect_postgres(&config.source_url, "source database").await?;

    log::info!("Connecting to Redshift...");
    let redshift = connect_postgres(&config.warehouse_url, "Redshift").await?;

    let blob = Arc::new(build_blob(config)?);

    let pipeline = Pipeline::new(
        &source,
        blob,
        &redshift,
        config.destination.clone(),
        config.target.clone(),
    );

    let report = pipeline.run(query).await?;

    log::info!(
        "✓ Loaded {} row(s) ({} bytes) from {}",
        report.rows,
        report.bytes,
        report.object_uri
    );
    Ok(report)
}

/// Render the COPY statement a run would execute, credentials masked unless `reveal`
pub fn render_statement(statement: &CopyStatement, reveal: bool) -> String {
    match reveal {
        true => statement.to_string(),
        false => statement.redacted(),
    }
}

/// Verify both databases answer and the staging bucket is reachable
pub async fn check_connections(config: &Config) -> Result<()> {
    let source = connect_postgres(&config.source_url, "source database").await?;
    source
        .simple_query("SELECT 1")
        .await
        .context("Source database did not answer SELECT 1")?;
    log::info!("✓ Source database");

    let redshift = connect_postgres(&config.warehouse_url, "Redshift").await?;
    redshift
        .simple_query("SELECT 1")
        .await
        .context("Redshift did not answer SELECT 1")?;
    log::info!("✓ Redshift");

    build_blob(config)?
        .check(&config.destination.bucket)
        .await?;
    log::info!("✓ s3://{}", config.destination.bucket);

    Ok(())
}
