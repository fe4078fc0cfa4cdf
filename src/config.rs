//! Run configuration loaded from environment variables

use crate::client::{Credentials, CredentialsType};
use crate::destination::{DEFAULT_REGION, Delimiter, Destination, TargetTable};
use crate::storage::S3Settings;
use eyre::{Context, Result};
use url::Url;

/// Everything a run needs besides the query
#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: Url,
    pub warehouse_url: Url,
    pub destination: Destination,
    pub target: TargetTable,
    pub s3: S3Settings,
}

/// Per-run values that take the place of their environment variables
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces `S3_KEY`
    pub key: Option<String>,
    /// Replaces `REDSHIFT_TABLE`; a `schema.table` form also replaces `REDSHIFT_SCHEMA`
    pub table: Option<String>,
    /// Replaces `CSV_DELIMITER`
    pub delimiter: Option<Delimiter>,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable not set", name))
}

/// `value` if given, otherwise the required variable `name`
fn required_or(value: Option<&str>, name: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value.to_string()),
        None => required(name),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn database_url(name: &str) -> Result<Url> {
    let value = required(name)?;
    let url = Url::parse(&value).with_context(|| format!("Invalid {}", name))?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(url),
        scheme => eyre::bail!(
            "Invalid {}: expected a postgres:// URL, got {}://",
            name,
            scheme
        ),
    }
}

/// Pick credentials for the COPY clause
///
/// `REDSHIFT_CREDENTIALS_TYPE` forces a kind; otherwise the first available of
/// `REDSHIFT_CREDENTIALS`, `REDSHIFT_IAM_ROLE`, or the AWS access key pair wins.
fn load_credentials() -> Result<Credentials> {
    let clause = optional("REDSHIFT_CREDENTIALS");
    let iam_role = optional("REDSHIFT_IAM_ROLE");
    let key_id = optional("AWS_ACCESS_KEY_ID");
    let secret = optional("AWS_SECRET_ACCESS_KEY");

    let kind = match optional("REDSHIFT_CREDENTIALS_TYPE") {
        Some(kind) => kind.parse::<CredentialsType>().map_err(|_| {
            eyre::eyre!(
                "Invalid REDSHIFT_CREDENTIALS_TYPE: {} (expected iam-role, access-key, clause, or none)",
                kind
            )
        })?,
        None if clause.is_some() => CredentialsType::Clause,
        None if iam_role.is_some() => CredentialsType::IamRole,
        None if key_id.is_some() && secret.is_some() => CredentialsType::AccessKey,
        None => CredentialsType::None,
    };

    Ok(Credentials::new(&kind, iam_role, key_id, secret, clause))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SOURCE_DATABASE_URL: postgres:// URL of the source database (required)
    /// - REDSHIFT_DATABASE_URL: postgres:// URL of the Redshift cluster (required)
    /// - S3_BUCKET, S3_KEY: staging bucket and object key (required)
    /// - S3_PREFIX: key prefix (optional)
    /// - S3_REGION: bucket region (optional, defaults to us-east-1)
    /// - S3_ENDPOINT: S3-compatible endpoint (optional)
    /// - AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY: static keys (optional)
    /// - REDSHIFT_SCHEMA: target schema (optional, defaults to public)
    /// - REDSHIFT_TABLE: target table (required)
    /// - REDSHIFT_COPY_PARAMS: extra COPY parameters (optional)
    /// - REDSHIFT_CREDENTIALS / REDSHIFT_IAM_ROLE / REDSHIFT_CREDENTIALS_TYPE (optional)
    /// - CSV_DELIMITER: single field delimiter character (optional, defaults to tab)
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&Overrides::default())
    }

    /// Load configuration with `overrides` standing in for their variables
    ///
    /// An overridden variable does not need to be set.
    pub fn from_env_with(overrides: &Overrides) -> Result<Self> {
        let source_url = database_url("SOURCE_DATABASE_URL")?;
        let warehouse_url = database_url("REDSHIFT_DATABASE_URL")?;
        let (destination, target) = load_destination(overrides)?;

        let s3 = S3Settings {
            region: destination.region.clone(),
            endpoint: optional("S3_ENDPOINT"),
            access_key_id: optional("AWS_ACCESS_KEY_ID"),
            secret_access_key: optional("AWS_SECRET_ACCESS_KEY"),
        };

        Ok(Self {
            source_url,
            warehouse_url,
            destination,
            target,
            s3,
        })
    }
}

/// Load the staging location and COPY target only
///
/// Needs none of the database URLs, so a statement can be rendered offline.
pub fn load_destination(overrides: &Overrides) -> Result<(Destination, TargetTable)> {
    let delimiter = match (overrides.delimiter, optional("CSV_DELIMITER")) {
        (Some(delimiter), _) => delimiter,
        (None, Some(value)) => value
            .parse::<Delimiter>()
            .with_context(|| "Invalid CSV_DELIMITER")?,
        (None, None) => Delimiter::TAB,
    };

    let key = required_or(overrides.key.as_deref(), "S3_KEY")?;
    let destination = Destination::new(required("S3_BUCKET")?, key)
        .with_prefix(optional("S3_PREFIX").unwrap_or_default())
        .with_region(optional("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()))
        .with_credentials(load_credentials()?)
        .with_copy_params(optional("REDSHIFT_COPY_PARAMS").unwrap_or_default())
        .with_delimiter(delimiter);

    let table = required_or(overrides.table.as_deref(), "REDSHIFT_TABLE")?;
    let target = match table.split_once('.') {
        Some((schema, table)) if overrides.table.is_some() => TargetTable::new(schema, table),
        _ => TargetTable::new(
            optional("REDSHIFT_SCHEMA").unwrap_or_else(|| "public".to_string()),
            table,
        ),
    };

    Ok((destination, target))
}
