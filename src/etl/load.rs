//! Load: one COPY statement pointing Redshift at the staged object

use crate::client::Warehouse;
use crate::destination::{Destination, TargetTable};
use crate::error::{Error, Result};
use eyre::Context;
use std::fmt;

/// A Redshift `COPY ... FROM 's3://...'` statement
///
/// Renders as
/// `COPY <schema>.<table> FROM '<uri>' CREDENTIALS '<clause>' CSV DELIMITER '<c>' <params> REGION '<region>'`,
/// with `<params>` omitted when empty and the `CREDENTIALS` clause omitted when
/// there are no credentials. Values inside string literals have single quotes
/// doubled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStatement {
    target: TargetTable,
    object_uri: String,
    credentials: String,
    delimiter: String,
    copy_params: String,
    region: String,
}

impl CopyStatement {
    pub fn new(target: &TargetTable, destination: &Destination) -> Self {
        Self {
            target: target.clone(),
            object_uri: destination.object_uri(),
            credentials: destination.credentials.clause(),
            delimiter: destination.delimiter.literal(),
            copy_params: destination.copy_params.trim().to_string(),
            region: destination.region.clone(),
        }
    }

    pub fn object_uri(&self) -> &str {
        &self.object_uri
    }

    /// The statement with the credentials clause masked, safe for logs
    pub fn redacted(&self) -> String {
        let masked = if self.credentials.is_empty() {
            ""
        } else {
            "***"
        };
        self.render(masked)
    }

    fn render(&self, credentials: &str) -> String {
        let mut sql = format!("COPY {} FROM '{}'", self.target, quote(&self.object_uri));
        if !credentials.is_empty() {
            sql.push_str(&format!(" CREDENTIALS '{}'", quote(credentials)));
        }
        sql.push_str(&format!(" CSV DELIMITER {}", self.delimiter));
        if !self.copy_params.is_empty() {
            sql.push(' ');
            sql.push_str(&self.copy_params);
        }
        sql.push_str(&format!(" REGION '{}'", quote(&self.region)));
        sql
    }
}

impl fmt::Display for CopyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&self.credentials))
    }
}

fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// Executes COPY statements against a borrowed warehouse connection
pub struct CopyLoader<'a, W> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse> CopyLoader<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Execute `statement` once. No retry.
    ///
    /// # Errors
    /// [`Error::Load`] carrying the warehouse's error
    pub async fn load(&self, statement: &CopyStatement) -> Result<()> {
        log::debug!("Executing: {}", statement.redacted());

        self.warehouse
            .execute_statement(&statement.to_string())
            .await
            .with_context(|| format!("COPY from {} failed", statement.object_uri()))
            .map_err(Error::Load)?;

        log::info!("Loaded {} into {}", statement.object_uri(), statement.target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credentials;
    use crate::destination::Delimiter;
    use crate::error::Stage;
    use std::sync::Mutex;

    fn destination() -> Destination {
        Destination::new("test_bucket", "test_key").with_prefix("test_prefix")
    }

    #[test]
    fn test_statement_references_object_and_region() {
        let statement = CopyStatement::new(&TargetTable::new("test_schema", "test_table"), &destination());
        assert_eq!(
            statement.to_string(),
            "COPY test_schema.test_table FROM 's3://test_bucket/test_prefix/test_key' \
             CSV DELIMITER '\\t' REGION 'us-east-1'"
        );
    }

    #[test]
    fn test_no_credentials_defers_to_copy_params() {
        let dest = destination().with_copy_params("IAM_ROLE default");
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &dest);

        assert!(!statement.to_string().contains("CREDENTIALS"));
        assert!(!statement.redacted().contains("CREDENTIALS"));
        assert!(statement.to_string().contains("CSV DELIMITER '\\t' IAM_ROLE default REGION"));
    }

    #[test]
    fn test_statement_with_params_credentials_and_delimiter() {
        let dest = destination()
            .with_region("eu-west-1")
            .with_credentials(Credentials::IamRole("arn:aws:iam::1:role/r".to_string()))
            .with_copy_params(" IGNOREHEADER 0 TRUNCATECOLUMNS ")
            .with_delimiter(Delimiter::try_from('|').unwrap());
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &dest);

        assert_eq!(
            statement.to_string(),
            "COPY s.t FROM 's3://test_bucket/test_prefix/test_key' \
             CREDENTIALS 'aws_iam_role=arn:aws:iam::1:role/r' CSV DELIMITER '|' \
             IGNOREHEADER 0 TRUNCATECOLUMNS REGION 'eu-west-1'"
        );
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let dest = destination().with_credentials(Credentials::AccessKey {
            id: "AKIA".to_string(),
            secret: "s3cr3t".to_string(),
        });
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &dest);

        assert!(statement.to_string().contains("s3cr3t"));
        assert!(!statement.redacted().contains("s3cr3t"));
        assert!(statement.redacted().contains("CREDENTIALS '***'"));
    }

    #[test]
    fn test_single_quotes_are_doubled() {
        let dest = Destination::new("b", "o'brien.tsv");
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &dest);
        assert!(statement.to_string().contains("FROM 's3://b/o''brien.tsv'"));
    }

    #[derive(Default)]
    struct RecordingWarehouse {
        statements: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Warehouse for RecordingWarehouse {
        async fn execute_statement(&self, statement: &str) -> eyre::Result<()> {
            self.statements.lock().unwrap().push(statement.to_string());
            if self.fail {
                eyre::bail!("S3ServiceException: Access Denied");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_executes_exactly_once() {
        let warehouse = RecordingWarehouse::default();
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &destination());

        CopyLoader::new(&warehouse).load(&statement).await.unwrap();

        let executed = warehouse.statements.lock().unwrap();
        assert_eq!(executed.as_slice(), [statement.to_string()]);
    }

    #[tokio::test]
    async fn test_load_failure_is_not_retried() {
        let warehouse = RecordingWarehouse {
            fail: true,
            ..Default::default()
        };
        let statement = CopyStatement::new(&TargetTable::new("s", "t"), &destination());

        let err = CopyLoader::new(&warehouse).load(&statement).await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Load));
        assert!(err.to_string().contains("Access Denied"));
        assert_eq!(warehouse.statements.lock().unwrap().len(), 1);
    }
}
