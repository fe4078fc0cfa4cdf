use clap::ValueEnum;
use std::str::FromStr;

/// How Redshift authorizes itself to read the staged object
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Assume an IAM role by ARN
    IamRole(String),
    /// Static access key pair
    AccessKey { id: String, secret: String },
    /// A complete clause passed through verbatim
    Clause(String),
    /// No CREDENTIALS clause; authorize through the COPY parameters instead
    /// (for example `IAM_ROLE default`)
    #[default]
    None,
}

impl Credentials {
    pub fn new(
        r#type: &CredentialsType,
        iam_role: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        clause: Option<String>,
    ) -> Self {
        match (r#type, iam_role, access_key_id, secret_access_key, clause) {
            (CredentialsType::Clause, _, _, _, Some(clause)) => Self::Clause(clause),
            (CredentialsType::IamRole, Some(arn), _, _, _) => Self::IamRole(arn),
            (CredentialsType::AccessKey, _, Some(id), Some(secret), _) => {
                Self::AccessKey { id, secret }
            }
            _ => Self::None,
        }
    }

    /// The text placed inside `CREDENTIALS '...'`
    pub fn clause(&self) -> String {
        match self {
            Self::IamRole(arn) => format!("aws_iam_role={}", arn),
            Self::AccessKey { id, secret } => {
                format!("aws_access_key_id={};aws_secret_access_key={}", id, secret)
            }
            Self::Clause(clause) => clause.clone(),
            Self::None => String::new(),
        }
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IamRole(_) => write!(f, "IamRole"),
            Self::AccessKey { .. } => write!(f, "AccessKey"),
            Self::Clause(_) => write!(f, "Clause"),
            Self::None => write!(f, "None"),
        }
    }
}

// Never print secrets, not even in debug logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials::{}", self)
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum CredentialsType {
    IamRole,
    AccessKey,
    Clause,
    None,
}

impl FromStr for CredentialsType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "iam-role" => Ok(Self::IamRole),
            "access-key" => Ok(Self::AccessKey),
            "clause" => Ok(Self::Clause),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_formats() {
        assert_eq!(
            Credentials::IamRole("arn:aws:iam::1:role/copy".to_string()).clause(),
            "aws_iam_role=arn:aws:iam::1:role/copy"
        );
        assert_eq!(
            Credentials::AccessKey {
                id: "AKIA".to_string(),
                secret: "s3cr3t".to_string()
            }
            .clause(),
            "aws_access_key_id=AKIA;aws_secret_access_key=s3cr3t"
        );
        assert_eq!(Credentials::None.clause(), "");
    }

    #[test]
    fn test_new_falls_back_to_none_when_incomplete() {
        let creds = Credentials::new(
            &CredentialsType::AccessKey,
            None,
            Some("AKIA".to_string()),
            None,
            None,
        );
        assert_eq!(creds, Credentials::None);
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = Credentials::AccessKey {
            id: "AKIA".to_string(),
            secret: "s3cr3t".to_string(),
        };
        let printed = format!("{:?} {}", creds, creds);
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("AccessKey"));
    }

    #[test]
    fn test_type_from_str() {
        assert!(matches!(
            "IAM_ROLE".parse::<CredentialsType>(),
            Ok(CredentialsType::IamRole)
        ));
        assert!(matches!(
            "access-key".parse::<CredentialsType>(),
            Ok(CredentialsType::AccessKey)
        ));
        assert!("token".parse::<CredentialsType>().is_err());
    }
}
