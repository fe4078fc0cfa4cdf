//! Pipeline error taxonomy
//!
//! Every stage wraps the collaborator's report unchanged, so the caller sees the
//! original context chain (query, upload or COPY failure) behind a typed variant.

use std::fmt;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// The pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Transform => write!(f, "transform"),
            Self::Load => write!(f, "load"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query execution, column metadata, or a row read failed
    #[error("extraction failed: {0:#}")]
    Extraction(eyre::Report),

    /// Serialization and/or upload failed; holds the first meaningful error
    #[error("transform failed: {0:#}")]
    Transform(eyre::Report),

    /// The COPY statement failed to execute
    #[error("load failed: {0:#}")]
    Load(eyre::Report),

    /// Destination or target values rejected before any stage ran
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The stage this error came from, `None` for configuration errors
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Extraction(_) => Some(Stage::Extract),
            Self::Transform(_) => Some(Stage::Transform),
            Self::Load(_) => Some(Stage::Load),
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn test_stage_of_each_variant() {
        assert_eq!(
            Error::Extraction(eyre::eyre!("x")).stage(),
            Some(Stage::Extract)
        );
        assert_eq!(
            Error::Transform(eyre::eyre!("x")).stage(),
            Some(Stage::Transform)
        );
        assert_eq!(Error::Load(eyre::eyre!("x")).stage(), Some(Stage::Load));
        assert_eq!(Error::Config("x".to_string()).stage(), None);
    }

    #[test]
    fn test_display_keeps_context_chain() {
        let report = Err::<(), _>(eyre::eyre!("connection reset"))
            .wrap_err("Failed to upload s3://b/k")
            .unwrap_err();
        let message = Error::Transform(report).to_string();
        assert!(message.starts_with("transform failed"));
        assert!(message.contains("Failed to upload s3://b/k"));
        assert!(message.contains("connection reset"));
    }
}
