//! Where a run stages its object and which table it loads into

use crate::client::Credentials;
use crate::error::{Error, Result};
use object_store::path::Path as ObjectPath;
use std::fmt;
use std::str::FromStr;

/// Default region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Field delimiter shared by the staged object and the COPY statement
///
/// Always a single ASCII byte that is not a quote or a line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter(u8);

impl Delimiter {
    pub const TAB: Delimiter = Delimiter(b'\t');

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }

    /// The delimiter as a Redshift string literal, e.g. `'\t'` or `'|'`
    pub fn literal(self) -> String {
        match self.0 {
            b'\t' => "'\\t'".to_string(),
            b'\'' => "'\\''".to_string(),
            b'\\' => "'\\\\'".to_string(),
            byte if byte.is_ascii_graphic() || byte == b' ' => format!("'{}'", char::from(byte)),
            byte => format!("'\\{:03o}'", byte),
        }
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::TAB
    }
}

impl TryFrom<char> for Delimiter {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        if !c.is_ascii() {
            return Err(Error::Config(format!(
                "delimiter {:?} is not a single-byte ASCII character",
                c
            )));
        }
        match c {
            '"' | '\n' | '\r' => Err(Error::Config(format!(
                "delimiter {:?} collides with CSV quoting or line terminators",
                c
            ))),
            c => Ok(Self(c as u8)),
        }
    }
}

impl FromStr for Delimiter {
    type Err = Error;

    /// Accepts a single character, or `\t` / `tab` for a tab
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "\\t" | "tab" | "TAB" => return Ok(Self::TAB),
            _ => {}
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::try_from(c),
            _ => Err(Error::Config(format!(
                "delimiter must be exactly one character, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal())
    }
}

/// Blob storage location plus the COPY settings that travel with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    pub region: String,
    pub prefix: String,
    pub key: String,
    pub credentials: Credentials,
    pub copy_params: String,
    pub delimiter: Delimiter,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            prefix: String::new(),
            key: key.into(),
            credentials: Credentials::None,
            copy_params: String::new(),
            delimiter: Delimiter::TAB,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Extra COPY parameters appended verbatim
    pub fn with_copy_params(mut self, params: impl Into<String>) -> Self {
        self.copy_params = params.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// `prefix/key` when a prefix is set, otherwise just `key`
    pub fn object_key(&self) -> String {
        if self.prefix.is_empty() {
            self.key.clone()
        } else {
            format!("{}/{}", self.prefix, self.key)
        }
    }

    /// `s3://bucket/object_key`
    pub fn object_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::Config("bucket must not be empty".to_string()));
        }
        if self.key.trim().is_empty() {
            return Err(Error::Config("object key must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(Error::Config("region must not be empty".to_string()));
        }

        // The uploaded key and the one COPY reads must be the same string
        let key = self.object_key();
        match ObjectPath::parse(&key) {
            Ok(path) if path.as_ref() == key => {}
            Ok(path) => {
                return Err(Error::Config(format!(
                    "object key '{}' would be stored as '{}'",
                    key, path
                )));
            }
            Err(e) => {
                return Err(Error::Config(format!("invalid object key '{}': {}", key, e)));
            }
        }
        Ok(())
    }
}

/// Schema-qualified warehouse table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub schema: String,
    pub table: String,
}

impl TargetTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(Error::Config("target table must not be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.table)
        } else {
            write!(f, "{}.{}", self.schema, self.table)
        }
    }
}
