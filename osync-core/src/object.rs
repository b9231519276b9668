use crate::error::SyncError;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Snapshot mapping from relative id to object for one root.
pub type Inventory = HashMap<String, SyncObject>;

/// One inventory entry. `id` is a forward-slash relative key; only `id`,
/// `size` and `last_modified` participate in diffing. The location keeps the
/// read-side coordinates, which relocation leaves untouched.
#[derive(Debug, Clone)]
pub struct SyncObject {
    pub id: String,
    /// Object size in bytes.
    pub size: u64,
    /// Modification time in integer milliseconds since the epoch.
    pub last_modified: u64,
    pub location: ObjectLocation,
}

#[derive(Debug, Clone)]
pub enum ObjectLocation {
    Local { path: PathBuf },
    Remote { bucket: String, key: String },
}

impl SyncObject {
    pub fn local(
        id: impl Into<String>,
        size: u64,
        last_modified: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            size,
            last_modified,
            location: ObjectLocation::Local { path: path.into() },
        }
    }

    pub fn remote(
        id: impl Into<String>,
        size: u64,
        last_modified: u64,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            size,
            last_modified,
            location: ObjectLocation::Remote {
                bucket: bucket.into(),
                key: key.into(),
            },
        }
    }
}

/// A `bucket[/prefix]` source or target. The prefix is kept verbatim; only
/// empty bucket names are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl BucketPath {
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        input.parse()
    }

    /// Prefix as a plain string, empty when absent.
    pub fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

impl FromStr for BucketPath {
    type Err = SyncError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (bucket, prefix) = match input.split_once('/') {
            Some((bucket, rest)) => {
                let prefix = if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                };
                (bucket, prefix)
            }
            None => (input, None),
        };
        if bucket.is_empty() {
            return Err(SyncError::InvalidBucketPath(input.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}/{}", self.bucket, prefix),
            None => write!(f, "{}", self.bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_bucket() {
        let path = BucketPath::parse("archive").unwrap();
        assert_eq!(path.bucket, "archive");
        assert_eq!(path.prefix, None);
    }

    #[test]
    fn parses_bucket_with_prefix() {
        let path = BucketPath::parse("archive/2021/q2").unwrap();
        assert_eq!(path.bucket, "archive");
        assert_eq!(path.prefix.as_deref(), Some("2021/q2"));
        assert_eq!(path.to_string(), "archive/2021/q2");
    }

    #[test]
    fn trailing_slash_means_no_prefix() {
        let path = BucketPath::parse("archive/").unwrap();
        assert_eq!(path.prefix, None);
    }

    #[test]
    fn rejects_empty_bucket() {
        assert!(BucketPath::parse("").is_err());
        assert!(BucketPath::parse("/key").is_err());
    }
}
