use std::fmt;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

/// Stable identifier of a mirrored repository: the lowercase hex SHA-1 of its
/// clone URL.
///
/// Used both as the mirror's directory name and as the lock-table key.  The
/// URL string is hashed verbatim, so `https://host/a/b` and
/// `https://host/a/b.git` are distinct repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn from_url(url: &str) -> Self {
        Self(hex::encode(Sha1::digest(url.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory of this repository's mirror below `root`.
    pub fn mirror_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
