//! Nix store path types and parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Nix store path hash (the 32-character base32 portion).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorePathHash(String);

impl StorePathHash {
    /// Length of the base32 hash portion of a store path.
    pub const LEN: usize = 32;

    /// Create from a string, validating format.
    pub fn new(hash: impl Into<String>) -> crate::Result<Self> {
        let hash = hash.into();
        if hash.len() != Self::LEN {
            return Err(crate::Error::InvalidHash(format!(
                "store path hash must be {} chars, got {}",
                Self::LEN,
                hash.len()
            )));
        }
        // Nix base32 alphabet: 0-9, a-z without e, o, u, t
        for c in hash.chars() {
            if !matches!(c, '0'..='9' | 'a'..='d' | 'f'..='n' | 'p'..='s' | 'v'..='z') {
                return Err(crate::Error::InvalidHash(format!(
                    "invalid character in store path hash: {c}"
                )));
            }
        }
        Ok(Self(hash))
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathHash({self})")
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StorePathHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::new(s)
    }
}

/// A full Nix store path (/nix/store/<hash>-<name>).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorePath {
    hash: StorePathHash,
    name: String,
}

impl StorePath {
    /// The standard Nix store directory.
    pub const STORE_DIR: &'static str = "/nix/store";

    /// Parse a full store path string.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let prefix = format!("{}/", Self::STORE_DIR);
        let rest = path
            .strip_prefix(&prefix)
            .ok_or_else(|| crate::Error::InvalidStorePath(format!("must start with {prefix}")))?;

        if !rest.is_ascii() {
            return Err(crate::Error::InvalidStorePath(
                "store path contains non-ASCII characters".to_string(),
            ));
        }

        if rest.len() < StorePathHash::LEN + 2 {
            return Err(crate::Error::InvalidStorePath("path too short".to_string()));
        }

        let hash_part = &rest[..StorePathHash::LEN];
        if rest.as_bytes()[StorePathHash::LEN] != b'-' {
            return Err(crate::Error::InvalidStorePath(
                "expected '-' after hash".to_string(),
            ));
        }

        let name = &rest[StorePathHash::LEN + 1..];
        Self::new(StorePathHash::new(hash_part)?, name)
    }

    /// Create from components.
    pub fn new(hash: StorePathHash, name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::InvalidStorePath(
                "name cannot be empty".to_string(),
            ));
        }
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '+' | '-' | '.' | '_' | '?' | '=') {
                return Err(crate::Error::InvalidStorePath(format!(
                    "invalid character in name: {c}"
                )));
            }
        }
        Ok(Self { hash, name })
    }

    /// Get the store path hash.
    pub fn hash(&self) -> &StorePathHash {
        &self.hash
    }

    /// Get the name portion.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the full path string.
    pub fn to_path_string(&self) -> String {
        format!("{}/{}-{}", Self::STORE_DIR, self.hash, self.name)
    }

    /// Get the basename (`hash-name`) without the `/nix/store/` prefix.
    pub fn basename(&self) -> String {
        format!("{}-{}", self.hash, self.name)
    }

    /// Construct a `StorePath` from a basename (`hash-name`) string.
    pub fn from_basename(basename: &str) -> crate::Result<Self> {
        let path = format!("{}/{}", Self::STORE_DIR, basename);
        Self::parse(&path)
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePath({})", self.to_path_string())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl FromStr for StorePath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_store_path() {
        let path = "/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-foo";
        let parsed = StorePath::parse(path).unwrap();
        assert_eq!(parsed.hash().as_str(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(parsed.name(), "foo");
        assert_eq!(parsed.to_path_string(), path);
    }

    #[test]
    fn parse_real_world_path() {
        let parsed =
            StorePath::parse("/nix/store/5yr2767rqnvwvsfy445ny41lk67fcjjh-VSCode_1.40.1_linux-x64.tar.gz")
                .unwrap();
        assert_eq!(parsed.hash().as_str(), "5yr2767rqnvwvsfy445ny41lk67fcjjh");
        assert_eq!(parsed.name(), "VSCode_1.40.1_linux-x64.tar.gz");
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        for bad in [
            "",
            "/nix/store\u{1f497}",
            "/nix/store/",
            "/nix/store/00000000000000000000000000000000",
            "/nix/store/0000000000000000000000000000000\u{1f497}",
            "/nix/store/00000000000000000000000000000000-",
            "/usr/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-foo",
        ] {
            assert!(StorePath::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_non_ascii_does_not_panic() {
        // Multi-byte UTF-8 that passes byte-length check but would panic on byte slicing
        let path = "/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\u{00e9}-foo";
        let result = StorePath::parse(path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("non-ASCII"));
    }

    #[test]
    fn parse_rejects_excluded_base32_chars() {
        // 'e' is not in the Nix base32 alphabet
        let path = "/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaea-foo";
        assert!(StorePath::parse(path).is_err());
    }

    #[test]
    fn basename_round_trip() {
        let path = StorePath::from_basename("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-test-pkg").unwrap();
        assert_eq!(path.basename(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-test-pkg");
        assert_eq!(
            path.to_path_string(),
            "/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-test-pkg"
        );
    }
}
