//! NAR metadata and the `.narinfo` text format.

use crate::store_path::StorePath;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// NAR file compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Xz,
    Zstd,
    Gzip,
    Bzip2,
}

impl Compression {
    /// File extension for a compressed NAR, without the leading dot.
    pub fn nar_extension(&self) -> &'static str {
        match self {
            Self::None => "nar",
            Self::Xz => "nar.xz",
            Self::Zstd => "nar.zst",
            Self::Gzip => "nar.gz",
            Self::Bzip2 => "nar.bz2",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        };
        f.write_str(s)
    }
}

impl FromStr for Compression {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "xz" => Ok(Self::Xz),
            "zstd" => Ok(Self::Zstd),
            "gzip" => Ok(Self::Gzip),
            "bzip2" => Ok(Self::Bzip2),
            other => Err(crate::Error::NarInfoParse(format!(
                "unknown compression {other:?}"
            ))),
        }
    }
}

/// Integrity and location metadata for one NAR blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarMeta {
    /// Download URL relative to the cache root (`nar/<hash>.nar.xz`).
    pub url: String,
    pub compression: Compression,
    /// Hash of the compressed file, if upstream published one.
    pub file_hash: Option<String>,
    /// Size of the compressed file, if upstream published one.
    pub file_size: Option<u64>,
    /// Hash of the uncompressed NAR.
    pub nar_hash: String,
    /// Size of the uncompressed NAR.
    pub nar_size: u64,
    /// Deriver basename, if known.
    pub deriver: Option<String>,
    /// Upstream signature line, if signed.
    pub sig: Option<String>,
    /// Content-addressing tag (`fixed:...`), if content-addressed.
    pub ca: Option<String>,
}

/// A parsed narinfo record: the store path it describes, its blob
/// metadata, and the basenames of the store paths it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarInfo {
    pub store_path: StorePath,
    pub meta: NarMeta,
    /// Reference basenames (`hash-name`), possibly including the record's
    /// own basename (a self-reference).
    pub references: Vec<String>,
}

impl NarInfo {
    /// Parse the upstream `.narinfo` key-value text format.
    ///
    /// Unknown keys are ignored; `StorePath`, `URL`, `NarHash` and
    /// `NarSize` are mandatory.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let mut store_path = None;
        let mut url = None;
        let mut compression = None;
        let mut file_hash = None;
        let mut file_size = None;
        let mut nar_hash = None;
        let mut nar_size = None;
        let mut references = Vec::new();
        let mut deriver = None;
        let mut sig = None;
        let mut ca = None;

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(": ").ok_or_else(|| {
                crate::Error::NarInfoParse(format!("malformed line {line:?}"))
            })?;
            match key {
                "StorePath" => store_path = Some(StorePath::parse(value)?),
                "URL" => url = Some(value.to_string()),
                "Compression" => compression = Some(value.parse()?),
                "FileHash" => file_hash = Some(value.to_string()),
                "FileSize" => {
                    file_size = Some(value.parse::<u64>().map_err(|e| {
                        crate::Error::NarInfoParse(format!("bad FileSize: {e}"))
                    })?)
                }
                "NarHash" => nar_hash = Some(value.to_string()),
                "NarSize" => {
                    nar_size = Some(value.parse::<u64>().map_err(|e| {
                        crate::Error::NarInfoParse(format!("bad NarSize: {e}"))
                    })?)
                }
                "References" => {
                    references = value.split_whitespace().map(str::to_string).collect()
                }
                "Deriver" => deriver = Some(value.to_string()),
                "Sig" => sig = Some(value.to_string()),
                "CA" => ca = Some(value.to_string()),
                _ => {}
            }
        }

        let missing =
            |k: &str| crate::Error::NarInfoParse(format!("missing mandatory key {k}"));
        let store_path = store_path.ok_or_else(|| missing("StorePath"))?;
        let url = url.ok_or_else(|| missing("URL"))?;
        let nar_hash = nar_hash.ok_or_else(|| missing("NarHash"))?;
        let nar_size = nar_size.ok_or_else(|| missing("NarSize"))?;

        Ok(Self {
            store_path,
            meta: NarMeta {
                url,
                compression: compression.unwrap_or(Compression::None),
                file_hash,
                file_size,
                nar_hash,
                nar_size,
                deriver,
                sig,
                ca,
            },
            references,
        })
    }

    /// Parse each reference basename into a `StorePath`.
    pub fn reference_paths(&self) -> impl Iterator<Item = crate::Result<StorePath>> + '_ {
        self.references
            .iter()
            .map(|basename| StorePath::from_basename(basename))
    }

    /// True when the record references its own store path.
    pub fn has_self_reference(&self) -> bool {
        let own = self.store_path.basename();
        self.references.iter().any(|r| *r == own)
    }

    /// Format as standard narinfo text.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("StorePath: {}", self.store_path));
        lines.push(format!("URL: {}", self.meta.url));
        lines.push(format!("Compression: {}", self.meta.compression));
        if let Some(ref file_hash) = self.meta.file_hash {
            lines.push(format!("FileHash: {file_hash}"));
        }
        if let Some(file_size) = self.meta.file_size {
            lines.push(format!("FileSize: {file_size}"));
        }
        lines.push(format!("NarHash: {}", self.meta.nar_hash));
        lines.push(format!("NarSize: {}", self.meta.nar_size));
        // Always present but may be empty
        lines.push(format!("References: {}", self.references.join(" ")));
        if let Some(ref deriver) = self.meta.deriver {
            lines.push(format!("Deriver: {deriver}"));
        }
        if let Some(ref sig) = self.meta.sig {
            lines.push(format!("Sig: {sig}"));
        }
        if let Some(ref ca) = self.meta.ca {
            lines.push(format!("CA: {ca}"));
        }

        lines.join("\n") + "\n"
    }
}

impl fmt::Display for NarInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "\
StorePath: /nix/store/yhzvzdq82lzk0kvrp3i79yhjnhps6qpk-hello-2.10
URL: nar/1xbx6mir1krb81rb6g2paz2mxgpjkxqc0v9i2pyl90zmjdxjv0ld.nar.xz
Compression: xz
FileHash: sha256:1xbx6mir1krb81rb6g2paz2mxgpjkxqc0v9i2pyl90zmjdxjv0ld
FileSize: 41204
NarHash: sha256:0v1pkm7xg0gp5avnd0qbnmmhcw97rwwwyfxf467imwcvvpyl54hz
NarSize: 205920
References: xlxiw4rnxx2dksa91fizjzf7jb5nqghc-glibc-2.27 yhzvzdq82lzk0kvrp3i79yhjnhps6qpk-hello-2.10
Deriver: dsjl0sbwpcrxfg85bq75y1j1hbwrxjy9-hello-2.10.drv
Sig: cache.nixos.org-1:ek9X+mtn4eOMwIfDIq4gyzO/pFOjOvTracg5+SPMAMcSRrNravyRPVyaOgmjy3vTXKC6AavAxfILAg7mpVnDDg==
";

    #[test]
    fn parse_full_narinfo() {
        let info = NarInfo::parse(HELLO).unwrap();
        assert_eq!(info.store_path.name(), "hello-2.10");
        assert_eq!(info.meta.compression, Compression::Xz);
        assert_eq!(info.meta.file_size, Some(41204));
        assert_eq!(info.meta.nar_size, 205920);
        assert_eq!(info.references.len(), 2);
        assert!(info.has_self_reference());
        assert!(info.meta.sig.is_some());
        assert!(info.meta.ca.is_none());
    }

    #[test]
    fn parse_format_round_trip() {
        let info = NarInfo::parse(HELLO).unwrap();
        assert_eq!(NarInfo::parse(&info.to_text()).unwrap(), info);
    }

    #[test]
    fn parse_empty_references() {
        let text = "\
StorePath: /nix/store/fv8g2yczna9d78d150km0h73fkijw021-openssl-1.1.1d.tar.gz
URL: nar/0zxydma1vh0gnncnkw3cxfpsl4y1rl5zsw0bprqyvb5zsklck6k5.nar.xz
Compression: xz
NarHash: sha256:0i6abchw6pa0p313ahhz0myrr2sbk1npxkkprbbw1qmz6javbc6x
NarSize: 8845976
References: \n";
        let info = NarInfo::parse(text).unwrap();
        assert!(info.references.is_empty());
        assert!(!info.has_self_reference());
    }

    #[test]
    fn parse_missing_mandatory_key() {
        let text = "URL: nar/x.nar\nNarHash: sha256:abc\nNarSize: 1\n";
        let err = NarInfo::parse(text).unwrap_err();
        assert!(err.to_string().contains("StorePath"));
    }

    #[test]
    fn parse_ignores_unknown_keys() {
        let text = format!("{HELLO}System: x86_64-linux\n");
        assert!(NarInfo::parse(&text).is_ok());
    }

    #[test]
    fn reference_paths_parse() {
        let info = NarInfo::parse(HELLO).unwrap();
        let paths: Vec<_> = info.reference_paths().collect::<crate::Result<_>>().unwrap();
        assert_eq!(paths[0].name(), "glibc-2.27");
    }
}
