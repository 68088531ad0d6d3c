//! Deterministic package fixtures.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use stockpile_core::{Compression, NarInfo, NarMeta, StorePath};

/// The Nix base32 alphabet (no e, o, u, t).
const BASE32: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Deterministic 32-character store path hash derived from a seed.
pub fn store_hash(seed: &str) -> String {
    let mut out = String::with_capacity(32);
    let mut state = {
        let mut h = DefaultHasher::new();
        seed.hash(&mut h);
        h.finish()
    };
    for i in 0..32u64 {
        let mut h = DefaultHasher::new();
        (state, i).hash(&mut h);
        state = h.finish();
        out.push(BASE32[(state % 32) as usize] as char);
    }
    out
}

/// Store path for a named fixture package.
pub fn store_path(seed: &str, name: &str) -> StorePath {
    StorePath::new(store_hash(seed).parse().expect("valid fixture hash"), name)
        .expect("valid fixture path")
}

/// NAR metadata for a named fixture package.
pub fn nar_meta(seed: &str) -> NarMeta {
    NarMeta {
        url: format!("nar/{}.nar.xz", store_hash(seed)),
        compression: Compression::Xz,
        file_hash: Some(format!("sha256:{}file", store_hash(seed))),
        file_size: Some(1024),
        nar_hash: format!("sha256:{}nar", store_hash(seed)),
        nar_size: 4096,
        deriver: None,
        sig: Some("cache.example.org-1:c2lnbmF0dXJl".to_string()),
        ca: None,
    }
}

/// A full narinfo document; references are `(seed, name)` pairs and may
/// include the package itself for a self-reference.
pub fn nar_info(seed: &str, name: &str, references: &[(&str, &str)]) -> NarInfo {
    NarInfo {
        store_path: store_path(seed, name),
        meta: nar_meta(seed),
        references: references
            .iter()
            .map(|(ref_seed, ref_name)| format!("{}-{}", store_hash(ref_seed), ref_name))
            .collect(),
    }
}

/// A three-package chain: app -> lib -> libc, with libc referencing
/// itself.
pub fn chain_closure() -> Vec<NarInfo> {
    vec![
        nar_info("app", "app-1.0", &[("lib", "lib-3.2")]),
        nar_info("lib", "lib-3.2", &[("libc", "libc-2.39")]),
        nar_info("libc", "libc-2.39", &[("libc", "libc-2.39")]),
    ]
}
