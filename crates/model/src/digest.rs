//! Content digests and change detection.
//!
//! A record is only reprocessed when the fields that came from its source
//! change. Those fields are fed, one by one, into a [`DigestBuilder`] which
//! length-prefixes everything so that `("ab", "c")` and `("a", "bc")` never
//! collide, then hashes the lot with BLAKE3 truncated to 128 bits.
//!
//! Derived values (resized image locators, publish paths, timestamps of the
//! run itself) must never be fed in: if they were, a rerun could never reuse
//! anything.

use crate::entity::Record;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Number of hex characters kept from the BLAKE3 output (128 bits).
const DIGEST_HEX_LEN: usize = 32;

/// A 128-bit fingerprint, rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);
impl Digest {
    /// Digest of raw bytes. Used for URLs (cache keys) as well as images.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self::from_hash(&blake3::hash(bytes.as_ref()))
    }

    fn from_hash(hash: &blake3::Hash) -> Self {
        let mut hex = hash.to_hex().to_string();
        hex.truncate(DIGEST_HEX_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Feeds canonical source fields into a digest.
///
/// Every method writes a type tag and a length prefix before the value, so
/// the byte stream is unambiguous regardless of field contents.
pub struct DigestBuilder {
    hasher: blake3::Hasher,
}
impl DigestBuilder {
    /// Start a digest. The `domain` separates record types that happen to
    /// share field values.
    pub fn new(domain: &str) -> Self {
        let mut builder = Self {
            hasher: blake3::Hasher::new(),
        };
        builder.str(domain);
        builder
    }

    fn raw(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&[tag]);
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.raw(b's', value.as_bytes())
    }

    pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.str(value),
            None => self.raw(b'n', &[]),
        }
    }

    pub fn strs<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<S> = values.into_iter().collect();
        self.u64(values.len() as u64);
        for value in &values {
            self.str(value.as_ref());
        }
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.raw(b'u', &value.to_le_bytes())
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.raw(b'i', &value.to_le_bytes())
    }

    pub fn opt_u64(&mut self, value: Option<u64>) -> &mut Self {
        match value {
            Some(value) => self.u64(value),
            None => self.raw(b'n', &[]),
        }
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.raw(b'b', &[u8::from(value)])
    }

    /// Feed a nested canonical value.
    pub fn nested(&mut self, value: &impl Canonical) -> &mut Self {
        value.canonical(self);
        self
    }

    pub fn finish(&self) -> Digest {
        Digest::from_hash(&self.hasher.finalize())
    }
}

/// Raw source shapes that know which of their fields are canonical.
pub trait Canonical {
    /// Distinguishes digests of different source types.
    const DOMAIN: &'static str;

    /// Feed every source-originated field that should force reprocessing
    /// when it changes. Never feed derived values.
    fn canonical(&self, digest: &mut DigestBuilder);

    fn digest(&self) -> Digest {
        let mut builder = DigestBuilder::new(Self::DOMAIN);
        self.canonical(&mut builder);
        builder.finish()
    }
}

/// Whether the previously persisted version of a record can be reused as-is.
///
/// True only when a previous record exists for the same key and it was
/// built from source data with exactly this digest.
pub fn should_reuse<R: Record>(previous: Option<&R>, digest: &Digest) -> bool {
    previous.is_some_and(|previous| previous.content_digest() == digest)
}
