//! Streaming content checksums
//!
//! Objects are copied in fixed-size chunks and every chunk is folded into
//! an MD5 digest before the next read, so payloads of any size are
//! checksummed without being held in memory. The checksum is used for
//! integrity verification only.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::str::FromStr;

/// Length of an MD5 digest in bytes
pub const CHECKSUM_SIZE: usize = 16;

/// MD5 checksum of a stored object
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_SIZE]);

impl Checksum {
    /// Compute the checksum of an in-memory buffer
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Create from raw digest bytes
    pub fn from_bytes(bytes: [u8; CHECKSUM_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.0
    }

    /// Lowercase hex representation (32 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string
    pub fn from_hex(s: &str) -> std::result::Result<Self, ConfigError> {
        let mut bytes = [0u8; CHECKSUM_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| ConfigError::InvalidValue("checksum".to_string(), s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Verify that data matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Copy `source` into `target` in chunks of `chunk_size` bytes.
///
/// Returns the checksum of everything copied. A failed write aborts the
/// copy and leaves `target` truncated; cleaning it up is up to the caller.
pub fn copy_with_checksum<R, W>(source: &mut R, target: &mut W, chunk_size: usize) -> io::Result<Checksum>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        target.write_all(&buf[..n])?;
        context.consume(&buf[..n]);
    }

    Ok(Checksum(context.compute().0))
}

/// Checksum a stream without keeping its content
pub fn compute_checksum<R: Read + ?Sized>(source: &mut R) -> io::Result<Checksum> {
    copy_with_checksum(source, &mut io::sink(), crate::DEFAULT_CHUNK_SIZE)
}
