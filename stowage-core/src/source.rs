//! Byte sources accepted by `save`
//!
//! Callers hand over either a buffer they already hold or any reader.
//! Both are normalized to a single `Read` implementation so backends only
//! deal with streams.

use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use std::fmt;
use std::io::{self, Read};

/// Content to be stored, as a buffer or as a stream
pub enum ByteSource<'a> {
    /// In-memory payload
    Buffer(Reader<Bytes>),
    /// Arbitrary stream, read until EOF
    Stream(Box<dyn Read + Send + 'a>),
}

impl<'a> ByteSource<'a> {
    /// Wrap any reader
    pub fn reader<R: Read + Send + 'a>(reader: R) -> Self {
        ByteSource::Stream(Box::new(reader))
    }

    /// Wrap an in-memory payload
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        ByteSource::Buffer(data.into().reader())
    }

    /// Remaining length, when known without reading
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            ByteSource::Buffer(reader) => Some(reader.get_ref().remaining() as u64),
            ByteSource::Stream(_) => None,
        }
    }
}

impl Read for ByteSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Buffer(reader) => reader.read(buf),
            ByteSource::Stream(reader) => reader.read(buf),
        }
    }
}

impl From<Bytes> for ByteSource<'_> {
    fn from(data: Bytes) -> Self {
        ByteSource::bytes(data)
    }
}

impl From<Vec<u8>> for ByteSource<'_> {
    fn from(data: Vec<u8>) -> Self {
        ByteSource::bytes(data)
    }
}

impl From<&[u8]> for ByteSource<'_> {
    fn from(data: &[u8]) -> Self {
        ByteSource::bytes(Bytes::copy_from_slice(data))
    }
}

impl From<&str> for ByteSource<'_> {
    fn from(data: &str) -> Self {
        ByteSource::from(data.as_bytes())
    }
}

impl fmt::Debug for ByteSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Buffer(reader) => write!(f, "ByteSource::Buffer({} bytes)", reader.get_ref().remaining()),
            ByteSource::Stream(_) => f.write_str("ByteSource::Stream"),
        }
    }
}
