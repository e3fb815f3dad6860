//! Storage backend trait
//!
//! Defines the interface that all storage implementations must follow,
//! plus the values they hand back to callers: scoped local paths and
//! transport responses.

use bytes::Bytes;
use std::fmt;
use std::io::{Read, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use stowage_core::error::{Operation, Result, StorageError};
use stowage_core::{copy_with_checksum, ByteSource, Checksum, DEFAULT_CHUNK_SIZE};
use tempfile::TempPath;

/// Readable stream over a stored object
pub type ObjectReader = Box<dyn Read + Send>;

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Total number of objects stored
    pub object_count: u64,

    /// Total bytes used by objects
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

impl StorageStats {
    /// Calculate usage percentage
    pub fn usage_percent(&self) -> f64 {
        if self.bytes_capacity == 0 {
            0.0
        } else {
            (self.bytes_used as f64 / self.bytes_capacity as f64) * 100.0
        }
    }

    /// Available space in bytes
    pub fn bytes_available(&self) -> u64 {
        if self.bytes_capacity == 0 {
            u64::MAX
        } else {
            self.bytes_capacity.saturating_sub(self.bytes_used)
        }
    }
}

/// Storage backend trait
///
/// Objects are addressed by backend-generated identifiers returned from
/// `save`. Every failure is reported as a `StorageError`; implementations
/// must not leak raw OS errors.
///
/// Both `save` and `send_file` take file metadata: some backends need it
/// when storing (external object stores), others only when delivering
/// the object to a client.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Open a stored object for reading
    fn open(&self, file_id: &str) -> Result<ObjectReader>;

    /// Store new content under `name`, returning its identifier and checksum.
    ///
    /// Fails if an object already exists under that name.
    fn save(
        &self,
        name: &str,
        content_type: &str,
        filename: &str,
        data: ByteSource<'_>,
    ) -> Result<(String, Checksum)>;

    /// Remove a stored object
    fn delete(&self, file_id: &str) -> Result<()>;

    /// Size of a stored object in bytes
    fn get_size(&self, file_id: &str) -> Result<u64>;

    /// Build the response delivering the object to a client
    fn send_file(
        &self,
        file_id: &str,
        content_type: &str,
        filename: &str,
        inline: bool,
    ) -> Result<SendFile>;

    /// Local filesystem path for read-only access.
    ///
    /// The path may be the permanent location of the object. It must only
    /// be read, and must not be used once the returned guard is dropped.
    /// The default implementation materializes a temporary copy in the
    /// system temp directory.
    fn get_local_path(&self, file_id: &str) -> Result<LocalPath> {
        LocalPath::temporary_copy(self.open(file_id)?, &std::env::temp_dir(), file_id)
    }
}

/// Run `f` with a local path for `file_id`, releasing it afterwards
pub fn with_local_path<B, T, F>(backend: &B, file_id: &str, f: F) -> Result<T>
where
    B: StorageBackend + ?Sized,
    F: FnOnce(&Path) -> T,
{
    let local = backend.get_local_path(file_id)?;
    Ok(f(local.path()))
}

/// Scoped local path of a stored object
///
/// A temporary copy is deleted when the guard is dropped, on every exit
/// path including unwinding. A persistent path is left untouched.
pub struct LocalPath {
    inner: LocalPathInner,
}

enum LocalPathInner {
    Persistent(PathBuf),
    Temporary(TempPath),
}

impl LocalPath {
    /// Path that already points at the stored object
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalPathInner::Persistent(path.into()),
        }
    }

    /// Copy `source` into a new temporary file under `temp_dir`
    pub fn temporary_copy<R: Read>(mut source: R, temp_dir: &Path, file_id: &str) -> Result<Self> {
        let fail = |e: std::io::Error| StorageError::operation(Operation::Open, file_id, e);

        let mut tmp = tempfile::Builder::new()
            .prefix("stowage-")
            .suffix(".tmp")
            .tempfile_in(temp_dir)
            .map_err(fail)?;
        copy_with_checksum(&mut source, tmp.as_file_mut(), DEFAULT_CHUNK_SIZE).map_err(fail)?;
        tmp.as_file_mut().flush().map_err(fail)?;

        Ok(Self {
            inner: LocalPathInner::Temporary(tmp.into_temp_path()),
        })
    }

    /// The local path
    pub fn path(&self) -> &Path {
        match &self.inner {
            LocalPathInner::Persistent(path) => path.as_path(),
            LocalPathInner::Temporary(path) => &**path,
        }
    }

    /// Whether the path is a temporary copy removed on drop
    pub fn is_temporary(&self) -> bool {
        matches!(self.inner, LocalPathInner::Temporary(_))
    }
}

impl Deref for LocalPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        self.path()
    }
}

impl AsRef<Path> for LocalPath {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

impl fmt::Debug for LocalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPath")
            .field("path", &self.path())
            .field("temporary", &self.is_temporary())
            .finish()
    }
}

// ===== Transport Responses =====

/// What the calling layer needs to deliver an object to a client
pub enum SendFile {
    /// Stream the bytes directly
    Stream(FileResponse),

    /// Send the client to an external location instead
    Redirect { url: String },
}

impl SendFile {
    /// The streamed response, if any
    pub fn into_stream(self) -> Option<FileResponse> {
        match self {
            SendFile::Stream(response) => Some(response),
            SendFile::Redirect { .. } => None,
        }
    }
}

impl fmt::Debug for SendFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFile::Stream(response) => f.debug_tuple("Stream").field(response).finish(),
            SendFile::Redirect { url } => f.debug_struct("Redirect").field("url", url).finish(),
        }
    }
}

/// Streamed object with its response headers
pub struct FileResponse {
    pub body: ObjectReader,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub disposition: ContentDisposition,
}

impl FileResponse {
    /// Build a response, guessing the content type from `filename` when
    /// none is given
    pub fn new(body: ObjectReader, content_type: &str, filename: &str, inline: bool) -> Self {
        let content_type = if content_type.is_empty() {
            mime_guess::from_path(filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        } else {
            content_type.to_string()
        };

        Self {
            body,
            content_type,
            content_length: None,
            disposition: ContentDisposition::new(filename, inline),
        }
    }

    /// Set the content length
    pub fn with_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Response headers as name/value pairs
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", self.content_type.clone()),
            ("Content-Disposition", self.disposition.to_string()),
        ];
        if let Some(length) = self.content_length {
            headers.push(("Content-Length", length.to_string()));
        }
        headers
    }

    /// Read the whole body into memory
    pub fn into_bytes(mut self) -> std::io::Result<Bytes> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for FileResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileResponse")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("disposition", &self.disposition)
            .finish_non_exhaustive()
    }
}

/// `Content-Disposition` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    pub inline: bool,
    pub filename: String,
}

impl ContentDisposition {
    pub fn new(filename: impl Into<String>, inline: bool) -> Self {
        Self {
            inline,
            filename: filename.into(),
        }
    }

    fn ascii_fallback(&self) -> String {
        self.filename
            .chars()
            .map(|c| {
                if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.inline { "inline" } else { "attachment" })?;
        if self.filename.is_empty() {
            return Ok(());
        }

        let fallback = self.ascii_fallback();
        write!(f, "; filename=\"{}\"", fallback)?;
        if fallback != self.filename {
            write!(f, "; filename*=UTF-8''{}", encode_rfc5987(&self.filename))?;
        }
        Ok(())
    }
}

fn encode_rfc5987(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => out.push(byte as char),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
