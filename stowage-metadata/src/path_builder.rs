//! Storage path building
//!
//! Decides which backend a new record is written to and under which
//! logical name.

use crate::file::StoredFile;

/// Strategy computing `(backend name, logical object name)` for a record
pub trait StoragePathBuilder {
    fn build_storage_path(&self, file: &StoredFile) -> (String, String);
}

impl<F> StoragePathBuilder for F
where
    F: Fn(&StoredFile) -> (String, String),
{
    fn build_storage_path(&self, file: &StoredFile) -> (String, String) {
        self(file)
    }
}

/// Builds `<prefix>/<kind>/<record id>/<secure filename>`
#[derive(Debug, Clone)]
pub struct DefaultPathBuilder {
    backend: String,
    prefix: Option<String>,
}

impl DefaultPathBuilder {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            prefix: None,
        }
    }

    /// Prepend `prefix` to every generated name
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl StoragePathBuilder for DefaultPathBuilder {
    fn build_storage_path(&self, file: &StoredFile) -> (String, String) {
        let leaf = format!("{}/{}/{}", file.kind, file.id, secure_filename(&file.filename));
        let path = match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, leaf),
            None => leaf,
        };
        (self.backend.clone(), path)
    }
}

/// Reduce a user-supplied filename to a single safe path segment.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_` and leading dots are removed. Falls back to `file`.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("report.pdf"), "report.pdf");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\cv.doc"), "cv.doc");
        assert_eq!(secure_filename("my slides (final).odp"), "my_slides__final_.odp");
        assert_eq!(secure_filename(".htaccess"), "htaccess");
        assert_eq!(secure_filename("Übersicht.txt"), "_bersicht.txt");
        assert_eq!(secure_filename(""), "file");
        assert_eq!(secure_filename(".."), "file");
        assert_eq!(secure_filename("日本"), "file");
    }

    #[test]
    fn test_default_layout() {
        let file = StoredFile::new("attachment", "a b.txt", "text/plain");
        let (backend, path) = DefaultPathBuilder::new("default").build_storage_path(&file);
        assert_eq!(backend, "default");
        assert_eq!(path, format!("attachment/{}/a_b.txt", file.id));

        let (_, prefixed) = DefaultPathBuilder::new("default")
            .with_prefix("/event/42/")
            .build_storage_path(&file);
        assert_eq!(prefixed, format!("event/42/attachment/{}/a_b.txt", file.id));
    }

    #[test]
    fn test_closure_builder() {
        let file = StoredFile::new("export", "x.csv", "text/csv");
        let builder = |f: &StoredFile| ("archive".to_string(), format!("exports/{}", f.filename));
        assert_eq!(
            builder.build_storage_path(&file),
            ("archive".to_string(), "exports/x.csv".to_string())
        );
    }
}
