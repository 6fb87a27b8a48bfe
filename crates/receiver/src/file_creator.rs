//! Destination file plumbing.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Opens destination files under a fixed root directory.
///
/// Shared by all workers; every method takes `&self` and the underlying
/// filesystem calls are independently safe, so no locking is needed.
/// Concurrent [`create`](FileCreator::create) calls for the same
/// identifier open the same file (create-without-truncate) and the last
/// writer wins; the sender keeps one file on one connection to avoid
/// this.
#[derive(Debug)]
pub struct FileCreator {
    root: PathBuf,
}

impl FileCreator {
    /// Creates a file creator rooted at `root`. The directory itself is
    /// created lazily with the first file.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The destination root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens `id` for writing under the root, creating parent
    /// directories as needed. The file is created if absent and never
    /// truncated here; sizing is the caller's business.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] when `id` is empty,
    /// absolute, or would escape the root, and otherwise surfaces the
    /// underlying filesystem error.
    pub fn create(&self, id: &str) -> io::Result<File> {
        let path = self.resolve(id)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        debug!(id, path = %path.display(), "opening destination file");
        OpenOptions::new().write(true).create(true).open(path)
    }

    /// Truncates (or extends) an open destination file to `len` bytes.
    ///
    /// # Errors
    ///
    /// Surfaces the underlying filesystem error.
    pub fn truncate(&self, file: &File, len: u64) -> io::Result<()> {
        file.set_len(len)
    }

    fn resolve(&self, id: &str) -> io::Result<PathBuf> {
        if id.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty file identifier",
            ));
        }
        let relative = Path::new(id);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("file identifier '{id}' escapes the destination root"),
                    ));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn creates_nested_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let creator = FileCreator::new(dir.path());
        let mut file = creator.create("a/b/c.txt").expect("create");
        file.write_all(b"payload").expect("write");
        assert_eq!(
            fs::read(dir.path().join("a/b/c.txt")).expect("read back"),
            b"payload"
        );
    }

    #[test]
    fn reopening_does_not_truncate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let creator = FileCreator::new(dir.path());
        let mut file = creator.create("f").expect("create");
        file.write_all(b"0123456789").expect("write");
        drop(file);

        let mut file = creator.create("f").expect("reopen");
        file.write_all(b"xx").expect("overwrite prefix");
        drop(file);
        assert_eq!(fs::read(dir.path().join("f")).expect("read"), b"xx23456789");
    }

    #[test]
    fn truncate_sets_final_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let creator = FileCreator::new(dir.path());
        let file = creator.create("sized").expect("create");
        creator.truncate(&file, 42).expect("truncate");
        assert_eq!(file.metadata().expect("metadata").len(), 42);
    }

    #[test]
    fn rejects_escaping_identifiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let creator = FileCreator::new(dir.path());
        for id in ["../evil", "/etc/passwd", "a/../../b", ""] {
            let error = creator.create(id).expect_err(id);
            assert_eq!(error.kind(), io::ErrorKind::InvalidInput, "id {id:?}");
        }
    }
}
