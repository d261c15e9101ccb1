//! The per-run scratch directory.
//!
//! Every intermediate file of a run (page bitmaps, recognition markup, the
//! edit script) lives in one [`Workspace`]. A scoped workspace is removed
//! when closed or dropped. A retained one, created in debug mode, is never
//! removed so its contents can be inspected after the run, including after
//! a failed run.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

const PREFIX: &str = "ocrodjvu.";

#[derive(Debug)]
pub enum Workspace {
    /// Removed on close or drop.
    Scoped(TempDir),
    /// Left on disk.
    Retained(PathBuf),
}

impl Workspace {
    /// Create a fresh workspace under the system temporary directory.
    pub fn create(debug: bool) -> io::Result<Self> {
        Self::create_in(std::env::temp_dir(), debug)
    }

    pub fn create_in(parent: impl AsRef<Path>, debug: bool) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(PREFIX).tempdir_in(parent)?;
        debug!("Created workspace {}", dir.path().display());
        Ok(if debug {
            Workspace::Retained(dir.keep())
        } else {
            Workspace::Scoped(dir)
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            Workspace::Scoped(dir) => dir.path(),
            Workspace::Retained(path) => path,
        }
    }

    pub fn is_retained(&self) -> bool {
        matches!(self, Workspace::Retained(_))
    }

    /// Create (or truncate) a file in the workspace, open for reading and writing.
    ///
    /// In a scoped workspace the file is removed when the handle is dropped.
    pub fn file(&self, name: &str) -> io::Result<ScratchFile> {
        let path = self.path().join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(ScratchFile {
            path,
            file,
            keep: self.is_retained(),
        })
    }

    /// Release the workspace. Returns the directory's path if it was retained.
    pub fn close(self) -> io::Result<Option<PathBuf>> {
        match self {
            Workspace::Scoped(dir) => {
                dir.close()?;
                Ok(None)
            }
            Workspace::Retained(path) => Ok(Some(path)),
        }
    }
}

/// A file inside a [`Workspace`].
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    file: File,
    keep: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and rewind so the contents can be read back.
    pub fn flush_and_rewind(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

impl Read for ScratchFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for ScratchFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for ScratchFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Unable to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_workspace_is_removed() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ocrodjvu."));

        fs::write(path.join("leftover"), "x").unwrap();
        assert_eq!(workspace.close().unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_scoped_workspace_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_retained_workspace_survives() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), true).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(workspace.is_retained());
        assert_eq!(workspace.close().unwrap(), Some(path.clone()));
        assert!(path.is_dir());
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let mut file = workspace.file("000000.pbm").unwrap();
        file.write_all(b"P4 1 1\n\x80").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.is_file());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_file_kept_in_retained_workspace() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), true).unwrap();
        let file = workspace.file("000000.html").unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        assert!(path.is_file());
    }

    #[test]
    fn test_scratch_file_read_back() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let mut file = workspace.file("script").unwrap();
        file.write_all(b"remove-txt\n").unwrap();
        file.flush_and_rewind().unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "remove-txt\n");
    }
}
