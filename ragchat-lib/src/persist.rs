//! Staged file writes
//!
//! Content is written to a temp file next to its target and only renamed over
//! the target on [`StagedWrite::commit`]. Dropping an uncommitted stage
//! deletes the temp file and leaves the target untouched.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{Error, Result};

pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Stage `write`'s output for `target`, creating the parent directory.
    pub fn new<F>(target: &Path, write: F) -> Result<Self>
    where
        F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
    {
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(dir, e))?;
        {
            let mut buf = std::io::BufWriter::new(file.as_file_mut());
            write(&mut buf).map_err(|e| Error::persistence(target, e))?;
            buf.flush().map_err(|e| Error::persistence(target, e))?;
        }
        file.as_file()
            .sync_all()
            .map_err(|e| Error::persistence(target, e))?;

        Ok(Self {
            file,
            target: target.to_path_buf(),
        })
    }

    /// Atomically replace the target with the staged content.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| Error::persistence(&target, e.error))?;
        Ok(())
    }
}

/// Write `bytes` to `target` through a temp file and rename.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    StagedWrite::new(target, |w| w.write_all(bytes))?.commit()
}
