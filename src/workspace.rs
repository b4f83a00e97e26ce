//! Scratch files for a single compression call.
//!
//! Every call owns one [`Scratch`] directory created beside its output path.
//! Trial outputs live in it as [`Artifact`]s; an artifact deletes itself when
//! dropped unless it is promoted onto the output path, and the directory is
//! removed when the `Scratch` drops. Both happen during unwinding too, so no
//! exit path leaves files behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use crate::error::{CompressError, Result};

const DIR_PREFIX: &str = ".filesqueeze-";

#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create a uniquely named directory next to `output`.
    ///
    /// Sharing the output's file system keeps the final promotion an atomic
    /// rename.
    pub fn beside(output: &Path) -> Result<Self> {
        let parent = output_dir(output);
        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| CompressError::io(&parent, e))?;
        log::debug!("Scratch directory {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_bytes(&self, label: &str, bytes: &[u8]) -> Result<Artifact> {
        self.write_with(label, |w| {
            w.write_all(bytes)
                .map_err(|e| CompressError::io(self.path(), e))
        })
    }

    /// Copy an existing file into a new artifact.
    pub fn copy_of(&self, label: &str, source: &Path) -> Result<Artifact> {
        let mut input = File::open(source).map_err(|e| CompressError::io(source, e))?;
        self.write_with(label, |w| {
            std::io::copy(&mut input, w)
                .map(|_| ())
                .map_err(|e| CompressError::io(source, e))
        })
    }

    /// Create an artifact and fill it through `write`.
    pub fn write_with<F>(&self, label: &str, write: F) -> Result<Artifact>
    where
        F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
    {
        let file = tempfile::Builder::new()
            .prefix(label)
            .tempfile_in(self.path())
            .map_err(|e| CompressError::io(self.path(), e))?;
        {
            let mut writer = BufWriter::new(file.as_file());
            write(&mut writer)?;
            writer
                .flush()
                .map_err(|e| CompressError::io(file.path(), e))?;
        }
        let size = file
            .as_file()
            .metadata()
            .map_err(|e| CompressError::io(file.path(), e))?
            .len();
        Ok(Artifact { file, size })
    }
}

/// A file inside a [`Scratch`] directory with its measured size.
#[derive(Debug)]
pub struct Artifact {
    file: NamedTempFile,
    size: u64,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Move onto `output`, replacing any existing file there.
    pub fn promote(self, output: &Path) -> Result<u64> {
        let size = self.size;
        self.file
            .persist(output)
            .map_err(|e| CompressError::io(output, e.error))?;
        Ok(size)
    }
}

fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
