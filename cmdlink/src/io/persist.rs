//! Persistence backends for the alias and mode documents.
//!
//! Stores hold their document in memory and call [`Backend::flush`] after
//! every mutation. A backend never decides what is stored, only where.

use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Load/flush access to one persisted document of type `D`.
pub trait Backend<D>: Send + Sync {
    /// Read the document. A missing document yields `D::default()`.
    fn load(&self) -> Result<D>;

    /// Replace the persisted document with `doc`.
    fn flush(&self, doc: &D) -> Result<()>;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String;
}

/// Pretty-printed JSON file, written atomically (temp file + rename).
#[derive(Debug)]
pub struct JsonFileBackend<D> {
    path: PathBuf,
    _doc: PhantomData<fn() -> D>,
}

impl<D> JsonFileBackend<D> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<D> Backend<D> for JsonFileBackend<D>
where
    D: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<D> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "document missing, starting empty");
            return Ok(D::default());
        }
        let contents =
            fs::read_to_string(&self.path).map_err(|err| Error::store_io(self.describe(), err))?;
        if contents.trim().is_empty() {
            return Ok(D::default());
        }
        serde_json::from_str(&contents).map_err(|err| Error::store_io(self.describe(), err))
    }

    fn flush(&self, doc: &D) -> Result<()> {
        debug!(path = %self.path.display(), "flushing document");
        let mut buf =
            serde_json::to_string_pretty(doc).map_err(|err| Error::store_io(self.describe(), err))?;
        buf.push('\n');
        write_atomic(&self.path, &buf).map_err(|err| Error::store_io(self.describe(), err))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write through a uniquely named sibling temp file, then rename over `path`.
/// Concurrent flushes each get their own temp file; the last rename wins.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
