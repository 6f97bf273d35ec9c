//! Canonical file locations inside the data directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

/// Default data directory name, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".cmdlink";

/// All canonical paths within a data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub storage_path: PathBuf,
    pub modes_path: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_path: root.join("config.toml"),
            storage_path: root.join("storage.json"),
            modes_path: root.join("modes.json"),
            root,
        }
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        ensure_dir(&self.root)
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(anyhow!("{} exists but is not a directory", path.display()));
    }
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_root() {
        let paths = DataPaths::new("/tmp/data");
        assert_eq!(paths.storage_path, Path::new("/tmp/data/storage.json"));
        assert_eq!(paths.modes_path, Path::new("/tmp/data/modes.json"));
        assert_eq!(paths.config_path, Path::new("/tmp/data/config.toml"));
    }

    #[test]
    fn ensure_root_rejects_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("data");
        fs::write(&file, "").expect("write");
        let err = DataPaths::new(&file).ensure_root().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn ensure_root_creates_nested_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = DataPaths::new(temp.path().join("a").join("b"));
        paths.ensure_root().expect("ensure");
        assert!(paths.root.is_dir());
    }
}
