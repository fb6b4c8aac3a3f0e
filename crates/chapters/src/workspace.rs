use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::info;

const LOG_DIR: &str = "log";
const TMP_DIR: &str = "tmp";
const LEDGER_FILE: &str = "ffjob.json";
const CONCAT_MANIFEST: &str = "concat.txt";
const VMAF_LOG: &str = "vmaf_log.json";

/// Handle to the working area shared by dispatch, status and finalize.
///
/// Every path the crate touches is derived from here; nothing relies on the
/// process's current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    root: PathBuf,
}

impl WorkspaceHandle {
    /// Open (creating if needed) the working area rooted at `root`
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create work directory: {}", root.display()))?;
        let root = fs::canonicalize(root)
            .with_context(|| format!("Failed to resolve work directory: {}", root.display()))?;
        Ok(Self { root })
    }

    /// Open a working area that must already exist. Touches nothing on disk.
    pub fn open_existing(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("Work directory does not exist: {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("Work directory is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    /// Create the log and tmp directories used by a dispatch
    pub fn prepare(&self) -> Result<()> {
        for dir in [self.log_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            info!("'{}' directory is ready.", dir.display());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    /// Append-only log of the chapter job named `title`
    pub fn log_path(&self, title: &str) -> PathBuf {
        self.log_dir().join(format!("{}.log", title))
    }

    pub fn chapter_output_path(&self, title: &str, ext: &str) -> PathBuf {
        self.tmp_dir().join(format!("{}.{}", title, ext))
    }

    pub fn concat_manifest_path(&self) -> PathBuf {
        self.tmp_dir().join(CONCAT_MANIFEST)
    }

    pub fn final_output_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn vmaf_log_path(&self) -> PathBuf {
        self.root.join(VMAF_LOG)
    }
}
