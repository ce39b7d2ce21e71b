use std::fs::{self, File};
use std::path::Path;

use anyhow::{bail, Context, Result};
use fs2::FileExt;

/// Exclusive advisory lock over an index directory. Taken for the
/// whole run of an indexer; a second indexer fails fast instead of
/// queueing behind the first.
pub struct IndexLock {
    file: File,
}

impl IndexLock {
    pub fn acquire(dir: &Path) -> Result<IndexLock> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating index directory {}", dir.display()))?;
        let path = dir.join("write.lock");
        let file = File::create(&path)
            .with_context(|| format!("creating lock file {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            bail!("index {} is locked by another indexer", dir.display());
        }
        Ok(IndexLock { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
