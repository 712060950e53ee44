//! Directory-backed [`CachePort`]; each key is a file name.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::error::BalancerError;
use crate::ports::cache_port::CachePort;

pub struct FileCacheAdapter {
    dir: PathBuf,
}

impl FileCacheAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key.replace(['/', '\\'], "_"))
    }
}

impl CachePort for FileCacheAdapter {
    fn load(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path(key)).ok()
    }

    fn age(&self, key: &str) -> Option<Duration> {
        let modified = fs::metadata(self.path(key)).ok()?.modified().ok()?;
        Some(modified.elapsed().unwrap_or(Duration::ZERO))
    }

    fn store(&self, key: &str, content: &str) -> Result<(), BalancerError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
