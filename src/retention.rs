use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::time::interval;

/// Deletes stored images older than a fixed age.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    dirs: Vec<PathBuf>,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(dirs: Vec<PathBuf>, max_age: Duration) -> Self {
        Self { dirs, max_age }
    }

    /// Run a sweep every `every` until the process exits.
    pub fn start(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let removed = self.sweep(SystemTime::now()).await;
                tracing::info!(removed, max_age_secs = self.max_age.as_secs(), "Retention sweep finished");
            }
        })
    }

    /// Remove every regular file last modified more than `max_age` before
    /// `now`. Returns how many files were deleted.
    pub async fn sweep(&self, now: SystemTime) -> usize {
        let mut removed = 0;
        for dir in &self.dirs {
            match self.sweep_dir(dir, now).await {
                Ok(count) => removed += count,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "Failed to sweep directory")
                }
            }
        }
        removed
    }

    async fn sweep_dir(&self, dir: &Path, now: SystemTime) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_some_and(|age| age > self.max_age) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "Failed to remove expired image"
                    ),
                }
            }
        }
        Ok(removed)
    }
}
