//! Sinks for completed episode batches

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::trajectory::SampleBatch;
use crate::Result;

/// Default size at which [`JsonWriter`] starts a new file
pub const DEFAULT_MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Destination for finished batches
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// Persist one batch; ownership passes to the writer
    async fn write(&mut self, batch: SampleBatch) -> Result<()>;
}

struct OpenFile {
    path: PathBuf,
    file: File,
    written: u64,
}

/// Appends batches as JSON lines to rotating files in an output directory
pub struct JsonWriter {
    dir: PathBuf,
    max_file_size: u64,
    stamp: String,
    file_index: usize,
    current: Option<OpenFile>,
}

impl JsonWriter {
    /// Create a writer; files are opened lazily on the first write
    pub fn new(dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
            stamp: chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
            file_index: 0,
            current: None,
        }
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File currently being appended to
    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.path.as_path())
    }

    async fn open_next(&mut self) -> Result<&mut OpenFile> {
        fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("output-{}_worker-0_{}.json", self.stamp, self.file_index));
        self.file_index += 1;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let written = file.metadata().await?.len();
        info!(path = %path.display(), "opened experience file");

        Ok(self.current.insert(OpenFile {
            path,
            file,
            written,
        }))
    }
}

#[async_trait]
impl BatchWriter for JsonWriter {
    async fn write(&mut self, batch: SampleBatch) -> Result<()> {
        let mut line = serde_json::to_vec(&batch)?;
        line.push(b'\n');

        let rotate = self
            .current
            .as_ref()
            .map_or(true, |c| c.written >= self.max_file_size);
        let out = if rotate {
            self.open_next().await?
        } else {
            self.current
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("experience file not open"))?
        };

        if let Err(e) = append(out, &line).await {
            // A partial line may be on disk; never append after it.
            warn!(error = %e, "experience write failed, abandoning current file");
            self.current = None;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn append(out: &mut OpenFile, line: &[u8]) -> std::io::Result<()> {
    out.file.write_all(line).await?;
    out.file.flush().await?;
    out.written += line.len() as u64;
    Ok(())
}

/// Keeps batches in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    batches: Arc<Mutex<Vec<SampleBatch>>>,
}

impl MemoryWriter {
    /// Create an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every batch written so far
    #[must_use]
    pub fn batches(&self) -> Vec<SampleBatch> {
        self.storage().clone()
    }

    // A panic elsewhere cannot leave a half-pushed Vec, so poisoning is ignored.
    fn storage(&self) -> MutexGuard<'_, Vec<SampleBatch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BatchWriter for MemoryWriter {
    async fn write(&mut self, batch: SampleBatch) -> Result<()> {
        self.storage().push(batch);
        Ok(())
    }
}
