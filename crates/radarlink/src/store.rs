//! History log for decoded samples.
//!
//! The log is a single pretty-printed JSON array, rewritten in full on every
//! append. [`SampleStore`] itself is not safe under concurrent writers; the
//! live pipeline goes through [`StoreWriter`], one task per log file that
//! serializes appends from a queue.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sample::Sample;

/// Read-modify-write JSON array log.
#[derive(Debug, Clone)]
pub struct SampleStore {
    path: PathBuf,
}

impl SampleStore {
    /// Open the log at `path`, creating it (and parent directories) with an
    /// empty array if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::StoreWrite {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let store = Self { path };
        if !store.path.exists() {
            store.write_all(&[])?;
            info!("Created history log at {}", store.path.display());
        }
        Ok(store)
    }

    /// Get the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample.
    ///
    /// After a successful call the file holds the previous contents plus
    /// `sample`. Do not call concurrently for the same file.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read, parsed or rewritten.
    pub fn append(&self, sample: &Sample) -> Result<()> {
        let mut samples = self.load_all()?;
        samples.push(sample.clone());
        self.write_all(&samples)?;
        debug!(total = samples.len(), "appended sample to history log");
        Ok(())
    }

    /// Load the full history in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or is not a JSON array of
    /// samples.
    pub fn load_all(&self) -> Result<Vec<Sample>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| Error::StoreRead {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| Error::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Number of samples in the log.
    ///
    /// # Errors
    ///
    /// Same as [`SampleStore::load_all`].
    pub fn count(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    /// Replace the file contents via a sibling temp file and rename, so a
    /// reader never sees a half-written array.
    fn write_all(&self, samples: &[Sample]) -> Result<()> {
        let json = serde_json::to_string_pretty(samples)?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let write_err = |source| Error::StoreWrite {
            path: self.path.clone(),
            source,
        };
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

/// Single writer for one [`SampleStore`].
#[derive(Debug)]
pub struct StoreWriter;

impl StoreWriter {
    /// Spawn the writer task. It exits once every [`StoreHandle`] is dropped
    /// and the queue has drained.
    #[must_use]
    pub fn spawn(store: SampleStore, queue: usize) -> (StoreHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Sample>(queue.max(1));
        let task = tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                let store = store.clone();
                let outcome = tokio::task::spawn_blocking(move || store.append(&sample)).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("history append failed: {e}"),
                    Err(e) => warn!("history append task failed: {e}"),
                }
            }
            debug!("history writer stopped");
        });
        (StoreHandle { tx }, task)
    }
}

/// Cloneable, non-blocking entry point to a [`StoreWriter`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Sample>,
}

impl StoreHandle {
    /// Queue a sample for appending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreQueue`] if the queue is full or the writer has
    /// stopped. The sample is not retried.
    pub fn append(&self, sample: Sample) -> Result<()> {
        self.tx.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::StoreQueue("queue full".to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                Error::StoreQueue("writer stopped".to_string())
            }
        })
    }
}
