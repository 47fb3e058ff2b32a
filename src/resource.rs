//! Exchange-scoped ownership of temp files and open streams.
//!
//! One [`ResourceManager`] is created at the start of an outbound send or an
//! inbound receive and passed by reference to everything that opens a stream
//! or spools content to disk. Closing it (explicitly, or by dropping it)
//! closes every adopted stream and then deletes every temp file it created.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{As4Error, Result};

type StreamSlot = Mutex<Option<Box<dyn Read + Send>>>;

/// Registry of temp files and adopted streams for one exchange.
///
/// Not meant to be shared between exchanges. The internal lock only exists
/// so the manager can be handed to code that requires `Sync`.
pub struct ResourceManager {
    temp_dir: Option<PathBuf>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    temp_files: Vec<TempPath>,
    streams: Vec<Arc<StreamSlot>>,
    closed: bool,
}

/// Outcome of [`ResourceManager::close`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloseSummary {
    /// Number of adopted streams that were still open and got closed.
    pub streams_closed: usize,
    /// Number of temp files removed from disk.
    pub files_deleted: usize,
    /// Temp files that could not be deleted.
    pub failed_deletions: Vec<PathBuf>,
}

impl ResourceManager {
    /// Create a manager that places temp files in the OS temp directory.
    pub fn new() -> Self {
        Self {
            temp_dir: None,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create a manager that places temp files in `dir`.
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create and register a new, uniquely named, empty temp file.
    pub fn create_temp_file(&self) -> Result<PathBuf> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(As4Error::ResourceManagerClosed);
        }

        let dir = self
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let file = tempfile::Builder::new()
            .prefix("as4-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| As4Error::io(&dir, e))?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        debug!(path = %path.display(), "Created temp file");
        registry.temp_files.push(temp_path);
        Ok(path)
    }

    /// Register an already open stream so it is closed with this manager.
    pub fn adopt<R>(&self, stream: R) -> Result<ManagedStream>
    where
        R: Read + Send + 'static,
    {
        let mut registry = self.lock();
        if registry.closed {
            return Err(As4Error::ResourceManagerClosed);
        }
        let slot: Arc<StreamSlot> = Arc::new(Mutex::new(Some(Box::new(stream))));
        registry.streams.push(Arc::clone(&slot));
        Ok(ManagedStream { slot })
    }

    /// Number of temp files currently registered.
    pub fn temp_file_count(&self) -> usize {
        self.lock().temp_files.len()
    }

    /// Paths of all temp files currently registered.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.lock()
            .temp_files
            .iter()
            .map(|p| p.to_path_buf())
            .collect()
    }

    /// Whether [`close`](Self::close) already ran.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close all adopted streams, then delete all temp files.
    ///
    /// Best-effort: a failure on one resource does not stop the others.
    /// Calling it again is a no-op that returns an empty summary.
    pub fn close(&self) -> CloseSummary {
        let (streams, temp_files) = {
            let mut registry = self.lock();
            if registry.closed {
                return CloseSummary::default();
            }
            registry.closed = true;
            (
                std::mem::take(&mut registry.streams),
                std::mem::take(&mut registry.temp_files),
            )
        };

        let mut summary = CloseSummary::default();

        for slot in streams {
            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            if guard.take().is_some() {
                summary.streams_closed += 1;
            }
        }

        for temp_path in temp_files {
            let path = temp_path.to_path_buf();
            match temp_path.close() {
                Ok(()) => summary.files_deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => summary.files_deleted += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                    summary.failed_deletions.push(path);
                }
            }
        }

        debug!(
            streams = summary.streams_closed,
            files = summary.files_deleted,
            failures = summary.failed_deletions.len(),
            "Closed resource manager"
        );
        summary
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("ResourceManager")
            .field("temp_dir", &self.temp_dir)
            .field("temp_files", &registry.temp_files.len())
            .field("streams", &registry.streams.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

/// A readable stream whose lifetime is bounded by a [`ResourceManager`].
///
/// Reading after the manager closed the stream fails with an I/O error.
pub struct ManagedStream {
    slot: Arc<StreamSlot>,
}

impl ManagedStream {
    /// Whether the underlying stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Close the underlying stream early. The manager will skip it later.
    pub fn close(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Read for ManagedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(stream) => stream.read(buf),
            None => Err(io::Error::other("stream was closed by its resource manager")),
        }
    }
}

impl std::fmt::Debug for ManagedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}
