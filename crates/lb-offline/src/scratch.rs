//! Scratch storage for rendered PCM
//!
//! Each job owns up to two regions next to its outputs:
//! `<input file name>.tmp` (16-bit integer PCM) and
//! `<input file name>.tmp32` (32-bit float PCM). The store also acts as the
//! process-wide registry of live scratch paths so an interrupt can remove
//! every file that might exist, including ones still being written.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use lb_core::{ScratchSample, encode_samples};
use parking_lot::RwLock;

use crate::error::{OfflineError, OfflineResult};
use crate::job::JobId;

/// Samples encoded per write call
const WRITE_BLOCK_SAMPLES: usize = 16384;

/// Scratch region kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScratchKind {
    /// Interleaved i16
    Int,
    /// Interleaved f32
    Float,
}

impl ScratchKind {
    pub const ALL: [ScratchKind; 2] = [Self::Int, Self::Float];

    /// Suffix appended to the input file name
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Int => ".tmp",
            Self::Float => ".tmp32",
        }
    }

    /// Bytes per stored sample
    pub fn sample_bytes(&self) -> usize {
        match self {
            Self::Int => 2,
            Self::Float => 4,
        }
    }
}

#[derive(Debug, Clone)]
struct Namespace {
    dir: PathBuf,
    file_name: String,
}

impl Namespace {
    fn path(&self, kind: ScratchKind) -> PathBuf {
        self.dir.join(format!("{}{}", self.file_name, kind.suffix()))
    }
}

/// Sequential reader over one scratch region
#[derive(Debug)]
pub struct ScratchReader {
    file: File,
    len: u64,
}

impl ScratchReader {
    /// Region length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for ScratchReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Scratch store and live-path registry
#[derive(Debug, Default)]
pub struct ScratchStore {
    namespaces: RwLock<BTreeMap<JobId, Namespace>>,
}

static GLOBAL: OnceLock<ScratchStore> = OnceLock::new();

impl ScratchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide store consulted by the interrupt handler
    pub fn global() -> &'static ScratchStore {
        GLOBAL.get_or_init(ScratchStore::new)
    }

    /// Register where `job` keeps its scratch regions. Must precede `put`.
    pub fn open_namespace(&self, job: JobId, dir: &Path, file_name: &str) {
        self.namespaces.write().insert(
            job,
            Namespace {
                dir: dir.to_path_buf(),
                file_name: file_name.to_string(),
            },
        );
    }

    /// Registered path of a region, whether or not it exists yet
    pub fn path(&self, job: JobId, kind: ScratchKind) -> Option<PathBuf> {
        self.namespaces.read().get(&job).map(|ns| ns.path(kind))
    }

    /// Jobs with a registered namespace
    pub fn live_jobs(&self) -> Vec<JobId> {
        self.namespaces.read().keys().copied().collect()
    }

    fn require_path(&self, job: JobId, kind: ScratchKind) -> OfflineResult<PathBuf> {
        self.path(job, kind)
            .ok_or_else(|| OfflineError::Scratch(format!("No scratch namespace for job {}", job)))
    }

    /// Persist `samples` as the `kind` region of `job`. Returns the byte length.
    pub fn put<S: ScratchSample>(
        &self,
        job: JobId,
        kind: ScratchKind,
        samples: &[S],
    ) -> OfflineResult<u64> {
        if S::BYTES != kind.sample_bytes() {
            return Err(OfflineError::Scratch(format!(
                "{}-byte samples cannot be stored in a {:?} region",
                S::BYTES,
                kind
            )));
        }

        // Held until the file is synced; `purge_all` waits for it
        let namespaces = self.namespaces.read();
        let path = namespaces
            .get(&job)
            .map(|ns| ns.path(kind))
            .ok_or_else(|| OfflineError::Scratch(format!("No scratch namespace for job {}", job)))?;
        let scratch_err =
            |e: io::Error| OfflineError::Scratch(format!("{}: {}", path.display(), e));

        let file = File::create(&path).map_err(scratch_err)?;
        let mut writer = BufWriter::new(file);
        for block in samples.chunks(WRITE_BLOCK_SAMPLES) {
            writer
                .write_all(&encode_samples(block))
                .map_err(scratch_err)?;
        }
        writer.flush().map_err(scratch_err)?;
        let file = writer
            .into_inner()
            .map_err(|e| scratch_err(e.into_error()))?;
        file.sync_all().map_err(scratch_err)?;

        drop(namespaces);

        let bytes = (samples.len() * S::BYTES) as u64;
        log::debug!("Scratch {} written ({} bytes)", path.display(), bytes);
        Ok(bytes)
    }

    /// Open the `kind` region of `job` for sequential reading
    pub fn open_reader(&self, job: JobId, kind: ScratchKind) -> OfflineResult<ScratchReader> {
        let path = self.require_path(job, kind)?;
        let file = File::open(&path)
            .map_err(|e| OfflineError::Scratch(format!("{}: {}", path.display(), e)))?;
        let len = file
            .metadata()
            .map_err(|e| OfflineError::Scratch(format!("{}: {}", path.display(), e)))?
            .len();
        Ok(ScratchReader { file, len })
    }

    /// Delete one region. Returns whether a file was removed; absent is not an error.
    pub fn remove(&self, job: JobId, kind: ScratchKind) -> OfflineResult<bool> {
        match self.path(job, kind) {
            Some(path) => remove_if_exists(&path)
                .map_err(|e| OfflineError::Scratch(format!("{}: {}", path.display(), e))),
            None => Ok(false),
        }
    }

    /// Delete both regions of `job` and forget its namespace.
    /// Returns the number of files removed.
    pub fn discard_job(&self, job: JobId) -> OfflineResult<usize> {
        let mut removed = 0;
        let mut first_error = None;
        for kind in ScratchKind::ALL {
            match self.remove(job, kind) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to remove scratch file: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.namespaces.write().remove(&job);

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Delete every region of every registered job, in ascending job order,
    /// integer before float. Returns the number of files removed.
    pub fn purge_all(&self) -> usize {
        let namespaces = std::mem::take(&mut *self.namespaces.write());
        let mut removed = 0;
        for (job, ns) in namespaces {
            for kind in ScratchKind::ALL {
                let path = ns.path(kind);
                match remove_if_exists(&path) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => log::error!(
                        "Job {}: failed to remove {}: {}",
                        job,
                        path.display(),
                        e
                    ),
                }
            }
        }
        removed
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
