//! src/services/storage_service.rs
//!
//! StorageService — token-addressed object store on a local filesystem.
//! Each object is a directory named by its token under the storage root,
//! holding the raw payload plus one small sidecar entry per metadata fact.
//! There is no database: the directory layout **is** the metadata record.

use crate::models::object::ObjectMeta;
use rand::{Rng, distributions::Alphanumeric};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs::{self, File};
use tracing::{debug, warn};

const PAYLOAD_ENTRY: &str = "data";
const FILENAME_ENTRY: &str = "filename";
const CONTENT_TYPE_ENTRY: &str = "content_type";
const AUTO_DELETE_MARKER: &str = "auto_delete";
const HEADER_DOWNLOAD_MARKER: &str = "header_download";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the object store operations:
/// - Allocate a fresh token (and its directory) for an upload
/// - Write an object (payload + sidecar metadata entries)
/// - Read an object's metadata and open its payload for streaming out
/// - Delete an object after a one-time download
///
/// The service holds no connections and no in-memory object state; cloning
/// it is cheap and every operation goes straight to the filesystem.
#[derive(Clone)]
pub struct StorageService {
    /// Base directory on disk where object directories are created.
    root: PathBuf,

    /// Number of alphanumeric characters in a generated token.
    token_length: usize,
}

impl StorageService {
    /// Create a new StorageService rooted at `root`, generating tokens of
    /// `token_length` characters. The root directory must already exist.
    pub fn new(root: impl Into<PathBuf>, token_length: usize) -> Self {
        Self {
            root: root.into(),
            token_length,
        }
    }

    /// Resolve the directory that holds (or would hold) an object.
    fn object_dir(&self, token: &str) -> PathBuf {
        self.root.join(token)
    }

    /// Whether any entry with this token's name is present under the root.
    ///
    /// A partially-written object counts: its token stays taken until the
    /// directory is removed.
    pub async fn exists(&self, token: &str) -> bool {
        fs::metadata(self.object_dir(token)).await.is_ok()
    }

    /// Allocate an unused token and create its object directory.
    ///
    /// Draws tokens uniformly from `[A-Za-z0-9]` and claims the directory
    /// with an exclusive create, so two concurrent uploads can never both
    /// own the same token; a collision shows up as `AlreadyExists` and the
    /// candidate is discarded. The loop is unbounded: at the default length
    /// the alphabet makes collisions astronomically unlikely, so retries are
    /// effectively free.
    pub async fn allocate(&self) -> StorageResult<(String, PathBuf)> {
        loop {
            let token = random_token(self.token_length);
            let dir = self.object_dir(&token);
            match fs::create_dir(&dir).await {
                Ok(()) => return Ok((token, dir)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!("token `{}` already taken, drawing another", token);
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
    }

    /// Persist an object into `dir`: payload plus one sidecar entry per
    /// metadata fact. Boolean facts are written only when set; their
    /// presence is the encoding.
    ///
    /// A failure partway through leaves whatever was written so far in
    /// place. There is no rollback: the token stays burned and a later
    /// download of an incomplete object fails on its missing entries.
    pub async fn write_object(
        &self,
        dir: &Path,
        payload: &[u8],
        filename: &str,
        content_type: &str,
        auto_delete: bool,
        header_download: bool,
    ) -> StorageResult<()> {
        fs::create_dir_all(dir).await?;

        fs::write(dir.join(PAYLOAD_ENTRY), payload).await?;
        fs::write(dir.join(FILENAME_ENTRY), filename).await?;
        fs::write(dir.join(CONTENT_TYPE_ENTRY), content_type).await?;

        if auto_delete {
            fs::write(dir.join(AUTO_DELETE_MARKER), b"").await?;
        }
        if header_download {
            fs::write(dir.join(HEADER_DOWNLOAD_MARKER), b"").await?;
        }

        Ok(())
    }

    /// Read an object's metadata entries.
    ///
    /// The filename entry is the existence check for the whole object: a
    /// missing filename means NotFound. The content type is mandatory too,
    /// but once the filename was readable its absence is an inconsistent
    /// object, not an unknown token, so it surfaces as an I/O error. The
    /// two markers are optional; only their presence is consulted.
    pub async fn read_metadata(&self, token: &str) -> StorageResult<ObjectMeta> {
        let dir = self.object_dir(token);

        let filename = match fs::read_to_string(dir.join(FILENAME_ENTRY)).await {
            Ok(value) => value,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(token.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        let content_type = fs::read_to_string(dir.join(CONTENT_TYPE_ENTRY)).await?;

        let auto_delete = marker_present(&dir.join(AUTO_DELETE_MARKER)).await?;
        let header_download = marker_present(&dir.join(HEADER_DOWNLOAD_MARKER)).await?;

        Ok(ObjectMeta {
            filename,
            content_type,
            auto_delete,
            header_download,
        })
    }

    /// Open an object's payload for streaming and report its size.
    pub async fn open_payload(&self, token: &str) -> StorageResult<(File, u64)> {
        let path = self.object_dir(token).join(PAYLOAD_ENTRY);
        let file = File::open(&path).await?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    /// Remove the whole object directory.
    ///
    /// Runs after the response has already been sent, so failures can only
    /// be logged, never surfaced.
    pub async fn delete_object(&self, token: &str) {
        let dir = self.object_dir(token);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("removed object directory {}", dir.display()),
            Err(err) => warn!(
                "failed to remove object directory {}: {}",
                dir.display(),
                err
            ),
        }
    }
}

/// True if the marker entry exists; NotFound means the flag was never set.
async fn marker_present(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StorageError::Io(err)),
    }
}

/// Draw `length` characters uniformly from the 62-character alphanumeric
/// alphabet.
fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
