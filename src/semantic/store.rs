//! Persistent embedding storage keyed by the embedded text.
//!
//! On-disk layout (RocksDB):
//! - key: UTF-8 bytes of the text that was embedded
//! - value: the vector as raw little-endian f32 values, no header or length
//!
//! One reserved key holds the fingerprint of the encoder that produced the
//! stored vectors. Opening a store with a different fingerprint wipes it,
//! since vectors from different models are not comparable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rocksdb::{IteratorMode, Options, DB};

/// Reserved key holding the active encoder fingerprint.
pub const FINGERPRINT_KEY: &str = "\u{0}__encoder_fingerprint__";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open embedding store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rocksdb::Error,
    },

    #[error("Embedding store error: {0}")]
    Db(#[from] rocksdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt embedding for key {key:?}: {len} bytes is not a whole number of f32 values")]
    Corrupt { key: String, len: usize },

    #[error("Key {0:?} is reserved")]
    ReservedKey(String),

    #[error("Embedding store at {0} still carries a stale fingerprint after reset")]
    ResetFailed(PathBuf),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Key to vector storage shared by the corpus store and the query cache.
///
/// Implementations must be safe to call from several threads; concurrent
/// writes to the same key are last-write-wins.
pub trait EmbeddingStore: Send + Sync {
    /// Undecoded value bytes.
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &str, vector: &[f32]) -> Result<(), StoreError>;

    fn has(&self, key: &str) -> Result<bool, StoreError>;

    fn get(&self, key: &str) -> Result<Option<Vec<f32>>, StoreError> {
        self.get_raw(key)?
            .map(|bytes| decode_vector(key, &bytes))
            .transpose()
    }
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_vector(key: &str, bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key == FINGERPRINT_KEY {
        return Err(StoreError::ReservedKey(key.to_string()));
    }
    Ok(())
}

/// RocksDB-backed embedding store tagged with an encoder fingerprint.
pub struct RocksDbStore {
    db: DB,
    path: PathBuf,
}

impl RocksDbStore {
    /// Open (or create) the store at `path` for the given encoder fingerprint.
    ///
    /// - no fingerprint, empty store: tag it
    /// - no fingerprint, existing data: warn and adopt the data as-is
    /// - different fingerprint: destroy everything and start empty
    /// - same fingerprint: use as-is
    pub fn open(path: &Path, fingerprint: &str) -> Result<Self, StoreError> {
        Self::open_inner(path, fingerprint, true)
    }

    fn options() -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts
    }

    fn open_db(path: &Path) -> Result<DB, StoreError> {
        DB::open(&Self::options(), path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })
    }

    fn open_inner(path: &Path, fingerprint: &str, allow_reset: bool) -> Result<Self, StoreError> {
        let db = Self::open_db(path)?;

        match db.get(FINGERPRINT_KEY)? {
            Some(stored) if stored == fingerprint.as_bytes() => {
                log::debug!("Opened embedding store at {}", path.display());
            }
            Some(stored) => {
                if !allow_reset {
                    return Err(StoreError::ResetFailed(path.to_path_buf()));
                }

                log::warn!(
                    "Embedding store at {} was built by another encoder ({}), wiping it",
                    path.display(),
                    String::from_utf8_lossy(&stored)
                );
                drop(db);
                DB::destroy(&Self::options(), path)?;
                if path.exists() {
                    std::fs::remove_dir_all(path)?;
                }

                let fresh = Self::open_db(path)?;
                fresh.put(FINGERPRINT_KEY, fingerprint.as_bytes())?;
                fresh.flush()?;
                drop(fresh);

                return Self::open_inner(path, fingerprint, false);
            }
            None => {
                let has_data = db.iterator(IteratorMode::Start).next().transpose()?.is_some();
                if has_data {
                    log::warn!(
                        "Embedding store at {} has no encoder fingerprint, adopting it for the current encoder",
                        path.display()
                    );
                }
                db.put(FINGERPRINT_KEY, fingerprint.as_bytes())?;
            }
        }

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored embeddings, excluding the fingerprint entry.
    pub fn count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for entry in self.db.iterator(IteratorMode::Start) {
            let (key, _) = entry?;
            if &*key != FINGERPRINT_KEY.as_bytes() {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl EmbeddingStore for RocksDbStore {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        check_key(key)?;
        Ok(self.db.get(key.as_bytes())?)
    }

    fn put(&self, key: &str, vector: &[f32]) -> Result<(), StoreError> {
        check_key(key)?;
        self.db.put(key.as_bytes(), encode_vector(vector))?;
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        Ok(self.db.get_pinned(key.as_bytes())?.is_some())
    }
}

/// In-process store, used as a query cache and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, vector: &[f32]) -> Result<(), StoreError> {
        check_key(key)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), encode_vector(vector));
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(entries.contains_key(key))
    }
}
