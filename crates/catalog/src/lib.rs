use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub mod media;

pub use media::*;

/// Working copy of the record collection.
pub const RECORDS_KEY: &str = "memories.json";
/// Untouched copy saved at import time, used to detect local edits.
pub const ORIGINAL_RECORDS_KEY: &str = "memories_original.json";

/// One persisted file of the session (archive photo or JSON document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub name: String,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl StoredBlob {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn json(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, "application/json", bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_id(&self) -> String {
        content_id(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    StorageUnavailable,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "session entry not found"),
            StoreError::StorageUnavailable => write!(f, "browser storage unavailable"),
            StoreError::Corrupt(msg) => write!(f, "session storage corrupt: {msg}"),
            StoreError::Io(msg) => write!(f, "session storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Key to blob persistence for the current session.
pub trait SessionStore {
    fn save(&mut self, key: &str, blob: StoredBlob) -> Result<(), StoreError>;
    fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError>;
    fn load_all(&self) -> Result<BTreeMap<String, StoredBlob>, StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
}

pub fn content_id(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn base64_to_bytes(encoded: &str) -> Result<Vec<u8>, StoreError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// True when the working collection differs byte-wise from the imported original.
///
/// Missing blobs count as "no difference": there is nothing to export.
pub fn has_diverged_from_import<S: SessionStore + ?Sized>(store: &S) -> Result<bool, StoreError> {
    let Some(current) = store.load(RECORDS_KEY)? else {
        return Ok(false);
    };
    let Some(original) = store.load(ORIGINAL_RECORDS_KEY)? else {
        return Ok(false);
    };
    if current.content_id() == original.content_id() {
        return Ok(false);
    }
    Ok(current.bytes != original.bytes)
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: BTreeMap<String, StoredBlob>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&mut self, key: &str, blob: StoredBlob) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), blob);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn load_all(&self) -> Result<BTreeMap<String, StoredBlob>, StoreError> {
        Ok(self.entries.clone())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{SessionStore, StoreError, StoredBlob};
    use std::collections::BTreeMap;

    // Keep per-chunk strings relatively small to reduce peak wasm allocations.
    // IMPORTANT: must be a multiple of 4 to preserve base64 quartet boundaries.
    const PAYLOAD_CHUNK_CHARS: usize = 64_000;

    #[derive(Debug)]
    pub struct LocalStorageSessionStore {
        key_prefix: String,
    }

    impl LocalStorageSessionStore {
        pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
            let store = Self {
                key_prefix: key.into(),
            };
            // Fail early when storage is blocked (private mode, sandboxed iframe).
            window_local_storage()?;
            Ok(store)
        }

        fn index_key(&self) -> String {
            format!("{}.index", self.key_prefix)
        }

        fn meta_key(&self, key: &str) -> String {
            format!("{}.meta.{}", self.key_prefix, key)
        }

        fn chunk_count_key(&self, key: &str) -> String {
            format!("{}.data.{}.count", self.key_prefix, key)
        }

        fn chunk_key(&self, key: &str, idx: usize) -> String {
            format!("{}.data.{}.{}", self.key_prefix, key, idx)
        }

        fn load_index(&self) -> Result<Vec<String>, StoreError> {
            let storage = window_local_storage()?;
            let raw = storage
                .get_item(&self.index_key())
                .map_err(|e| StoreError::Io(format!("get_item(index) failed: {:?}", e)))?;

            let Some(raw) = raw else {
                return Ok(Vec::new());
            };
            if raw.trim().is_empty() {
                return Ok(Vec::new());
            }
            let mut keys = serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            keys.sort();
            keys.dedup();
            Ok(keys)
        }

        fn save_index(&self, mut keys: Vec<String>) -> Result<(), StoreError> {
            keys.sort();
            keys.dedup();

            let storage = window_local_storage()?;
            let raw = serde_json::to_string(&keys).map_err(|e| StoreError::Io(e.to_string()))?;
            storage
                .set_item(&self.index_key(), &raw)
                .map_err(|e| StoreError::Io(format!("set_item(index) failed: {:?}", e)))?;
            Ok(())
        }

        fn load_chunk_count(&self, key: &str) -> Result<usize, StoreError> {
            let storage = window_local_storage()?;
            let raw = storage
                .get_item(&self.chunk_count_key(key))
                .map_err(|e| StoreError::Io(format!("get_item(chunk_count) failed: {:?}", e)))?;
            let Some(raw) = raw else {
                return Ok(0);
            };
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(0);
            }
            raw.parse::<usize>()
                .map_err(|e| StoreError::Corrupt(format!("invalid chunk count: {e}")))
        }

        fn remove_chunks(&self, key: &str) -> Result<(), StoreError> {
            let storage = window_local_storage()?;
            let count = self.load_chunk_count(key)?;
            for i in 0..count {
                let _ = storage.remove_item(&self.chunk_key(key, i));
            }
            let _ = storage.remove_item(&self.chunk_count_key(key));
            Ok(())
        }

        fn save_chunks(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
            let storage = window_local_storage()?;

            // Convert max output chars to a safe input chunk size.
            let chunk_bytes = ((PAYLOAD_CHUNK_CHARS / 4) * 3).max(3);

            self.remove_chunks(key)?;

            let mut count = 0usize;
            for (i, chunk) in bytes.chunks(chunk_bytes).enumerate() {
                storage
                    .set_item(&self.chunk_key(key, i), &super::bytes_to_base64(chunk))
                    .map_err(|e| StoreError::Io(format!("set_item(chunk) failed: {:?}", e)))?;
                count = i + 1;
            }

            storage
                .set_item(&self.chunk_count_key(key), &count.to_string())
                .map_err(|e| StoreError::Io(format!("set_item(chunk_count) failed: {:?}", e)))?;
            Ok(())
        }

        fn load_payload(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            let storage = window_local_storage()?;
            let count = self.load_chunk_count(key)?;
            let mut out: Vec<u8> = Vec::new();
            for i in 0..count {
                let raw = storage
                    .get_item(&self.chunk_key(key, i))
                    .map_err(|e| StoreError::Io(format!("get_item(chunk) failed: {:?}", e)))?
                    .ok_or_else(|| StoreError::Corrupt("missing payload chunk".to_string()))?;
                out.extend_from_slice(&super::base64_to_bytes(&raw)?);
            }
            Ok(out)
        }
    }

    impl SessionStore for LocalStorageSessionStore {
        fn save(&mut self, key: &str, blob: StoredBlob) -> Result<(), StoreError> {
            let storage = window_local_storage()?;
            // Metadata JSON stays small; the payload is chunked base64.
            let meta = serde_json::to_string(&blob).map_err(|e| StoreError::Io(e.to_string()))?;
            storage
                .set_item(&self.meta_key(key), &meta)
                .map_err(|e| StoreError::Io(format!("set_item(meta) failed: {:?}", e)))?;
            self.save_chunks(key, &blob.bytes)?;

            let mut keys = self.load_index()?;
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
                self.save_index(keys)?;
            }
            Ok(())
        }

        fn load(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
            let storage = window_local_storage()?;
            let raw = storage
                .get_item(&self.meta_key(key))
                .map_err(|e| StoreError::Io(format!("get_item(meta) failed: {:?}", e)))?;
            let Some(raw) = raw else {
                return Ok(None);
            };
            let mut blob = serde_json::from_str::<StoredBlob>(&raw)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            blob.bytes = self.load_payload(key)?;
            Ok(Some(blob))
        }

        fn load_all(&self) -> Result<BTreeMap<String, StoredBlob>, StoreError> {
            let mut out = BTreeMap::new();
            for key in self.load_index()? {
                if let Some(blob) = self.load(&key)? {
                    out.insert(key, blob);
                }
            }
            Ok(out)
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            let storage = window_local_storage()?;
            for key in self.load_index()? {
                let _ = storage.remove_item(&self.meta_key(&key));
                let _ = self.remove_chunks(&key);
            }
            storage
                .remove_item(&self.index_key())
                .map_err(|e| StoreError::Io(format!("remove_item(index) failed: {:?}", e)))?;
            Ok(())
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StoreError> {
        let win = web_sys::window().ok_or(StoreError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| StoreError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StoreError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageSessionStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageSessionStore;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSessionStore {
    pub fn new(_key: impl Into<String>) -> Result<Self, StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SessionStore for LocalStorageSessionStore {
    fn save(&mut self, _key: &str, _blob: StoredBlob) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn load(&self, _key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn load_all(&self) -> Result<BTreeMap<String, StoredBlob>, StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}
