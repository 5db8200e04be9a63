use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{SessionStore, StoreError, StoredBlob};

/// Where archive photos may live when the logical path does not match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub fallback_folders: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_folders: vec![
                "Photos/post/".to_string(),
                "Photos/profile/".to_string(),
                "Photos/bereal/".to_string(),
            ],
        }
    }
}

/// Maps an archive-relative path to a displayable URL.
///
/// An unresolvable path yields an empty string rather than an error; callers
/// render a placeholder for it.
pub trait MediaResolver {
    fn resolve(&mut self, logical_path: &str) -> String;
}

/// Creates and revokes display URLs for blobs.
pub trait ObjectUrlFactory {
    fn create(&mut self, path: &str, blob: &StoredBlob) -> String;
    fn revoke(&mut self, url: &str);
}

/// Native URL factory: content-addressed `blob:` URLs, nothing to release.
#[derive(Debug, Default)]
pub struct ContentUrlFactory {
    live: usize,
}

impl ContentUrlFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_urls(&self) -> usize {
        self.live
    }
}

impl ObjectUrlFactory for ContentUrlFactory {
    fn create(&mut self, path: &str, blob: &StoredBlob) -> String {
        self.live += 1;
        format!("blob:{}/{}", &blob.content_id()[..16], path)
    }

    fn revoke(&mut self, _url: &str) {
        self.live = self.live.saturating_sub(1);
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::ObjectUrlFactory;
    use crate::StoredBlob;

    /// Wraps `URL.createObjectURL` / `URL.revokeObjectURL`.
    #[derive(Debug, Default)]
    pub struct BrowserUrlFactory;

    impl ObjectUrlFactory for BrowserUrlFactory {
        fn create(&mut self, path: &str, blob: &StoredBlob) -> String {
            let array = js_sys::Uint8Array::from(blob.bytes.as_slice());
            let parts = js_sys::Array::new();
            parts.push(&array.buffer());
            let opts = web_sys::BlobPropertyBag::new();
            opts.set_type(&blob.mime);
            let created = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &opts)
                .and_then(|b| web_sys::Url::create_object_url_with_blob(&b));
            match created {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(path, error = ?e, "createObjectURL failed");
                    String::new()
                }
            }
        }

        fn revoke(&mut self, url: &str) {
            let _ = web_sys::Url::revoke_object_url(url);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserUrlFactory;

/// Resolves photo paths against the imported archive, memoizing created URLs.
///
/// URLs are keyed by archive file, so every logical path that lands on the
/// same file shares one handle and replacing the file revokes it.
#[derive(Debug)]
pub struct ArchiveResolver<F: ObjectUrlFactory> {
    files: BTreeMap<String, StoredBlob>,
    urls: BTreeMap<String, String>,
    /// Logical path -> archive key it resolved to.
    aliases: BTreeMap<String, String>,
    config: ResolverConfig,
    factory: F,
}

impl<F: ObjectUrlFactory> ArchiveResolver<F> {
    pub fn new(config: ResolverConfig, factory: F) -> Self {
        Self {
            files: BTreeMap::new(),
            urls: BTreeMap::new(),
            aliases: BTreeMap::new(),
            config,
            factory,
        }
    }

    /// Loads every persisted blob except the JSON documents.
    pub fn from_store<S: SessionStore + ?Sized>(
        store: &S,
        config: ResolverConfig,
        factory: F,
    ) -> Result<Self, StoreError> {
        let mut resolver = Self::new(config, factory);
        resolver.reload_from_store(store)?;
        Ok(resolver)
    }

    /// Replaces the archive with the store's blobs, revoking earlier URLs.
    pub fn reload_from_store<S: SessionStore + ?Sized>(&mut self, store: &S) -> Result<usize, StoreError> {
        let blobs = store.load_all()?;
        self.clear();
        for (key, blob) in blobs {
            if key == crate::RECORDS_KEY || key == crate::ORIGINAL_RECORDS_KEY {
                continue;
            }
            self.insert(key, blob);
        }
        Ok(self.files.len())
    }

    pub fn insert(&mut self, path: impl Into<String>, blob: StoredBlob) {
        let path = path.into();
        let key = path.strip_prefix('/').unwrap_or(&path).to_string();
        if let Some(url) = self.urls.remove(&key) {
            self.factory.revoke(&url);
        }
        // A new file may now be the better match for an aliased path.
        self.aliases.clear();
        self.files.insert(key, blob);
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn cached_urls(&self) -> usize {
        self.urls.len()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Revokes every URL handed out so far.
    pub fn revoke_all(&mut self) {
        for url in std::mem::take(&mut self.urls).into_values() {
            self.factory.revoke(&url);
        }
        self.aliases.clear();
    }

    /// Drops archive files and their URLs.
    pub fn clear(&mut self) {
        self.revoke_all();
        self.files.clear();
    }

    fn lookup(&self, clean: &str) -> Option<&str> {
        if let Some((k, _)) = self.files.get_key_value(clean) {
            return Some(k.as_str());
        }
        let filename = clean.rsplit('/').next().unwrap_or(clean);
        self.config.fallback_folders.iter().find_map(|folder| {
            let candidate = format!("{folder}{filename}");
            self.files.get_key_value(&candidate).map(|(k, _)| k.as_str())
        })
    }
}

impl<F: ObjectUrlFactory> MediaResolver for ArchiveResolver<F> {
    fn resolve(&mut self, logical_path: &str) -> String {
        if logical_path.is_empty() {
            return String::new();
        }
        let clean = logical_path.strip_prefix('/').unwrap_or(logical_path);
        let found = match self.aliases.get(clean) {
            Some(key) => key.clone(),
            None => {
                let Some(key) = self.lookup(clean).map(str::to_string) else {
                    tracing::warn!(path = clean, "photo not found in archive");
                    return String::new();
                };
                self.aliases.insert(clean.to_string(), key.clone());
                key
            }
        };
        if let Some(url) = self.urls.get(&found) {
            return url.clone();
        }
        let Some(blob) = self.files.get(&found) else {
            return String::new();
        };
        let url = self.factory.create(&found, blob);
        if !url.is_empty() {
            self.urls.insert(found, url.clone());
        }
        url
    }
}

/// Resolver that returns paths unchanged; used by the CLI and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

impl MediaResolver for PassthroughResolver {
    fn resolve(&mut self, logical_path: &str) -> String {
        logical_path.to_string()
    }
}
