//! Blob stores: an on-disk store for captured bodies and an in-memory one.

use bodyscope_core::{BlobId, BlobStore, BodyRef, Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Content-addressed id: the first 16 hex chars of the body's sha256.
pub fn content_id(bytes: &[u8]) -> BlobId {
    let digest = hex::encode(Sha256::digest(bytes));
    BlobId(digest[..16].to_string())
}

/// Sharded on-disk store: `<root>/ab/cd/<key>.json` (meta) + `<key>.bin` (body).
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn meta_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        // Captured headers can carry credentials; persist only what inspection needs.
        let mut out = BTreeMap::new();
        for (k, v) in headers {
            match k.trim().to_ascii_lowercase().as_str() {
                "content-type" | "content-length" | "content-encoding" | "etag"
                | "last-modified" => {
                    out.insert(k.clone(), v.clone());
                }
                _ => {}
            }
        }
        out
    }

    fn key_for(id: &BlobId) -> String {
        let mut h = Sha256::new();
        h.update(b"blob:");
        h.update(id.as_str().as_bytes());
        hex::encode(h.finalize())
    }

    fn paths(&self, id: &BlobId) -> (PathBuf, PathBuf) {
        let key = Self::key_for(id);
        let dir = self.root.join(&key[0..2]).join(&key[2..4]);
        let meta = dir.join(format!("{key}.json"));
        let body = dir.join(format!("{key}.bin"));
        (meta, body)
    }

    /// Store a body. Overwrites an existing body with the same id.
    pub fn put(
        &self,
        id: &BlobId,
        content_type: Option<&str>,
        headers: &BTreeMap<String, String>,
        bytes: &[u8],
    ) -> Result<BodyRef> {
        let (meta_p, body_p) = self.paths(id);
        if let Some(parent) = meta_p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        let now_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();

        let meta = serde_json::json!({
            "schema_version": 1,
            "stored_at_epoch_s": now_s,
            "id": id,
            "content_type": content_type,
            "size": bytes.len() as u64,
            "headers": Self::meta_headers(headers),
        });

        fs::write(&body_p, bytes).map_err(|e| Error::Store(e.to_string()))?;
        fs::write(
            &meta_p,
            serde_json::to_vec(&meta).map_err(|e| Error::Store(e.to_string()))?,
        )
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(BodyRef::new(id.clone(), content_type, Some(bytes.len() as u64)))
    }

    /// The stored handle for `id`, rebuilt from its meta file.
    pub fn body_ref(&self, id: &BlobId) -> Result<Option<BodyRef>> {
        let (meta_p, body_p) = self.paths(id);
        if !meta_p.exists() || !body_p.exists() {
            return Ok(None);
        }
        let meta_bytes = fs::read(&meta_p).map_err(|e| Error::Store(e.to_string()))?;
        let meta: serde_json::Value =
            serde_json::from_slice(&meta_bytes).map_err(|e| Error::Store(e.to_string()))?;
        let content_type = meta.get("content_type").and_then(|v| v.as_str());
        let size = meta.get("size").and_then(|v| v.as_u64());
        Ok(Some(BodyRef::new(id.clone(), content_type, size)))
    }

    fn read_body(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let (_, body_p) = self.paths(id);
        match fs::read(&body_p) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn get_body_bytes(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let store = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || store.read_body(&id))
            .await
            .map_err(|e| Error::Join(e.to_string()))?
    }
}

/// In-memory store, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    bodies: RwLock<HashMap<BlobId, (Option<String>, Arc<[u8]>)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        id: impl Into<BlobId>,
        content_type: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> BodyRef {
        let id = id.into();
        let bytes = bytes.into();
        let r = BodyRef::new(id.clone(), content_type, Some(bytes.len() as u64));
        let mut g = self.bodies.write().unwrap_or_else(|e| e.into_inner());
        g.insert(id, (content_type.map(str::to_string), bytes));
        r
    }

    pub fn body_ref(&self, id: &BlobId) -> Option<BodyRef> {
        let g = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        g.get(id)
            .map(|(ct, b)| BodyRef::new(id.clone(), ct.as_deref(), Some(b.len() as u64)))
    }

    pub fn remove(&self, id: &BlobId) -> bool {
        let mut g = self.bodies.write().unwrap_or_else(|e| e.into_inner());
        g.remove(id).is_some()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_body_bytes(&self, id: &BlobId) -> Result<Option<Vec<u8>>> {
        let g = self.bodies.read().unwrap_or_else(|e| e.into_inner());
        Ok(g.get(id).map(|(_, b)| b.to_vec()))
    }
}
