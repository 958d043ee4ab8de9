// ============================================
// Recommender Store
// ============================================
//
// Durable state of the recommender:
// - fitted tag vectorizer
// - cached problem corpus with its fetch time
// - handle -> user vector map
//
// Every write replaces the whole artefact through a uniquely named temp
// file and a rename, so readers and concurrent writers only ever see
// complete files.

use crate::models::Problem;
use crate::services::vectorizer::TagVectorizer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";
const CORPUS_FILE: &str = "problems_data.json";
const USER_VECTORS_FILE: &str = "user_vectors.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Serialization error on {path}: {message}")]
    Serialization { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted user profiles keyed by handle
pub type UserVectors = HashMap<String, Vec<f64>>;

/// Problem corpus as persisted, stamped with the time it was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCorpus {
    pub fetched_at: DateTime<Utc>,
    pub problems: Vec<Problem>,
}

impl CachedCorpus {
    pub fn new(problems: Vec<Problem>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            problems,
        }
    }

    /// True while the corpus is younger than `ttl`
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        within_ttl(self.fetched_at, ttl, now)
    }
}

pub fn within_ttl(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now - fetched_at < ttl,
        Err(_) => true,
    }
}

#[async_trait]
pub trait RecommenderStore: Send + Sync {
    async fn load_corpus(&self) -> Result<Option<CachedCorpus>>;

    async fn save_corpus(&self, corpus: &CachedCorpus) -> Result<()>;

    async fn load_vectorizer(&self) -> Result<Option<TagVectorizer>>;

    async fn save_vectorizer(&self, vectorizer: &TagVectorizer) -> Result<()>;

    /// Missing storage reads as an empty map
    async fn load_user_vectors(&self) -> Result<UserVectors>;

    async fn save_user_vectors(&self, vectors: &UserVectors) -> Result<()>;
}

/// JSON files in a single data directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn write_json<T: Serialize + Sync>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.path(file);
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let len = bytes.len();
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || replace_file(&dir, &target, &bytes))
            .await
            .map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })??;

        debug!(path = %path.display(), bytes = len, "Persisted artefact");
        Ok(())
    }
}

/// Write `bytes` to a uniquely named temp file in `dir`, then rename it over `path`
fn replace_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl RecommenderStore for FileStore {
    async fn load_corpus(&self) -> Result<Option<CachedCorpus>> {
        self.read_json(CORPUS_FILE).await
    }

    async fn save_corpus(&self, corpus: &CachedCorpus) -> Result<()> {
        self.write_json(CORPUS_FILE, corpus).await
    }

    async fn load_vectorizer(&self) -> Result<Option<TagVectorizer>> {
        self.read_json(VECTORIZER_FILE).await
    }

    async fn save_vectorizer(&self, vectorizer: &TagVectorizer) -> Result<()> {
        self.write_json(VECTORIZER_FILE, vectorizer).await
    }

    async fn load_user_vectors(&self) -> Result<UserVectors> {
        Ok(self
            .read_json(USER_VECTORS_FILE)
            .await?
            .unwrap_or_default())
    }

    async fn save_user_vectors(&self, vectors: &UserVectors) -> Result<()> {
        self.write_json(USER_VECTORS_FILE, vectors).await
    }
}
