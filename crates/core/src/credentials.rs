//! Credential persistence.
//!
//! The blob is opaque: stores only load, save and clear it. The session
//! controller is the only writer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pairlink_protocol::Credentials;
use tracing::{debug, info};

use crate::error::StoreError;

/// Durable storage for the single account's credential blob.
#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Returns the stored blob, or `None` when nothing has been saved.
	async fn load(&self) -> Result<Option<Credentials>, StoreError>;

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

	async fn exists(&self) -> Result<bool, StoreError>;

	/// Irreversibly removes all stored material. Returns `true` if anything was removed.
	async fn clear(&self) -> Result<bool, StoreError>;
}

const CREDS_FILE: &str = "creds.json";

/// Stores `creds.json` inside a dedicated directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
	dir: PathBuf,
}

impl FileCredentialStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn creds_path(&self) -> PathBuf {
		self.dir.join(CREDS_FILE)
	}
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
	StoreError::Io {
		path: path.to_path_buf(),
		source,
	}
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
	async fn load(&self) -> Result<Option<Credentials>, StoreError> {
		let path = self.creds_path();
		let bytes = match tokio::fs::read(&path).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				debug!(target = "pairlink.store", path = %path.display(), "no stored credentials");
				return Ok(None);
			}
			Err(err) => return Err(io_error(&path, err)),
		};

		let credentials = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path: path.clone(), source })?;
		debug!(target = "pairlink.store", path = %path.display(), "loaded credentials");
		Ok(Some(credentials))
	}

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
		tokio::fs::create_dir_all(&self.dir).await.map_err(|e| io_error(&self.dir, e))?;

		let path = self.creds_path();
		let tmp = self.dir.join(format!("{CREDS_FILE}.tmp"));
		let json = serde_json::to_vec_pretty(credentials).map_err(|source| StoreError::Json { path: path.clone(), source })?;

		tokio::fs::write(&tmp, json).await.map_err(|e| io_error(&tmp, e))?;
		tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;
		debug!(target = "pairlink.store", path = %path.display(), "saved credentials");
		Ok(())
	}

	async fn exists(&self) -> Result<bool, StoreError> {
		let path = self.creds_path();
		tokio::fs::try_exists(&path).await.map_err(|e| io_error(&path, e))
	}

	async fn clear(&self) -> Result<bool, StoreError> {
		match tokio::fs::remove_dir_all(&self.dir).await {
			Ok(()) => {
				info!(target = "pairlink.store", path = %self.dir.display(), "credentials wiped");
				Ok(true)
			}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(io_error(&self.dir, err)),
		}
	}
}
