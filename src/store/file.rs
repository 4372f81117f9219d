//! Simple file-backed [`CacheStore`] for desktop tools and bots.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CacheStore, StoreError, StoreFuture},
};

/// Persists each blob to `<dir>/<key>.json`, replacing the file atomically on every write.
#[derive(Clone, Debug)]
pub struct FileStore {
	dir: PathBuf,
	write_lock: Arc<Mutex<()>>,
}
impl FileStore {
	/// Opens (or creates) a store rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		Self::ensure_dir_exists(&dir)?;

		Ok(Self { dir, write_lock: Arc::new(Mutex::new(())) })
	}

	/// Directory holding the blobs.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// File path used for `key`.
	///
	/// Characters outside `[A-Za-z0-9_.-]` are replaced with `_`.
	pub fn path_for(&self, key: &str) -> PathBuf {
		let name = key
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
			.collect::<String>();

		self.dir.join(format!("{name}.json"))
	}

	fn ensure_dir_exists(dir: &Path) -> Result<(), StoreError> {
		if dir.as_os_str().is_empty() {
			return Ok(());
		}

		fs::create_dir_all(dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", dir.display()),
		})
	}

	fn read_blob(path: &Path) -> Result<Option<String>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		fs::read_to_string(path).map(Some).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})
	}

	fn persist(&self, path: &Path, blob: &str) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock();

		Self::ensure_dir_exists(&self.dir)?;

		let mut tmp_path = path.to_path_buf();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(blob.as_bytes()).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", path.display()),
		})
	}
}
impl CacheStore for FileStore {
	fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Self::read_blob(&self.path_for(key)) })
	}

	fn write<'a>(&'a self, key: &'a str, blob: String) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.persist(&self.path_for(key), &blob) })
	}
}
