//! Tracks which versions of each package have already been resolved.
//!
//! The cache is shared by every resolution task of a run. It only ever grows during a run and
//! can be persisted so the next run skips packages it already bundled.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Package name to the versions resolved for it, in resolution order.
pub type CacheSnapshot = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default)]
pub struct ResolutionCache {
	entries: Mutex<CacheSnapshot>,
}

impl ResolutionCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
		let entries = snapshot
			.into_iter()
			.map(|(name, versions)| {
				let mut unique = Vec::<String>::with_capacity(versions.len());
				for version in versions {
					if !unique.contains(&version) {
						unique.push(version);
					}
				}
				(name, unique)
			})
			.collect();
		Self { entries: Mutex::new(entries) }
	}

	/// Reads a snapshot written by [`ResolutionCache::save`]. A missing file gives an empty cache.
	pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		match std::fs::read(path) {
			Ok(data) => {
				let snapshot: CacheSnapshot = serde_json::from_slice(&data)?;
				log::debug!("Loaded {} cached packages from {}", snapshot.len(), path.display());
				Ok(Self::from_snapshot(snapshot))
			},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				log::debug!("No cache file at {}, starting empty", path.display());
				Ok(Self::new())
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Overwrites `path` with the current contents.
	pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let snapshot = self.snapshot();
		let mut data = Vec::<u8>::new();
		let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
		let mut serializer = serde_json::Serializer::with_formatter(&mut data, formatter);
		snapshot.serialize(&mut serializer)?;
		std::fs::write(path.as_ref(), data)?;
		Ok(())
	}

	pub fn snapshot(&self) -> CacheSnapshot {
		self.lock().clone()
	}

	pub fn versions(&self, name: &str) -> Vec<String> {
		self.lock().get(name).cloned().unwrap_or_default()
	}

	pub fn contains(&self, name: &str, version: &str) -> bool {
		self.lock().get(name).map_or(false, |versions| versions.iter().any(|v| v == version))
	}

	/// Whether a version of `name` satisfying `range` has been resolved.
	///
	/// `false` without a range, see [`crate::version_selector::any_satisfies`].
	pub fn has_satisfying(&self, name: &str, range: Option<&str>) -> bool {
		let entries = self.lock();
		match entries.get(name) {
			Some(versions) => crate::version_selector::any_satisfies(versions.iter().map(String::as_str), range),
			None => false,
		}
	}

	/// Records `version` of `name`.
	///
	/// Returns `false`, changing nothing, when it was already recorded. Of several callers racing
	/// on the same pair exactly one gets `true`.
	pub fn try_insert(&self, name: &str, version: &str) -> bool {
		let mut entries = self.lock();
		let versions = entries.entry(name.to_owned()).or_default();
		if versions.iter().any(|v| v == version) {
			false
		} else {
			versions.push(version.to_owned());
			true
		}
	}

	/// Number of package names with at least one version.
	pub fn package_count(&self) -> usize {
		self.lock().values().filter(|v| !v.is_empty()).count()
	}

	fn lock(&self) -> MutexGuard<'_, CacheSnapshot> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
