use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A concrete package version to download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPackage {
	pub name: String,
	pub version: String,
	pub tarball: String,
}

impl ResolvedPackage {
	/// `name:version`
	pub fn key(&self) -> String {
		format!("{}:{}", self.name, self.version)
	}
}

impl std::fmt::Display for ResolvedPackage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.name, self.version)
	}
}

/// Resolved packages keyed by `name:version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSet {
	entries: BTreeMap<String, ResolvedPackage>,
}

impl DownloadSet {
	/// `false` if the key was already present, the existing entry is kept.
	pub fn insert(&mut self, package: ResolvedPackage) -> bool {
		use std::collections::btree_map::Entry;
		match self.entries.entry(package.key()) {
			Entry::Occupied(_) => false,
			Entry::Vacant(e) => {
				e.insert(package);
				true
			},
		}
	}

	pub fn get(&self, key: &str) -> Option<&ResolvedPackage> {
		self.entries.get(key)
	}

	pub fn contains(&self, name: &str, version: &str) -> bool {
		self.entries.contains_key(&format!("{}:{}", name, version))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = &ResolvedPackage> {
		self.entries.values()
	}
}

impl IntoIterator for DownloadSet {
	type Item = ResolvedPackage;
	type IntoIter = std::collections::btree_map::IntoValues<String, ResolvedPackage>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_values()
	}
}
