//! Various helper functions for testing
//!
//! functions in this module should use results and not use any panics to avoid confusion in callers

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use package_bundle::download::{archive_file_name, ArchiveSource, DownloadError};
use package_bundle::registry::{PackageMetadata, PackageVersion, RegistryError};
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const MOCK_REGISTRY_URL: &str = "https://registry.test";

/// Where [`MockRegistry`] serves the archive of `name@version` from.
pub fn tarball_url(name: &str, version: &str) -> String {
	format!("{}/{}/-/{}", MOCK_REGISTRY_URL, name, archive_file_name(name, version))
}

/// Builds a version record with runtime dependencies only.
pub fn package_version(name: &str, version: &str, dependencies: &[(&str, &str)]) -> PackageVersion {
	PackageVersion {
		name: name.to_owned(),
		version: version.to_owned(),
		dist: package_bundle::registry::Dist { tarball: tarball_url(name, version) },
		dependencies: dependency_map(dependencies),
		..Default::default()
	}
}

pub fn dependency_map(entries: &[(&str, &str)]) -> package_bundle::registry::DependencyMap {
	entries.iter().map(|(name, range)| (name.to_string(), range.to_string())).collect()
}

/// A temporary directory removed when dropped.
pub fn scratch_dir() -> std::io::Result<tempfile::TempDir> {
	tempfile::Builder::new().prefix("package-bundle-test").tempdir()
}

/// Options with every path inside `dir`.
pub fn options_in(dir: &Path) -> package_bundle::BundleOptions {
	let mut options = package_bundle::BundleOptions::default();
	options.set_registry_url(MOCK_REGISTRY_URL);
	options.set_staging_dir(dir.join("staging"));
	options.set_cache_file(dir.join("cache.json"));
	options.set_out_file(dir.join("bundle.tgz"));
	options
}

/// An in-memory registry that counts the requests made against it.
#[derive(Debug, Default)]
pub struct MockRegistry {
	packages: BTreeMap<String, PackageMetadata>,
	unreachable: bool,
	delay: Option<Duration>,
	failing_tarballs: HashSet<String>,

	metadata_calls: Mutex<HashMap<String, usize>>,
	tarball_calls: Mutex<HashMap<String, usize>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl MockRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Publishes `name@version`, which also becomes its `latest`.
	pub fn publish(self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
		self.publish_version(package_version(name, version, dependencies))
	}

	pub fn publish_version(mut self, record: PackageVersion) -> Self {
		let metadata = self.packages.entry(record.name.clone()).or_default();
		metadata.name = Some(record.name.clone());
		metadata.dist_tags.insert("latest".into(), record.version.clone());
		metadata.versions.get_or_insert_with(BTreeMap::new).insert(record.version.clone(), record);
		self
	}

	pub fn set_tag(mut self, name: &str, tag: &str, version: &str) -> Self {
		self.packages.entry(name.to_owned()).or_default().dist_tags.insert(tag.to_owned(), version.to_owned());
		self
	}

	pub fn set_latest(self, name: &str, version: &str) -> Self {
		self.set_tag(name, "latest", version)
	}

	/// A package that exists but has no versions.
	pub fn unpublished(mut self, name: &str) -> Self {
		self.packages.insert(name.to_owned(), PackageMetadata { name: Some(name.to_owned()), ..Default::default() });
		self
	}

	/// Every metadata request fails as if the registry couldn't be connected to.
	pub fn unreachable(mut self) -> Self {
		self.unreachable = true;
		self
	}

	/// Holds every request open for `delay` so concurrent requests overlap.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn fail_tarball(mut self, name: &str, version: &str) -> Self {
		self.failing_tarballs.insert(tarball_url(name, version));
		self
	}

	pub fn metadata_calls(&self, name: &str) -> usize {
		self.metadata_calls.lock().map(|calls| calls.get(name).copied().unwrap_or(0)).unwrap_or(0)
	}

	pub fn total_metadata_calls(&self) -> usize {
		self.metadata_calls.lock().map(|calls| calls.values().sum()).unwrap_or(0)
	}

	pub fn tarball_calls(&self, name: &str, version: &str) -> usize {
		self.tarball_calls.lock().map(|calls| calls.get(&tarball_url(name, version)).copied().unwrap_or(0)).unwrap_or(0)
	}

	/// The most requests, of either kind, that were ever in flight at once.
	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	async fn enter(&self) -> InFlight<'_> {
		let guard = InFlight::new(&self.in_flight, &self.max_in_flight);
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		guard
	}
}

fn count(calls: &Mutex<HashMap<String, usize>>, key: &str) {
	if let Ok(mut calls) = calls.lock() {
		*calls.entry(key.to_owned()).or_default() += 1;
	}
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
	fn new(in_flight: &'a AtomicUsize, max_in_flight: &AtomicUsize) -> Self {
		let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		max_in_flight.fetch_max(now, Ordering::SeqCst);
		Self(in_flight)
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl package_bundle::Registry for MockRegistry {
	async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
		count(&self.metadata_calls, name);
		let _guard = self.enter().await;

		if self.unreachable {
			return Err(RegistryError::Unreachable(format!("{} refused the connection", MOCK_REGISTRY_URL)));
		}
		self.packages.get(name).cloned().ok_or_else(|| RegistryError::NotFound(name.to_owned()))
	}
}

#[async_trait]
impl ArchiveSource for MockRegistry {
	async fn copy_to(&self, url: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64, DownloadError> {
		count(&self.tarball_calls, url);
		let _guard = self.enter().await;

		if self.failing_tarballs.contains(url) {
			return Err(DownloadError::Transport(format!("{} returned 500 Internal Server Error", url)));
		}
		let body = url.as_bytes();
		writer.write_all(body).await?;
		Ok(body.len() as u64)
	}
}
