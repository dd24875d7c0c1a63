//! Options controlling a bundle run.
//!
//! Options can be read from a JSON file with [`BundleOptions::load_from_file`]; any field
//! missing from the file keeps its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_STAGING_DIR: &str = ".package-bundle";
pub const DEFAULT_CACHE_FILE: &str = "package-bundle-cache.json";
pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_MAX_PACKAGES: usize = 50_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// How downloaded archives are arranged inside the staging directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
	/// `<staging>/<name>-<version>.tgz`
	Flat,
	/// `<staging>/<name>/<name>-<version>.tgz`
	#[default] Nested,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BundleOptions {
	registry_url: String,
	staging_dir: PathBuf,
	cache_file: PathBuf,
	out_file: PathBuf,
	layout: Layout,
	include_dev: bool,
	include_optional: bool,
	archive: bool,
	use_cache: bool,
	all_versions: bool,
	all_versions_recursive: bool,
	concurrency: usize,
	max_packages: usize,
	https_only: bool,
	connect_timeout_ms: u64,
	request_timeout_ms: u64,
}

impl Default for BundleOptions {
	fn default() -> Self {
		Self {
			registry_url: DEFAULT_REGISTRY_URL.to_string(),
			staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
			cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
			out_file: default_out_file(),
			layout: Layout::default(),
			include_dev: false,
			include_optional: false,
			archive: true,
			use_cache: true,
			all_versions: false,
			all_versions_recursive: false,
			concurrency: DEFAULT_CONCURRENCY,
			max_packages: DEFAULT_MAX_PACKAGES,
			/* Registries commonly hand out plain http tarball urls */
			https_only: false,
			connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
		}
	}
}

/// `package-bundle-<unix millis>.tgz`
fn default_out_file() -> PathBuf {
	let millis = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis())
		.unwrap_or_default();
	PathBuf::from(format!("package-bundle-{}.tgz", millis))
}

impl BundleOptions {
	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		log::debug!("Reading options from {}", path.display());
		let data = std::fs::read(path)?;
		let mut options: BundleOptions = serde_json::from_slice(&data)?;
		options.set_concurrency(options.concurrency);
		Ok(options)
	}

	pub fn registry_url(&self) -> &str {
		&self.registry_url
	}
	pub fn set_registry_url(&mut self, registry_url: impl Into<String>) {
		self.registry_url = registry_url.into();
	}

	pub fn staging_dir(&self) -> &Path {
		&self.staging_dir
	}
	pub fn set_staging_dir(&mut self, staging_dir: impl Into<PathBuf>) {
		self.staging_dir = staging_dir.into();
	}

	pub fn cache_file(&self) -> &Path {
		&self.cache_file
	}
	pub fn set_cache_file(&mut self, cache_file: impl Into<PathBuf>) {
		self.cache_file = cache_file.into();
	}

	pub fn out_file(&self) -> &Path {
		&self.out_file
	}
	pub fn set_out_file(&mut self, out_file: impl Into<PathBuf>) {
		self.out_file = out_file.into();
	}

	pub fn layout(&self) -> Layout {
		self.layout
	}
	pub fn set_layout(&mut self, layout: Layout) {
		self.layout = layout;
	}

	pub fn include_dev(&self) -> bool {
		self.include_dev
	}
	pub fn set_include_dev(&mut self, include_dev: bool) {
		self.include_dev = include_dev;
	}

	pub fn include_optional(&self) -> bool {
		self.include_optional
	}
	pub fn set_include_optional(&mut self, include_optional: bool) {
		self.include_optional = include_optional;
	}

	/// Pack the staging directory into [`BundleOptions::out_file`] once everything is downloaded.
	pub fn archive(&self) -> bool {
		self.archive
	}
	pub fn set_archive(&mut self, archive: bool) {
		self.archive = archive;
	}

	/// Read the resolution cache at start and write it back at the end of the run.
	pub fn use_cache(&self) -> bool {
		self.use_cache
	}
	pub fn set_use_cache(&mut self, use_cache: bool) {
		self.use_cache = use_cache;
	}

	/// Resolve every published version of each requested package.
	pub fn all_versions(&self) -> bool {
		self.all_versions
	}
	pub fn set_all_versions(&mut self, all_versions: bool) {
		self.all_versions = all_versions;
	}

	/// Resolve every published version of every package, dependencies included.
	pub fn all_versions_recursive(&self) -> bool {
		self.all_versions_recursive
	}
	pub fn set_all_versions_recursive(&mut self, all_versions_recursive: bool) {
		self.all_versions_recursive = all_versions_recursive;
	}

	/// Maximum number of registry and tarball requests in flight at once.
	pub fn concurrency(&self) -> usize {
		self.concurrency
	}
	/// Clamped to at least 1.
	pub fn set_concurrency(&mut self, concurrency: usize) {
		self.concurrency = concurrency.max(1);
	}

	/// Upper bound on the number of packages a single run will resolve.
	pub fn max_packages(&self) -> usize {
		self.max_packages
	}
	pub fn set_max_packages(&mut self, max_packages: usize) {
		self.max_packages = max_packages;
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}
	pub fn set_connect_timeout(&mut self, timeout: Duration) {
		self.connect_timeout_ms = timeout.as_millis() as u64;
	}

	/// Limit on a whole request, tarball body included. A registry that stops answering is treated as unreachable.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
	pub fn set_request_timeout(&mut self, timeout: Duration) {
		self.request_timeout_ms = timeout.as_millis() as u64;
	}
}
