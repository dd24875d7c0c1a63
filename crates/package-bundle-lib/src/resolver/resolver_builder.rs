use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use super::DependencyResolver;
use super::ResolveSettings;
use crate::registry::Registry;
use crate::ResolutionCache;

pub struct ResolverBuilder {
	registry: Arc<dyn Registry>,
	cache: Option<Arc<ResolutionCache>>,
	cache_file: Option<PathBuf>,
	limiter: Option<Arc<Semaphore>>,
	concurrency: usize,
	settings: ResolveSettings,
}

impl ResolverBuilder {
	pub fn new(registry: Arc<dyn Registry>) -> Self {
		Self {
			registry,
			cache: None,
			cache_file: None,
			limiter: None,
			concurrency: crate::config::DEFAULT_CONCURRENCY,
			settings: Default::default(),
		}
	}

	/// Takes dependency kinds, version modes and limits from `options`.
	///
	/// The cache file is not set, see [`ResolverBuilder::persist_cache`].
	pub fn from_options(registry: Arc<dyn Registry>, options: &crate::BundleOptions) -> Self {
		Self::new(registry)
			.include_dev(options.include_dev())
			.include_optional(options.include_optional())
			.all_versions(options.all_versions())
			.all_versions_recursive(options.all_versions_recursive())
			.concurrency(options.concurrency())
			.max_packages(options.max_packages())
	}

	pub fn include_dev(mut self, include_dev: bool) -> Self {
		self.settings.include_dev = include_dev;
		self
	}

	pub fn include_optional(mut self, include_optional: bool) -> Self {
		self.settings.include_optional = include_optional;
		self
	}

	pub fn all_versions(mut self, all_versions: bool) -> Self {
		self.settings.all_versions = all_versions;
		self
	}

	pub fn all_versions_recursive(mut self, all_versions_recursive: bool) -> Self {
		self.settings.all_versions_recursive = all_versions_recursive;
		self
	}

	/// Limits both the dependency fan-out of a package and, unless [`ResolverBuilder::limiter`]
	/// is given, the number of registry requests in flight.
	pub fn concurrency(mut self, concurrency: usize) -> Self {
		self.concurrency = concurrency.max(1);
		self.settings.fan_out = self.concurrency;
		self
	}

	pub fn max_packages(mut self, max_packages: usize) -> Self {
		self.settings.max_packages = max_packages;
		self
	}

	/// Starts from an existing cache, e.g. one loaded from a previous run.
	pub fn cache(mut self, cache: Arc<ResolutionCache>) -> Self {
		self.cache = Some(cache);
		self
	}

	/// Saves the cache to `path` after a successful resolve.
	pub fn persist_cache(mut self, path: impl Into<PathBuf>) -> Self {
		self.cache_file = Some(path.into());
		self
	}

	/// Shares the in-flight request limit with other users, such as the downloader.
	pub fn limiter(mut self, limiter: Arc<Semaphore>) -> Self {
		self.limiter = Some(limiter);
		self
	}

	pub fn build(self) -> DependencyResolver {
		DependencyResolver {
			registry: self.registry,
			cache: self.cache.unwrap_or_default(),
			limiter: self.limiter.unwrap_or_else(|| Arc::new(Semaphore::new(self.concurrency))),
			settings: self.settings,
			cache_file: self.cache_file,
		}
	}
}
