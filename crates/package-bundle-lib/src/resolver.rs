//! Resolves package requests into the complete set of packages to download.
//!
//! # Usage
//! 1. Create a [`ResolverBuilder`] with the [`Registry`] to resolve against.
//! 1. Use the builder to set dependency kinds, concurrency, and the [`ResolutionCache`] to use.
//! 1. [`ResolverBuilder::build()`] to get a [`DependencyResolver`].
//! 1. [`DependencyResolver::resolve()`] with the requested packages to get a [`Resolution`].
//!
//! Requests are resolved one after another in the order given. The dependencies of each
//! resolved version are resolved concurrently as separate tasks, so [`DependencyResolver::resolve()`]
//! must run inside a tokio runtime.
//!
//! Each `(name, range)` is resolved on its own against the registry's current metadata, there
//! is no attempt to find one version satisfying several ranges.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::registry::Registry;
use crate::ResolutionCache;

mod context;
use context::ResolverContext;

mod resolver_builder;
pub use resolver_builder::ResolverBuilder;

mod download_set;
pub use download_set::DownloadSet;
pub use download_set::ResolvedPackage;

/// A package to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
	pub name: String,
	pub range: Option<String>,
	/// Requested by the user rather than reached as a dependency.
	pub requested: bool,
}

impl PackageRequest {
	pub fn new(name: impl Into<String>, range: Option<String>) -> Self {
		Self { name: name.into(), range, requested: true }
	}

	/// A transitive dependency.
	pub fn dependency(name: impl Into<String>, range: impl Into<String>) -> Self {
		Self { name: name.into(), range: Some(range.into()), requested: false }
	}

	/// Parses `name` or `name@range`. The `@` opening a scoped name isn't a separator.
	pub fn parse(spec: &str) -> Self {
		let spec = spec.trim();
		let (scope, rest) = match spec.strip_prefix('@') {
			Some(rest) => ("@", rest),
			None => ("", spec),
		};
		let (name, range) = match rest.split_once('@') {
			Some((name, range)) => (name, Some(range)),
			None => (rest, None),
		};
		let range = range.map(str::trim).filter(|r| !r.is_empty()).map(str::to_owned);
		Self::new(format!("{}{}", scope, name), range)
	}
}

impl std::fmt::Display for PackageRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.range {
			Some(range) => write!(f, "{}@{}", self.name, range),
			None => write!(f, "{}", self.name),
		}
	}
}

/// A failure that cut one branch of the resolve short.
#[derive(Debug)]
pub struct ResolveFailure {
	pub package: String,
	pub error: crate::Error,
}

/// The outcome of a resolve.
#[derive(Debug, Default)]
pub struct Resolution {
	pub downloads: DownloadSet,
	pub failures: Vec<ResolveFailure>,
	/// The package limit was hit and some packages were left out.
	pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolveSettings {
	pub include_dev: bool,
	pub include_optional: bool,
	pub all_versions: bool,
	pub all_versions_recursive: bool,
	/// Dependencies of a single package resolved at once.
	pub fan_out: usize,
	pub max_packages: usize,
}

impl Default for ResolveSettings {
	fn default() -> Self {
		Self {
			include_dev: false,
			include_optional: false,
			all_versions: false,
			all_versions_recursive: false,
			fan_out: crate::config::DEFAULT_CONCURRENCY,
			max_packages: crate::config::DEFAULT_MAX_PACKAGES,
		}
	}
}

impl ResolveSettings {
	fn resolves_all_versions(&self, requested: bool) -> bool {
		(self.all_versions && requested) || self.all_versions_recursive
	}

	fn any_all_versions(&self) -> bool {
		self.all_versions || self.all_versions_recursive
	}
}

pub struct DependencyResolver {
	registry: Arc<dyn Registry>,
	cache: Arc<ResolutionCache>,
	limiter: Arc<Semaphore>,
	settings: ResolveSettings,
	/// Where to persist the cache once every request is resolved.
	cache_file: Option<PathBuf>,
}

impl DependencyResolver {
	pub fn cache(&self) -> &Arc<ResolutionCache> {
		&self.cache
	}

	/// Resolves every request, in order, along with their dependencies.
	///
	/// Failures are confined to the request they happen under and collected in
	/// [`Resolution::failures`]. The exception is an unreachable registry, which stops the run.
	///
	/// # Errors
	/// - [`crate::Error::NoNewPackages`] when nothing new needs downloading.
	/// - [`crate::Error::Registry`] when the registry can't be reached.
	/// - [`crate::Error::IO`] / [`crate::Error::SerdeJSON`] when persisting the cache fails.
	pub async fn resolve(&self, requests: impl IntoIterator<Item = PackageRequest>) -> crate::Result<Resolution> {
		log::info!("Resolving dependencies");

		let context = Arc::new(ResolverContext::new(
			Arc::clone(&self.registry),
			Arc::clone(&self.cache),
			Arc::clone(&self.limiter),
			self.settings,
		));

		for request in requests {
			log::debug!("Resolving {}", request);
			Arc::clone(&context).resolve_dependencies(request).await;
			if let Some(e) = context.take_abort() {
				return Err(e.into());
			}
		}

		if let Some(path) = &self.cache_file {
			self.cache.save(path)?;
			log::debug!("Saved resolution cache to {}", path.display());
		}

		let resolution = context.finish();
		let found = resolution.downloads.len();
		log::info!("Found {} package{}", found, if found == 1 { "" } else { "s" });

		if resolution.downloads.is_empty() {
			return Err(crate::Error::NoNewPackages { cache_enabled: self.cache_file.is_some() });
		}
		Ok(resolution)
	}
}
