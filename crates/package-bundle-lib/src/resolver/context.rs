//! State shared by every resolution task of one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use super::*;
use crate::registry::{merge_dependencies, DependencyMap, PackageMetadata, PackageVersion, RegistryError};
use crate::version_selector::{self, SelectError};

enum Claim {
	/// This task owns the version and must resolve its dependencies.
	Won(ResolvedPackage),
	AlreadyResolved,
	LimitReached,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(super) struct ResolverContext {
	registry: Arc<dyn Registry>,
	cache: Arc<ResolutionCache>,
	limiter: Arc<Semaphore>,
	settings: ResolveSettings,

	downloads: Mutex<DownloadSet>,
	failures: Mutex<Vec<ResolveFailure>>,
	/// Set once the registry turns out to be unreachable, stops any further work.
	aborted: AtomicBool,
	abort_reason: Mutex<Option<RegistryError>>,
	truncated: AtomicBool,
}

impl ResolverContext {
	pub(super) fn new(registry: Arc<dyn Registry>, cache: Arc<ResolutionCache>, limiter: Arc<Semaphore>, settings: ResolveSettings) -> Self {
		Self {
			registry,
			cache,
			limiter,
			settings,
			downloads: Default::default(),
			failures: Default::default(),
			aborted: AtomicBool::new(false),
			abort_reason: Default::default(),
			truncated: AtomicBool::new(false),
		}
	}

	/// Resolves `request` and, recursively, everything it depends on.
	///
	/// Completes once every dependency task spawned below it has completed.
	pub(super) fn resolve_dependencies(self: Arc<Self>, request: PackageRequest) -> BoxFuture<'static, ()> {
		async move {
			if self.aborted.load(Ordering::SeqCst) {
				return;
			}

			let PackageRequest { name, range, requested } = request;
			let range = range.filter(|r| !r.trim().is_empty());

			if self.cache.has_satisfying(&name, range.as_deref()) {
				log::debug!("Already have a version of {} satisfying {}", name, range.as_deref().unwrap_or("*"));
				return;
			}

			let metadata = match self.fetch_metadata(&name).await {
				Ok(metadata) => metadata,
				Err(RegistryError::NotFound(_)) if !requested && self.settings.any_all_versions() => {
					log::warn!("Unable to find package \"{}\" - ignoring.", name);
					return;
				},
				Err(e) if e.is_unreachable() => {
					self.abort(e);
					return;
				},
				Err(e) => {
					self.report(&name, e.into());
					return;
				},
			};

			let versions = match metadata.published() {
				Some(versions) => versions,
				None => {
					log::warn!("Unable to find \"{}\" version - ignoring.", name);
					return;
				},
			};

			if self.settings.resolves_all_versions(requested) {
				for version in versions.values() {
					self.get_package_version(version).await;
				}
				return;
			}

			match select_version(&name, &metadata, range.as_deref()) {
				Ok(version) => self.get_package_version(version).await,
				Err(e) if requested => self.report(&name, e.into()),
				Err(e) => log::warn!("{} - skipping.", e),
			}
		}
		.boxed()
	}

	/// Claims `package` and resolves its dependencies if no other task got to it first.
	async fn get_package_version(self: &Arc<Self>, package: &PackageVersion) {
		let resolved = match self.claim(package) {
			Claim::Won(resolved) => resolved,
			Claim::AlreadyResolved => {
				log::trace!("{}:{} already resolved", package.name, package.version);
				return;
			},
			Claim::LimitReached => return,
		};
		log::info!("{}", resolved);

		let dependencies = merge_dependencies(
			&package.dependencies,
			&package.dev_dependencies,
			&package.optional_dependencies,
			self.settings.include_dev,
			self.settings.include_optional,
		);
		self.fan_out(&resolved, dependencies).await;
	}

	/// Resolves each dependency as its own task, at most `fan_out` at once, and waits for all of them.
	async fn fan_out(self: &Arc<Self>, parent: &ResolvedPackage, dependencies: DependencyMap) {
		if dependencies.is_empty() {
			return;
		}

		let tasks = dependencies.into_iter().map(|(name, range)| {
			let request = PackageRequest::dependency(name, range);
			tokio::spawn(Arc::clone(self).resolve_dependencies(request))
		});

		let mut running = stream::iter(tasks).buffer_unordered(self.settings.fan_out);
		while let Some(joined) = running.next().await {
			if let Err(e) = joined {
				log::error!("Resolving a dependency of {} failed: {}", parent, e);
			}
		}
	}

	async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
		let _permit = self.limiter
			.acquire()
			.await
			.map_err(|e| RegistryError::Transport(e.to_string()))?;
		self.registry.fetch_metadata(name).await
	}

	/// Records the version in the cache and the download set as one step.
	fn claim(&self, package: &PackageVersion) -> Claim {
		let mut downloads = lock(&self.downloads);

		if downloads.len() >= self.settings.max_packages && !self.cache.contains(&package.name, &package.version) {
			if !self.truncated.swap(true, Ordering::SeqCst) {
				log::warn!("Reached the limit of {} packages, remaining packages are left out.", self.settings.max_packages);
			}
			return Claim::LimitReached;
		}

		if !self.cache.try_insert(&package.name, &package.version) {
			return Claim::AlreadyResolved;
		}

		let resolved = ResolvedPackage {
			name: package.name.clone(),
			version: package.version.clone(),
			tarball: package.dist.tarball.clone(),
		};
		downloads.insert(resolved.clone());
		Claim::Won(resolved)
	}

	fn report(&self, package: &str, error: crate::Error) {
		log::error!("{}", error);
		lock(&self.failures).push(ResolveFailure { package: package.to_owned(), error });
	}

	fn abort(&self, error: RegistryError) {
		log::error!("{}", error);
		if !self.aborted.swap(true, Ordering::SeqCst) {
			*lock(&self.abort_reason) = Some(error);
		}
	}

	pub(super) fn take_abort(&self) -> Option<RegistryError> {
		lock(&self.abort_reason).take()
	}

	pub(super) fn finish(&self) -> Resolution {
		Resolution {
			downloads: std::mem::take(&mut *lock(&self.downloads)),
			failures: std::mem::take(&mut *lock(&self.failures)),
			truncated: self.truncated.load(Ordering::SeqCst),
		}
	}
}

/// Picks the version record for `range`, following dist-tags such as `latest` or `next`.
fn select_version<'m>(name: &str, metadata: &'m PackageMetadata, range: Option<&str>) -> Result<&'m PackageVersion, SelectError> {
	let range = range.map(|r| metadata.tagged_version(r).unwrap_or(r));
	let available: Vec<&str> = metadata.versions.iter().flat_map(|v| v.keys()).map(String::as_str).collect();
	let version = version_selector::select(name, &available, metadata.latest(), range)?;
	metadata.get(&version).ok_or(SelectError::NoMatchingVersion { name: name.to_owned(), range: version })
}
