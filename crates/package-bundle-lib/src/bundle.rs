//! Bundle
//!
//! Merges the resolve, download and archive steps into a single function [`run`] for convenience.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::download::{ArchiveSource, DownloadError, Downloader};
use crate::registry::Registry;
use crate::resolver::{DownloadSet, ResolveFailure, ResolvedPackage, ResolverBuilder};
use crate::{BundleOptions, PackageRequest, ResolutionCache};

#[derive(Debug, Default)]
pub struct BundleReport {
	pub resolved: DownloadSet,
	/// Archives written to the staging directory.
	pub staged: Vec<PathBuf>,
	pub download_failures: Vec<(ResolvedPackage, DownloadError)>,
	pub resolve_failures: Vec<ResolveFailure>,
	/// Path of the written archive, `None` when archiving is disabled or nothing was downloaded.
	pub archive: Option<PathBuf>,
	/// The package limit was hit while resolving.
	pub truncated: bool,
}

impl BundleReport {
	pub fn is_complete(&self) -> bool {
		self.download_failures.is_empty() && self.resolve_failures.is_empty() && !self.truncated
	}
}

/// Resolves `requests`, downloads everything they need into the staging directory and packs it.
///
/// `source` serves both the package metadata and the archives, [`crate::RegistryClient`] for a real registry.
///
/// # Errors
/// - [`crate::Error::AlreadyExists`] if the staging directory is left over from another run.
/// - Anything [`crate::resolver::DependencyResolver::resolve`] fails with, including [`crate::Error::NoNewPackages`].
/// - IO errors while archiving.
pub async fn run<S>(options: &BundleOptions, requests: Vec<PackageRequest>, source: Arc<S>) -> crate::Result<BundleReport>
where
	S: Registry + ArchiveSource + 'static,
{
	let staging_dir = options.staging_dir().to_path_buf();
	if staging_dir.exists() {
		return Err(crate::Error::AlreadyExists(staging_dir));
	}

	let cache = if options.use_cache() {
		ResolutionCache::load(options.cache_file())?
	} else {
		ResolutionCache::new()
	};

	/* Metadata requests and downloads share one bound */
	let limiter = Arc::new(Semaphore::new(options.concurrency()));

	let registry: Arc<dyn Registry> = source.clone();
	let mut builder = ResolverBuilder::from_options(registry, options)
		.cache(Arc::new(cache))
		.limiter(Arc::clone(&limiter));
	if options.use_cache() {
		builder = builder.persist_cache(options.cache_file());
	}
	let resolution = builder.build().resolve(requests).await?;

	let archives: Arc<dyn ArchiveSource> = source;
	let downloader = Downloader::new(archives, &staging_dir, options.layout(), limiter, options.concurrency());
	log::info!("Downloading {} packages into {}", resolution.downloads.len(), staging_dir.display());

	let mut report = BundleReport {
		resolve_failures: resolution.failures,
		truncated: resolution.truncated,
		..Default::default()
	};
	for (package, result) in downloader.fetch_all(&resolution.downloads).await {
		match result {
			Ok(path) => report.staged.push(path),
			Err(e) => {
				log::error!("Failed to download {}: {}", package, e);
				report.download_failures.push((package, e));
			},
		}
	}
	report.staged.sort();
	report.resolved = resolution.downloads;

	if options.archive() {
		let out_file = options.out_file().to_path_buf();
		report.archive = tokio::task::spawn_blocking(move || -> crate::Result<Option<PathBuf>> {
			let archive = crate::archive::create_archive(&staging_dir, &out_file)?;
			crate::archive::clean_up(&staging_dir)?;
			Ok(archive)
		})
		.await??;
	}

	if let Some(archive) = &report.archive {
		log::info!("Bundled {} packages into {}", report.staged.len(), archive.display());
	}
	Ok(report)
}
