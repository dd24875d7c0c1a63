//! Downloads resolved packages into the staging directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::config::Layout;
use crate::resolver::{DownloadSet, ResolvedPackage};

/// Errors that can occur during the download process.
#[derive(Debug, Error)]
pub enum DownloadError {
	#[error("transport error: {0}")]
	Transport(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

impl From<reqwest::Error> for DownloadError {
	fn from(e: reqwest::Error) -> Self {
		DownloadError::Transport(e.to_string())
	}
}

/// Somewhere package archives can be read from.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
	/// Streams the archive at `url` into `writer`, returning the number of bytes written.
	async fn copy_to(&self, url: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64, DownloadError>;
}

#[async_trait]
impl ArchiveSource for crate::RegistryClient {
	async fn copy_to(&self, url: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64, DownloadError> {
		let mut response = self.client().get(url).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(DownloadError::Transport(format!("{} returned {}", url, status)));
		}

		let mut written = 0u64;
		while let Some(chunk) = response.chunk().await? {
			writer.write_all(&chunk).await?;
			written += chunk.len() as u64;
		}
		Ok(written)
	}
}

/// `<name>-<version>.tgz`, scoped names are flattened the way `npm pack` names its tarballs.
pub fn archive_file_name(name: &str, version: &str) -> String {
	format!("{}-{}.tgz", name.trim_start_matches('@').replace('/', "-"), version)
}

/// Where `package` is staged under `staging_dir`.
///
/// # Errors
/// [`DownloadError::IO`] when the name or version would place the file anywhere but its slot
/// inside `staging_dir`, e.g. an absolute name or a version containing `../`.
pub fn get_staging_path(staging_dir: &Path, layout: Layout, package: &ResolvedPackage) -> Result<PathBuf, DownloadError> {
	let file_name = archive_file_name(&package.name, &package.version);
	let (relative, expected_depth) = match layout {
		Layout::Flat => (PathBuf::from(file_name), 1),
		Layout::Nested => {
			let name_depth = if package.name.starts_with('@') { 2 } else { 1 };
			(Path::new(&package.name).join(file_name), name_depth + 1)
		},
	};

	let contained = relative.components().all(|c| matches!(c, Component::Normal(_)))
		&& relative.components().count() == expected_depth
		&& !package.name.contains('\\')
		&& !package.version.contains(['/', '\\']);
	if !contained {
		return Err(DownloadError::IO(std::io::Error::new(
			std::io::ErrorKind::InvalidInput,
			format!("{} does not map to a file inside the staging directory", package),
		)));
	}
	Ok(staging_dir.join(relative))
}

pub struct Downloader {
	source: Arc<dyn ArchiveSource>,
	staging_dir: PathBuf,
	layout: Layout,
	limiter: Arc<Semaphore>,
	concurrency: usize,
}

impl Downloader {
	/// # Parameters
	/// - `limiter` - Bounds the number of downloads in flight, share it with the resolver to bound both together.
	/// - `concurrency` - How many downloads [`Downloader::fetch_all`] starts at once.
	pub fn new(source: Arc<dyn ArchiveSource>, staging_dir: impl Into<PathBuf>, layout: Layout, limiter: Arc<Semaphore>, concurrency: usize) -> Self {
		Self {
			source,
			staging_dir: staging_dir.into(),
			layout,
			limiter,
			concurrency: concurrency.max(1),
		}
	}

	pub fn staging_path(&self, package: &ResolvedPackage) -> Result<PathBuf, DownloadError> {
		get_staging_path(&self.staging_dir, self.layout, package)
	}

	/// Downloads a package's archive into the staging directory.
	///
	/// A failed download leaves no file behind.
	pub async fn fetch(&self, package: &ResolvedPackage) -> Result<PathBuf, DownloadError> {
		let download_path = self.staging_path(package)?;

		let _permit = self.limiter
			.acquire()
			.await
			.map_err(|e| DownloadError::Transport(e.to_string()))?;

		if let Some(parent) = download_path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let mut download_file = tokio::fs::File::create(&download_path).await?;

		log::debug!("Downloading package {} from {}", package, package.tarball);
		let written = match self.source.copy_to(&package.tarball, &mut download_file).await {
			Ok(written) => written,
			Err(e) => {
				drop(download_file);
				if let Err(remove) = tokio::fs::remove_file(&download_path).await {
					log::warn!("Failed to remove partial download {}: {}", download_path.display(), remove);
				}
				return Err(e);
			},
		};
		download_file.flush().await?;

		log::debug!("Wrote {} bytes to {}", written, download_path.display());
		Ok(download_path)
	}

	/// Downloads every package in `packages`.
	///
	/// # Returns
	/// Each package paired with the result of its download. One failure doesn't stop the others.
	pub async fn fetch_all(&self, packages: &DownloadSet) -> Vec<(ResolvedPackage, Result<PathBuf, DownloadError>)> {
		stream::iter(packages.iter())
			.map(|package| async move { (package.clone(), self.fetch(package).await) })
			.buffer_unordered(self.concurrency)
			.collect()
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn package(name: &str, version: &str) -> ResolvedPackage {
		ResolvedPackage { name: name.into(), version: version.into(), tarball: String::new() }
	}

	#[test] fn plain_file_name() { assert_eq!(archive_file_name("left-pad", "1.3.0"), "left-pad-1.3.0.tgz") }
	#[test] fn scoped_file_name() { assert_eq!(archive_file_name("@babel/core", "7.0.0"), "babel-core-7.0.0.tgz") }

	#[test]
	fn flat_layout() {
		let path = get_staging_path(Path::new("stage"), Layout::Flat, &package("@s/p", "1.0.0")).unwrap();
		assert_eq!(path, Path::new("stage").join("s-p-1.0.0.tgz"));
	}

	#[test]
	fn nested_layout() {
		let path = get_staging_path(Path::new("stage"), Layout::Nested, &package("foo", "1.0.0")).unwrap();
		assert_eq!(path, Path::new("stage").join("foo").join("foo-1.0.0.tgz"));

		let path = get_staging_path(Path::new("stage"), Layout::Nested, &package("@s/p", "1.0.0")).unwrap();
		assert_eq!(path, Path::new("stage").join("@s/p").join("s-p-1.0.0.tgz"));
	}

	fn escapes(layout: Layout, name: &str, version: &str) -> bool {
		matches!(get_staging_path(Path::new("stage"), layout, &package(name, version)), Err(DownloadError::IO(_)))
	}

	#[test] fn absolute_name_is_refused() { assert!(escapes(Layout::Nested, "/tmp/evil", "1.0.0")) }
	#[test] fn parent_name_is_refused() { assert!(escapes(Layout::Nested, "../evil", "1.0.0")) }
	#[test] fn current_dir_name_is_refused() { assert!(escapes(Layout::Nested, ".", "1.0.0")) }
	#[test] fn unscoped_name_with_separator_is_refused() { assert!(escapes(Layout::Nested, "a/b", "1.0.0")) }
	#[test] fn scope_traversal_is_refused() { assert!(escapes(Layout::Nested, "@s/../../evil", "1.0.0")) }
	#[test] fn backslash_name_is_refused() { assert!(escapes(Layout::Flat, "..\\evil", "1.0.0")) }
	#[test] fn version_traversal_is_refused() { assert!(escapes(Layout::Flat, "foo", "1.0.0/../../../outside")) }
	#[test] fn version_traversal_is_refused_nested() { assert!(escapes(Layout::Nested, "foo", "1.0.0/../../outside")) }
	#[test] fn version_separator_is_refused() { assert!(escapes(Layout::Flat, "foo", "1.0.0/x")) }
	#[test] fn dotted_versions_are_fine() { assert!(!escapes(Layout::Flat, "foo", "1.0.0-rc..1")) }
}
