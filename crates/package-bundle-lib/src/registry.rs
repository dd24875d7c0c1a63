//! Registry access.
//!
//! [`Registry`] is what the resolver talks to. [`RegistryClient`] implements it over HTTP for
//! npm-compatible registries.

use async_trait::async_trait;
use thiserror::Error;

mod metadata;
pub use metadata::DependencyMap;
pub use metadata::Dist;
pub use metadata::PackageMetadata;
pub use metadata::PackageVersion;
pub use metadata::merge_dependencies;

#[derive(Debug, Error)]
pub enum RegistryError {
	/// The registry answered with a not-found status.
	#[error("Unable to find package \"{0}\"")]
	NotFound(String),
	/// The registry itself could not be reached, as opposed to a single package being unavailable.
	#[error("registry unreachable: {0}")]
	Unreachable(String),
	#[error("transport error: {0}")]
	Transport(String),
	#[error("malformed metadata for \"{name}\": {source}")]
	Decode {
		name: String,
		source: serde_json::Error,
	},
}

impl RegistryError {
	pub fn is_unreachable(&self) -> bool {
		matches!(self, RegistryError::Unreachable(_))
	}
}

impl From<reqwest::Error> for RegistryError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_connect() || e.is_timeout() {
			RegistryError::Unreachable(e.to_string())
		} else {
			RegistryError::Transport(e.to_string())
		}
	}
}

/// A source of package metadata.
#[async_trait]
pub trait Registry: Send + Sync {
	/// Fetches the metadata document listing every published version of `name`.
	async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError>;
}

/// Escapes the scope separator so a scoped name (`@scope/name`) stays a single path segment.
pub fn escape_package_name(name: &str) -> String {
	name.replace('/', "%2f")
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
	client: reqwest::Client,
	base_url: String,
}

impl RegistryClient {
	pub fn new(options: &crate::BundleOptions) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			.https_only(options.https_only())
			.connect_timeout(options.connect_timeout())
			.timeout(options.request_timeout())
			.user_agent(concat!("package-bundle/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self::with_client(client, options.registry_url()))
	}

	pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
		let mut base_url = base_url.into();
		while base_url.ends_with('/') {
			base_url.pop();
		}
		Self { client, base_url }
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn package_url(&self, name: &str) -> String {
		format!("{}/{}", self.base_url, escape_package_name(name))
	}

	pub(crate) fn client(&self) -> &reqwest::Client {
		&self.client
	}
}

#[async_trait]
impl Registry for RegistryClient {
	async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
		let url = self.package_url(name);
		log::trace!("Fetching metadata for {} from {}", name, url);

		let response = self.client
			.get(&url)
			.header(reqwest::header::ACCEPT, "application/json")
			.send()
			.await?;

		let status = response.status();
		if status == reqwest::StatusCode::NOT_FOUND {
			return Err(RegistryError::NotFound(name.to_owned()));
		}
		if !status.is_success() {
			return Err(RegistryError::Transport(format!("registry returned {} for {}", status, name)));
		}

		let body = response.bytes().await?;
		serde_json::from_slice(&body).map_err(|source| RegistryError::Decode { name: name.to_owned(), source })
	}
}
