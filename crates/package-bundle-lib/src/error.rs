//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("{0}")]
	Registry(#[from] crate::registry::RegistryError),
	#[error("{0}")]
	Selection(#[from] crate::version_selector::SelectError),
	#[error("downloader failed: {0}")]
	Download(#[from] crate::download::DownloadError),
	#[error("background task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
	#[error("output dir \"{}\" already exists", .0.display())]
	AlreadyExists(std::path::PathBuf),
	/// Every requested package was already satisfied, nothing new to download.
	///
	/// This is informational rather than a failure.
	#[error("No new packages required.{}", cache_hint(.cache_enabled))]
	NoNewPackages { cache_enabled: bool },
}

impl Error {
	/// `true` for conditions that should be reported to the user without failing the run.
	pub fn is_informational(&self) -> bool {
		matches!(self, Error::NoNewPackages { .. })
	}
}

fn cache_hint(cache_enabled: &bool) -> &'static str {
	if *cache_enabled {
		" Try running with the `--no-cache` option."
	} else {
		""
	}
}
