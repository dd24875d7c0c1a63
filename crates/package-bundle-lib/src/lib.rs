pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::BundleOptions;
pub use config::Layout;

pub mod registry;
pub use registry::Registry;
pub use registry::RegistryClient;

pub mod version_selector;

pub mod resolution_cache;
pub use resolution_cache::ResolutionCache;

pub mod resolver;
pub use resolver::PackageRequest;

pub mod download;
pub mod archive;
pub mod bundle;
