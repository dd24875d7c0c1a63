use std::process::ExitCode;
use std::sync::Arc;

use package_bundle::{BundleOptions, Layout, PackageRequest};

#[tokio::main]
async fn main() -> ExitCode {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",                   "Show help");
		opts.optflag( "v", "verbose",                "Increased vebosity");
		opts.optflag( "d", "dev",                    "Include devDependencies");
		opts.optflag( "o", "optional",               "Include optionalDependencies");
		opts.optflag( "f", "flat",                   "Stage archives in a single directory");
		opts.optflag( "a", "no-archive",             "Leave downloads in the staging directory");
		opts.optflag( "c", "no-cache",               "Ignore and don't update the resolution cache");
		opts.optflag( "",  "all-versions",           "Bundle every version of the requested packages");
		opts.optflag( "",  "all-versions-recursive", "Bundle every version of every package");
		opts.optopt(  "j", "concurrency",            "Requests in flight at once", "N");
		opts.optopt(  "",  "out-file",               "Archive to write", "FILE");
		opts.optopt(  "",  "registry",               "Registry to resolve against", "URL");
		opts.optopt(  "",  "config",                 "Read options from a JSON file", "FILE");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { eprintln!("Unable to parse options: {}", e); return ExitCode::FAILURE }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("Usage: package-bundle [options] <package[@range]>..."));
			return ExitCode::SUCCESS;
		}

		parsed_options
	};

	let level = if parsed_options.opt_present("v") { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	let options = match build_options(&parsed_options) {
		Ok(options) => options,
		Err(e) => {
			log::error!("{}", e);
			return ExitCode::FAILURE;
		},
	};

	if parsed_options.free.is_empty() {
		log::error!("No packages given.");
		eprintln!("{}", opts.short_usage("package-bundle"));
		return ExitCode::FAILURE;
	}
	let requests: Vec<PackageRequest> = parsed_options.free.iter().map(|s| PackageRequest::parse(s)).collect();

	match bundle(&options, requests).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(Error::Bundle(e)) if e.is_informational() => {
			println!("{}", e);
			ExitCode::SUCCESS
		},
		Err(e) => {
			log::error!("{}", e);
			ExitCode::FAILURE
		},
	}
}

/// Options from `--config` if given, with command line flags on top.
fn build_options(parsed: &getopts::Matches) -> Result<BundleOptions, Error> {
	let mut options = match parsed.opt_str("config") {
		Some(path) => BundleOptions::load_from_file(path)?,
		None => BundleOptions::default(),
	};

	if parsed.opt_present("d") { options.set_include_dev(true) }
	if parsed.opt_present("o") { options.set_include_optional(true) }
	if parsed.opt_present("f") { options.set_layout(Layout::Flat) }
	if parsed.opt_present("a") { options.set_archive(false) }
	if parsed.opt_present("c") { options.set_use_cache(false) }
	if parsed.opt_present("all-versions") { options.set_all_versions(true) }
	if parsed.opt_present("all-versions-recursive") { options.set_all_versions_recursive(true) }

	if let Some(concurrency) = parsed.opt_str("j") {
		let concurrency = concurrency.parse::<usize>().map_err(|_| Error::InvalidArgument("concurrency", concurrency))?;
		options.set_concurrency(concurrency);
	}
	if let Some(out_file) = parsed.opt_str("out-file") {
		options.set_out_file(out_file);
	}
	if let Some(registry) = parsed.opt_str("registry") {
		options.set_registry_url(registry);
	}

	Ok(options)
}

async fn bundle(options: &BundleOptions, requests: Vec<PackageRequest>) -> Result<(), Error> {
	let client = Arc::new(package_bundle::RegistryClient::new(options)?);
	let report = package_bundle::bundle::run(options, requests, client).await?;

	for failure in &report.resolve_failures {
		log::error!("failed to resolve {}: {}", failure.package, failure.error);
	}
	for (package, error) in &report.download_failures {
		log::error!("failed to download {}: {}", package, error);
	}
	if report.truncated {
		log::warn!("Package limit of {} reached, the bundle is incomplete.", options.max_packages());
	}

	match &report.archive {
		Some(archive) => println!("Bundled {} packages into {}", report.staged.len(), archive.display()),
		None if options.archive() => println!("Nothing was downloaded"),
		None => println!("Downloaded {} packages into {}", report.staged.len(), options.staging_dir().display()),
	}

	if report.download_failures.is_empty() {
		Ok(())
	} else {
		Err(Error::Download(report.download_failures.len()))
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Bundle(#[from] package_bundle::Error),
	#[error("Invalid value for {0}: \"{1}\"")]
	InvalidArgument(&'static str, String),
	#[error("{0} packages failed to download")]
	Download(usize),
}
