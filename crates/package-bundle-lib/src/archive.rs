//! Packs the staging directory into a single `.tgz`.

use std::path::{Path, PathBuf};

/// Writes every file under `staging_dir` into a gzip compressed tarball at `out_file`.
///
/// Entries are relative to `staging_dir` and added in path order.
///
/// # Returns
/// `None` when there was nothing to archive.
pub fn create_archive(staging_dir: &Path, out_file: &Path) -> crate::Result<Option<PathBuf>> {
	if !staging_dir.exists() {
		log::info!("Nothing was downloaded");
		return Ok(None);
	}

	let mut files = Vec::<PathBuf>::new();
	for entry in walkdir::WalkDir::new(staging_dir).sort_by_file_name() {
		let entry = entry.map_err(std::io::Error::from)?;
		if entry.file_type().is_file() {
			files.push(entry.into_path());
		}
	}

	if files.is_empty() {
		log::info!("Nothing was downloaded");
		return Ok(None);
	}

	log::info!("Archiving {} files into {}", files.len(), out_file.display());
	let file = std::fs::File::create(out_file)?;
	let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
	let mut builder = tar::Builder::new(encoder);
	for path in &files {
		let name = path
			.strip_prefix(staging_dir)
			.map_err(|_| crate::Error::Parse(format!("{} is outside the staging directory", path.display())))?;
		builder.append_path_with_name(path, name)?;
	}
	builder.into_inner()?.finish()?;

	Ok(Some(out_file.to_path_buf()))
}

/// Removes the staging directory and everything in it.
pub fn clean_up(staging_dir: &Path) -> crate::Result<()> {
	if staging_dir.exists() {
		log::debug!("Removing {}", staging_dir.display());
		std::fs::remove_dir_all(staging_dir)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Read;

	fn entry_names(archive: &Path) -> Vec<String> {
		let mut data = Vec::<u8>::new();
		flate2::read::GzDecoder::new(std::fs::File::open(archive).unwrap()).read_to_end(&mut data).unwrap();
		tar::Archive::new(data.as_slice())
			.entries()
			.unwrap()
			.map(|e| e.unwrap().path().unwrap().to_string_lossy().replace('\\', "/"))
			.collect()
	}

	#[test]
	fn archives_files_relative_to_staging() {
		let dir = tempfile::tempdir().unwrap();
		let staging = dir.path().join("stage");
		std::fs::create_dir_all(staging.join("foo")).unwrap();
		std::fs::write(staging.join("foo").join("foo-1.0.0.tgz"), b"foo").unwrap();
		std::fs::write(staging.join("bar-2.0.0.tgz"), b"bar").unwrap();

		let out = dir.path().join("bundle.tgz");
		assert_eq!(create_archive(&staging, &out).unwrap(), Some(out.clone()));
		assert_eq!(entry_names(&out), vec!["bar-2.0.0.tgz", "foo/foo-1.0.0.tgz"]);
	}

	#[test]
	fn nothing_to_archive() {
		let dir = tempfile::tempdir().unwrap();
		let out = dir.path().join("bundle.tgz");
		assert_eq!(create_archive(&dir.path().join("missing"), &out).unwrap(), None);

		std::fs::create_dir_all(dir.path().join("empty")).unwrap();
		assert_eq!(create_archive(&dir.path().join("empty"), &out).unwrap(), None);
		assert!(!out.exists());
	}

	#[test]
	fn clean_up_removes_staging() {
		let dir = tempfile::tempdir().unwrap();
		let staging = dir.path().join("stage");
		std::fs::create_dir_all(staging.join("a")).unwrap();
		clean_up(&staging).unwrap();
		assert!(!staging.exists());
		clean_up(&staging).unwrap();
	}
}
