//! Registry metadata documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Dependency name to version range.
pub type DependencyMap = BTreeMap<String, String>;

/// Everything the registry knows about a package name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
	#[serde(default)]
	pub name: Option<String>,
	/// Absent for unpublished packages. Records that don't decode are left out.
	#[serde(default, deserialize_with = "lenient_versions")]
	pub versions: Option<BTreeMap<String, PackageVersion>>,
	#[serde(rename = "dist-tags", default)]
	pub dist_tags: BTreeMap<String, String>,
}

impl PackageMetadata {
	/// The version the `latest` dist-tag points at.
	pub fn latest(&self) -> Option<&str> {
		self.tagged_version("latest")
	}

	pub fn tagged_version(&self, tag: &str) -> Option<&str> {
		self.dist_tags.get(tag).map(String::as_str)
	}

	/// `None` when the document has no versions at all.
	pub fn published(&self) -> Option<&BTreeMap<String, PackageVersion>> {
		self.versions.as_ref().filter(|v| !v.is_empty())
	}

	pub fn get(&self, version: &str) -> Option<&PackageVersion> {
		self.versions.as_ref()?.get(version)
	}
}

/// A single published version of a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
	pub name: String,
	pub version: String,
	pub dist: Dist,
	#[serde(default, deserialize_with = "lenient_dependency_map")]
	pub dependencies: DependencyMap,
	#[serde(default, deserialize_with = "lenient_dependency_map")]
	pub dev_dependencies: DependencyMap,
	#[serde(default, deserialize_with = "lenient_dependency_map")]
	pub optional_dependencies: DependencyMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
	pub tarball: String,
}

fn lenient_versions<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, PackageVersion>>, D::Error>
where D: Deserializer<'de>
{
	let value = serde_json::Value::deserialize(deserializer)?;
	let records = match value {
		serde_json::Value::Object(records) => records,
		_ => return Ok(None),
	};

	let mut versions = BTreeMap::new();
	for (version, record) in records {
		match PackageVersion::deserialize(record) {
			Ok(record) => {
				versions.insert(version, record);
			},
			Err(e) => log::debug!("Skipping version {}: {}", version, e),
		}
	}
	Ok(Some(versions))
}

/* Old documents carry dependency lists as arrays, nulls, or with non-string ranges. */
fn lenient_dependency_map<'de, D>(deserializer: D) -> Result<DependencyMap, D::Error>
where D: Deserializer<'de>
{
	let value = serde_json::Value::deserialize(deserializer)?;
	Ok(match value {
		serde_json::Value::Object(map) => map
			.into_iter()
			.filter_map(|(name, range)| match range {
				serde_json::Value::String(range) => Some((name, range)),
				_ => None,
			})
			.collect(),
		_ => DependencyMap::new(),
	})
}

/// Combines the dependency maps of a version into the set to resolve.
///
/// Runtime dependencies are always included. Dev and then optional dependencies are merged on
/// top when their flag is set, replacing any earlier range for the same name.
pub fn merge_dependencies(
	dependencies: &DependencyMap,
	dev_dependencies: &DependencyMap,
	optional_dependencies: &DependencyMap,
	include_dev: bool,
	include_optional: bool,
) -> DependencyMap {
	let mut merged = dependencies.clone();
	if include_dev {
		merged.extend(dev_dependencies.iter().map(|(k, v)| (k.clone(), v.clone())));
	}
	if include_optional {
		merged.extend(optional_dependencies.iter().map(|(k, v)| (k.clone(), v.clone())));
	}
	merged
}

#[cfg(test)]
mod tests {
	use super::*;

	fn map(entries: &[(&str, &str)]) -> DependencyMap {
		entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn decodes_a_registry_document() {
		let json = r#"{
			"name": "foo",
			"dist-tags": { "latest": "1.2.0", "next": "2.0.0-rc.1" },
			"versions": {
				"1.2.0": {
					"name": "foo",
					"version": "1.2.0",
					"dist": { "tarball": "https://r.test/foo/-/foo-1.2.0.tgz", "shasum": "abc" },
					"dependencies": { "bar": "^1.0.0" },
					"devDependencies": { "mocha": "*" },
					"scripts": { "test": "mocha" }
				}
			}
		}"#;
		let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
		assert_eq!(metadata.latest(), Some("1.2.0"));
		assert_eq!(metadata.tagged_version("next"), Some("2.0.0-rc.1"));

		let version = metadata.get("1.2.0").unwrap();
		assert_eq!(version.dist.tarball, "https://r.test/foo/-/foo-1.2.0.tgz");
		assert_eq!(version.dependencies, map(&[("bar", "^1.0.0")]));
		assert_eq!(version.dev_dependencies, map(&[("mocha", "*")]));
		assert!(version.optional_dependencies.is_empty());
	}

	#[test]
	fn malformed_dependency_maps_decode_as_empty() {
		let json = r#"{
			"name": "old", "version": "0.0.1", "dist": { "tarball": "t" },
			"dependencies": [],
			"devDependencies": null,
			"optionalDependencies": { "ok": "1.0.0", "bad": 3 }
		}"#;
		let version: PackageVersion = serde_json::from_str(json).unwrap();
		assert!(version.dependencies.is_empty());
		assert!(version.dev_dependencies.is_empty());
		assert_eq!(version.optional_dependencies, map(&[("ok", "1.0.0")]));
	}

	#[test]
	fn broken_version_records_are_skipped() {
		let json = r#"{
			"name": "foo",
			"dist-tags": { "latest": "1.0.0" },
			"versions": {
				"0.0.1": { "name": "foo", "version": "0.0.1" },
				"0.0.2": "not a record",
				"1.0.0": { "name": "foo", "version": "1.0.0", "dist": { "tarball": "https://r.test/foo-1.0.0.tgz" } }
			}
		}"#;
		let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
		let versions = metadata.published().unwrap();
		assert_eq!(versions.keys().collect::<Vec<_>>(), vec!["1.0.0"]);
		assert!(metadata.get("0.0.1").is_none());
	}

	#[test]
	fn versions_that_are_not_a_map_count_as_unpublished() {
		let metadata: PackageMetadata = serde_json::from_str(r#"{ "name": "odd", "versions": [] }"#).unwrap();
		assert!(metadata.published().is_none());
	}

	#[test]
	fn unpublished_package_has_no_versions() {
		let metadata: PackageMetadata = serde_json::from_str(r#"{ "name": "gone", "time": { "unpublished": {} } }"#).unwrap();
		assert!(metadata.published().is_none());
		assert!(metadata.latest().is_none());

		let empty: PackageMetadata = serde_json::from_str(r#"{ "versions": {} }"#).unwrap();
		assert!(empty.published().is_none());
	}

	#[test]
	fn runtime_dependencies_only_by_default() {
		let merged = merge_dependencies(&map(&[("a", "1")]), &map(&[("b", "2")]), &map(&[("c", "3")]), false, false);
		assert_eq!(merged, map(&[("a", "1")]));
	}

	#[test]
	fn dev_and_optional_merge_per_flag() {
		let merged = merge_dependencies(&map(&[("a", "1")]), &map(&[("b", "2")]), &map(&[("c", "3")]), true, false);
		assert_eq!(merged, map(&[("a", "1"), ("b", "2")]));
		let merged = merge_dependencies(&map(&[("a", "1")]), &map(&[("b", "2")]), &map(&[("c", "3")]), false, true);
		assert_eq!(merged, map(&[("a", "1"), ("c", "3")]));
	}

	#[test]
	fn later_maps_shadow_earlier_ranges() {
		let merged = merge_dependencies(
			&map(&[("shared", "^1.0.0")]),
			&map(&[("shared", "^2.0.0")]),
			&map(&[("shared", "^3.0.0")]),
			true,
			true,
		);
		assert_eq!(merged, map(&[("shared", "^3.0.0")]));

		let merged = merge_dependencies(&map(&[("shared", "^1.0.0")]), &map(&[("shared", "^2.0.0")]), &DependencyMap::new(), true, false);
		assert_eq!(merged, map(&[("shared", "^2.0.0")]));
	}
}
