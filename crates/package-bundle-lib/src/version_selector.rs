//! Picks a concrete version out of a package's published versions.
//!
//! Ranges use npm's flavour of semantic versioning: comparator sets joined by `||`,
//! whitespace separated comparators, hyphen ranges and X-ranges. Each comparator set is
//! rewritten into a [`semver::VersionReq`]. Pre-release versions only match when a comparator
//! in the same set names the same `major.minor.patch` with a pre-release, which is the rule
//! both npm and the `semver` crate follow.

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
	/// Nothing satisfies the range and the range isn't a published version either.
	#[error("Unable to find version {range} in {name}")]
	NoMatchingVersion { name: String, range: String },
	#[error("{0} has no \"latest\" dist-tag")]
	NoLatestTag(String),
}

/// A parsed npm version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
	sets: Vec<VersionReq>,
}

impl VersionRange {
	/// Returns `None` when any of the comparator sets is not a valid range.
	pub fn parse(range: &str) -> Option<Self> {
		let sets = range
			.split("||")
			.map(|set| canonicalize_comparator_set(set).and_then(|s| VersionReq::parse(&s).ok()))
			.collect::<Option<Vec<_>>>()?;
		Some(Self { sets })
	}

	pub fn matches(&self, version: &Version) -> bool {
		self.sets.iter().any(|req| req.matches(version))
	}

	/// The highest of `versions` satisfying the range. Strings that aren't versions are ignored.
	pub fn max_satisfying<'a>(&self, versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
		versions
			.into_iter()
			.filter_map(|v| parse_version(v).map(|parsed| (parsed, v)))
			.filter(|(parsed, _)| self.matches(parsed))
			.max_by(|a, b| a.0.cmp(&b.0))
			.map(|(_, v)| v)
	}
}

/// Selects the version of `name` to resolve.
///
/// - No range selects the `latest` tag.
/// - Otherwise the highest available version satisfying the range.
/// - Failing that the range is taken literally, ranges are sometimes tags or git refs.
pub fn select(name: &str, available: &[&str], latest: Option<&str>, range: Option<&str>) -> Result<String, SelectError> {
	let range = match range {
		Some(range) => range,
		None => return latest.map(str::to_owned).ok_or_else(|| SelectError::NoLatestTag(name.to_owned())),
	};

	if let Some(version) = VersionRange::parse(range).and_then(|r| r.max_satisfying(available.iter().copied())) {
		return Ok(version.to_owned());
	}

	if available.contains(&range) {
		Ok(range.to_owned())
	} else {
		Err(SelectError::NoMatchingVersion { name: name.to_owned(), range: range.to_owned() })
	}
}

/// Whether any of `versions` satisfies `range`, or equals it literally.
///
/// Always `false` without a range, `latest` has to be looked up in the registry.
pub fn any_satisfies<'a>(versions: impl IntoIterator<Item = &'a str> + Clone, range: Option<&str>) -> bool {
	match range {
		None => false,
		Some(range) => {
			let by_range = VersionRange::parse(range)
				.map(|r| r.max_satisfying(versions.clone()).is_some())
				.unwrap_or(false);
			by_range || versions.into_iter().any(|v| v == range)
		},
	}
}

fn parse_version(version: &str) -> Option<Version> {
	let version = version.trim();
	let version = version.strip_prefix('=').unwrap_or(version);
	let version = version.strip_prefix('v').unwrap_or(version);
	Version::parse(version).ok()
}

const OPERATORS: [&str; 8] = ["<=", ">=", "~>", "<", ">", "=", "^", "~"];

fn split_operator(token: &str) -> (&'static str, &str) {
	for op in OPERATORS {
		if let Some(rest) = token.strip_prefix(op) {
			return (if op == "~>" { "~" } else { op }, rest);
		}
	}
	("", token)
}

/// Rewrites one npm comparator set into `semver` syntax.
fn canonicalize_comparator_set(set: &str) -> Option<String> {
	let tokens: Vec<&str> = set.split_whitespace().collect();

	if let [low, "-", high] = tokens.as_slice() {
		return Some(join_comparators(vec![comparator(">=", low)?, comparator("<=", high)?]));
	}

	let mut comparators = Vec::with_capacity(tokens.len());
	let mut pending_op: Option<&str> = None;
	for token in tokens {
		let (op, version) = split_operator(token);
		let (op, version) = match (pending_op.take(), op, version) {
			(Some(pending), "", version) => (pending, version),
			(Some(_), _, _) => return None,
			/* `>= 1.2.3` */
			(None, op, "") => {
				pending_op = Some(op);
				continue;
			},
			(None, op, version) => (op, version),
		};
		comparators.push(comparator(op, version)?);
	}
	if pending_op.is_some() {
		return None;
	}

	Some(join_comparators(comparators))
}

fn join_comparators(comparators: Vec<String>) -> String {
	let bounded: Vec<String> = comparators.into_iter().filter(|c| c != "*").collect();
	if bounded.is_empty() {
		"*".to_string()
	} else {
		bounded.join(", ")
	}
}

/// A single comparator. Bare full versions are exact matches in npm, partial ones are X-ranges.
fn comparator(op: &str, version: &str) -> Option<String> {
	let version = version.strip_prefix('v').unwrap_or(version);
	/* Build metadata never takes part in matching */
	let version = version.split('+').next().unwrap_or(version);
	let (core, pre) = match version.split_once('-') {
		Some((core, pre)) => (core, Some(pre)),
		None => (version, None),
	};

	let mut parts = Vec::with_capacity(3);
	for part in core.split('.') {
		if matches!(part, "x" | "X" | "*") {
			break;
		}
		if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
			return None;
		}
		parts.push(part);
	}
	if parts.len() > 3 {
		return None;
	}
	let partial = parts.len() < 3;
	let core = parts.join(".");

	match (op, parts.len()) {
		("" | "=" | "^" | "~" | ">=" | "<=", 0) => Some("*".to_string()),
		(_, 0) => None,
		("" | "=", _) if partial => Some(format!("{}.*", core)),
		(op, _) => {
			let op = if op.is_empty() { "=" } else { op };
			match pre.filter(|_| !partial) {
				Some(pre) => Some(format!("{}{}-{}", op, core, pre)),
				None => Some(format!("{}{}", op, core)),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FOO: [&str; 3] = ["1.0.0", "1.2.0", "2.0.0"];

	fn pick(available: &[&str], range: &str) -> Option<String> {
		select("foo", available, Some("2.0.0"), Some(range)).ok()
	}

	#[test] fn caret_picks_highest_in_major() { assert_eq!(pick(&FOO, "^1.0.0").as_deref(), Some("1.2.0")) }
	#[test] fn tilde_stays_in_minor() { assert_eq!(pick(&["1.0.0", "1.0.5", "1.1.0"], "~1.0.0").as_deref(), Some("1.0.5")) }
	#[test] fn bare_full_version_is_exact() { assert_eq!(pick(&FOO, "1.0.0").as_deref(), Some("1.0.0")) }
	#[test] fn bare_partial_version_is_x_range() { assert_eq!(pick(&FOO, "1").as_deref(), Some("1.2.0")) }
	#[test] fn x_range() { assert_eq!(pick(&FOO, "1.x").as_deref(), Some("1.2.0")) }
	#[test] fn x_range_minor() { assert_eq!(pick(&["1.2.0", "1.2.9", "1.3.0"], "1.2.X").as_deref(), Some("1.2.9")) }
	#[test] fn star_picks_highest() { assert_eq!(pick(&FOO, "*").as_deref(), Some("2.0.0")) }
	#[test] fn empty_range_is_star() { assert_eq!(pick(&FOO, "").as_deref(), Some("2.0.0")) }
	#[test] fn whitespace_comparators() { assert_eq!(pick(&FOO, ">=1.0.0 <2.0.0").as_deref(), Some("1.2.0")) }
	#[test] fn detached_operators() { assert_eq!(pick(&FOO, ">= 1.0.0 < 2.0.0").as_deref(), Some("1.2.0")) }
	#[test] fn or_sets() { assert_eq!(pick(&FOO, "^3.0.0 || ^1.0.0").as_deref(), Some("1.2.0")) }
	#[test] fn hyphen_range() { assert_eq!(pick(&FOO, "1.0.0 - 1.2.0").as_deref(), Some("1.2.0")) }
	#[test] fn hyphen_range_partial_upper() { assert_eq!(pick(&["1.0.0", "1.2.7", "1.3.0"], "1 - 1.2").as_deref(), Some("1.2.7")) }
	#[test] fn v_prefix_is_ignored() { assert_eq!(pick(&FOO, "=v1.2.0").as_deref(), Some("1.2.0")) }
	#[test] fn greater_than_partial() { assert_eq!(pick(&FOO, ">1").as_deref(), Some("2.0.0")) }
	#[test] fn prerelease_excluded_by_default() { assert_eq!(pick(&["1.0.0", "1.1.0-beta.1"], "^1.0.0").as_deref(), Some("1.0.0")) }
	#[test] fn prerelease_matched_when_named() { assert_eq!(pick(&["1.0.0", "1.1.0-beta.1"], "^1.1.0-beta.0").as_deref(), Some("1.1.0-beta.1")) }
	#[test] fn invalid_available_versions_are_skipped() { assert_eq!(pick(&["1.0.0", "banana", "1.0"], "*").as_deref(), Some("1.0.0")) }
	#[test] fn literal_fallback() { assert_eq!(pick(&["1.0.0", "experimental"], "experimental").as_deref(), Some("experimental")) }
	#[test] fn nothing_matches() { assert!(pick(&FOO, "^5.0.0").is_none()) }
	#[test] fn unparseable_and_not_literal() { assert!(pick(&FOO, "github:user/repo").is_none()) }

	#[test]
	fn no_range_selects_latest_tag() {
		assert_eq!(select("foo", &FOO, Some("1.2.0"), None).unwrap(), "1.2.0");
	}

	#[test]
	fn no_range_without_latest_tag_fails() {
		assert!(matches!(select("foo", &FOO, None, None), Err(SelectError::NoLatestTag(_))));
	}

	#[test]
	fn failure_names_package_and_range() {
		let e = select("foo", &FOO, None, Some("^9")).unwrap_err();
		assert_eq!(e.to_string(), "Unable to find version ^9 in foo");
	}

	#[test]
	fn result_is_maximum_satisfying() {
		let available = ["0.9.0", "1.0.0", "1.0.1", "1.4.2", "1.10.0", "2.0.0-rc.1", "2.0.0"];
		let ranges = ["^1.0.0", "~1.0.0", ">=1.0.0 <1.5.0", "<2.0.0", "1.x || 0.x", "*"];
		for range in ranges {
			let parsed = VersionRange::parse(range).unwrap();
			let selected = pick(&available, range).unwrap();
			let selected = Version::parse(&selected).unwrap();
			for candidate in available {
				let candidate = Version::parse(candidate).unwrap();
				if parsed.matches(&candidate) {
					assert!(candidate <= selected, "{} matches {} but {} was selected", candidate, range, selected);
				}
			}
		}
	}

	#[test]
	fn any_satisfies_by_range_or_literal() {
		let cached = ["1.2.0", "beta"];
		assert!(any_satisfies(cached, Some("^1.0.0")));
		assert!(any_satisfies(cached, Some("beta")));
		assert!(!any_satisfies(cached, None));
		assert!(!any_satisfies(cached, Some("^2.0.0")));
		assert!(!any_satisfies([], None));
	}
}
