use regex::Regex;
use std::sync::OnceLock;
use tourney_primitives::Outcome;

fn import_modified() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(?m)^(<|>)\s*import").unwrap())
}

fn change_header() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(?m)^[0-9]{1,4}(a|c|d)[0-9]{1,4}.*$").unwrap())
}

/// True for a diff-added line (`> ...`) that isn't just a single-line `//`
/// comment. `regex` has no lookaround, so this is a plain predicate rather
/// than a single pattern.
fn is_added_non_comment_line(line: &str) -> bool {
	match line.strip_prefix('>') {
		Some(rest) => !rest.trim_start().starts_with("//"),
		None => false,
	}
}

/// Applies the shared diff-against-`original` policy used by both adapter
/// kinds, ported from `ant_assignment.py::check_diff` (identical in
/// `fuzz_assignment.py`): no import changes, at most one changed region,
/// at most one added/modified line (ignoring single-line `//` comments).
pub fn check_diff_policy(diff_text: &str) -> Outcome {
	if import_modified().is_match(diff_text) {
		return Outcome::err(format!("imports have been modified:\n\n{diff_text}"));
	}

	let changes: Vec<_> = change_header().find_iter(diff_text).collect();
	if changes.len() > 1 {
		let locations: Vec<_> = changes.iter().map(|m| m.as_str()).collect();
		return Outcome::err(format!("Code changed in more than 1 location: {locations:?}\n\n{diff_text}"));
	}

	let new_lines = diff_text.lines().filter(|l| is_added_non_comment_line(l)).count();
	if new_lines > 1 {
		return Outcome::err(format!(
			"More than 1 line modified (excluding single line // comments):\n\n{diff_text}"
		));
	}

	Outcome::ok("Diff valid")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_import_changes() {
		let diff = "3c3\n< import foo.Bar;\n---\n> import foo.Baz;\n";
		let outcome = check_diff_policy(diff);
		assert!(!outcome.success);
	}

	#[test]
	fn rejects_multiple_changed_regions() {
		let diff = "10a11\n> x++;\n20c21\n< y = 1;\n---\n> y = 2;\n";
		let outcome = check_diff_policy(diff);
		assert!(!outcome.success);
	}

	#[test]
	fn accepts_single_line_change() {
		let diff = "66a65,66\n> x++;\n";
		let outcome = check_diff_policy(diff);
		assert!(outcome.success);
	}

	#[test]
	fn ignores_single_line_comments() {
		let diff = "66a65,67\n> // a comment\n> x++;\n";
		let outcome = check_diff_policy(diff);
		assert!(outcome.success);
	}
}
