use crate::error::AdapterError;
use crate::process::run_shell;
use crate::{assignment_name, diff_policy, fs_util, AssignmentAdapter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tourney_primitives::{Outcome, Prog, Test, TestResult};

const LOG_TARGET: &str = "adapter::junit";

fn num_tests_re() -> &'static regex::Regex {
	static RE: OnceLock<regex::Regex> = OnceLock::new();
	RE.get_or_init(|| regex::Regex::new(r"Tests run: ([0-9]+)").unwrap())
}

/// JUnit-style assignment, ported behavior-for-behavior from
/// `ant_assignment.py`. Expects `source_dir/tests/<test>` and
/// `source_dir/programs/<prog>`, with `programs/original` as the reference.
pub struct JunitAssignment {
	source_dir: PathBuf,
	name: String,
	tests: Vec<Test>,
	progs: Vec<Prog>,
}

impl JunitAssignment {
	pub fn new(source_dir: impl Into<PathBuf>) -> Result<Self, AdapterError> {
		let source_dir = source_dir.into();
		let read_sorted = |sub: &str, exclude: Option<&str>| -> Result<Vec<String>, AdapterError> {
			let dir = source_dir.join(sub);
			let mut entries: Vec<String> = std::fs::read_dir(&dir)
				.map_err(|source| AdapterError::Io { path: dir.clone(), source })?
				.filter_map(|e| e.ok())
				.map(|e| e.file_name().to_string_lossy().into_owned())
				.filter(|name| Some(name.as_str()) != exclude)
				.collect();
			entries.sort();
			Ok(entries)
		};

		let tests = read_sorted("tests", None)?.into_iter().map(Test::from).collect();
		let progs = read_sorted("programs", Some("original"))?.into_iter().map(Prog::from).collect();
		let name = assignment_name(&source_dir);

		Ok(Self { source_dir, name, tests, progs })
	}
}

#[async_trait]
impl AssignmentAdapter for JunitAssignment {
	fn tests(&self) -> &[Test] {
		&self.tests
	}

	fn progs(&self) -> &[Prog] {
		&self.progs
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn source_dir(&self) -> &Path {
		&self.source_dir
	}

	async fn prep_submission(&self, submission_dir: &Path, work_dir: &Path) -> Outcome {
		fs_util::remove_dir_if_exists(&work_dir.join("tests")).await.ok();
		if let Err(e) = fs_util::copy_dir_all(&submission_dir.join("tests"), &work_dir.join("tests")).await {
			return Outcome::err(format!("failed to copy tests: {e}"));
		}

		for prog in &self.progs {
			fs_util::remove_dir_if_exists(&work_dir.join("programs").join(prog.as_str())).await.ok();
			if let Err(e) = fs_util::copy_dir_all(
				&submission_dir.join("programs").join(prog.as_str()),
				&work_dir.join("programs").join(prog.as_str()),
			)
			.await
			{
				return Outcome::err(format!("failed to copy prog {prog}: {e}"));
			}
		}

		Outcome::ok("Preparation successful")
	}

	async fn compile_prog(&self, _work_dir: &Path, _prog: &Prog) -> Outcome {
		// compilation is handled by the ant build script at test time
		Outcome::ok("")
	}

	async fn compile_test(&self, _work_dir: &Path, _test: &Test) -> Outcome {
		Outcome::ok("")
	}

	async fn run_test(&self, test: &Test, prog: &Prog, work_dir: &Path, _use_poc: bool) -> (TestResult, String) {
		let command = format!("ant test -Dtest=\"{test}\" -Dprogram=\"{prog}\"");
		match run_shell(&command, work_dir, Duration::from_secs(120)).await {
			Ok(finished) if finished.output.contains("Parallel execution timed out") => {
				(TestResult::Timeout, finished.output)
			}
			Ok(finished) if finished.status == Some(0) => (TestResult::NoBugsDetected, finished.output),
			Ok(finished) => (TestResult::BugFound, finished.output),
			Err(e) => (TestResult::UnexpectedReturnCode, format!("failed to run ant: {e}")),
		}
	}

	fn num_tests(&self, traces: &str) -> u32 {
		match num_tests_re().captures(traces) {
			Some(caps) => caps[1].parse().unwrap_or(20),
			None => {
				tracing::error!(target: LOG_TARGET, "cannot find 'Tests run: ([0-9]+)' in traces:\n{traces}");
				20
			}
		}
	}

	async fn detect_new_tests(&self, new_submission: &Path, old_submission: Option<&Path>) -> Vec<Test> {
		let Some(old_submission) = old_submission else {
			return self.tests.clone();
		};
		if !old_submission.is_dir() {
			return self.tests.clone();
		}

		let mut new_tests = Vec::new();
		for test in &self.tests {
			let new_path = new_submission.join("tests").join(test.as_str());
			let old_path = old_submission.join("tests").join(test.as_str());
			if !dirs_match(&new_path, &old_path).await {
				new_tests.push(test.clone());
			}
		}
		new_tests
	}

	async fn detect_new_progs(&self, new_submission: &Path, old_submission: Option<&Path>) -> Vec<Prog> {
		let Some(old_submission) = old_submission else {
			return self.progs.clone();
		};
		if !old_submission.is_dir() {
			return self.progs.clone();
		}

		let mut new_progs = Vec::new();
		for prog in &self.progs {
			let new_path = new_submission.join("programs").join(prog.as_str());
			let old_path = old_submission.join("programs").join(prog.as_str());
			if !dirs_match(&new_path, &old_path).await {
				new_progs.push(prog.clone());
			}
		}
		new_progs
	}

	async fn prep_test_stage(&self, tester_dir: &Path, testee_dir: &Path, stage_dir: &Path) -> std::io::Result<()> {
		tokio::fs::create_dir_all(stage_dir.join(".depcache")).await?;
		tokio::fs::create_dir_all(stage_dir.join("classes")).await?;

		let tester_files = [".depcache/tests", "tests", "classes/tests"];
		let testee_files = [".depcache/programs", "programs", "classes/programs"];

		for file in tester_files {
			fs_util::relink(&tester_dir.join(file), &stage_dir.join(file)).await?;
		}
		for file in testee_files {
			fs_util::relink(&testee_dir.join(file), &stage_dir.join(file)).await?;
		}
		Ok(())
	}

	async fn progs_identical(&self, a: &Prog, b: &Prog, submission_dir: &Path) -> bool {
		let command = format!("diff -rw {a} {b}");
		matches!(
			run_shell(&command, &submission_dir.join("programs"), Duration::from_secs(30)).await,
			Ok(finished) if finished.status == Some(0)
		)
	}

	async fn check_diff(&self, submission_dir: &Path, prog: &Prog) -> Outcome {
		let command = format!("diff -rw original {prog}");
		match run_shell(&command, &submission_dir.join("programs"), Duration::from_secs(30)).await {
			Ok(finished) => diff_policy::check_diff_policy(&finished.output),
			Err(e) => Outcome::err(format!("failed to run diff: {e}")),
		}
	}

	async fn raw_diff(&self, submission_dir: &Path, prog: &Prog) -> String {
		let command = format!("diff -rw original {prog}");
		match run_shell(&command, &submission_dir.join("programs"), Duration::from_secs(30)).await {
			Ok(finished) => finished.output,
			Err(e) => format!("failed to run diff: {e}"),
		}
	}

	fn normalize_test_score(&self, raw: f64, best_raw: f64, suite_size: u32) -> f64 {
		if best_raw == 0.0 {
			return 0.0;
		}
		let score = (raw / best_raw) / (f64::from(suite_size.max(1)).ln() + 10.0);
		(score * 25.0 * 100.0).round() / 100.0
	}

	fn normalize_prog_score(&self, raw: f64, best_raw: f64) -> f64 {
		if best_raw == 0.0 {
			return 0.0;
		}
		let score = (raw / best_raw) * 2.5;
		(score * 100.0).round() / 100.0
	}
}

async fn dirs_match(a: &Path, b: &Path) -> bool {
	let command = format!("diff -r {} {}", a.display(), b.display());
	matches!(
		run_shell(&command, Path::new("/"), Duration::from_secs(30)).await,
		Ok(finished) if finished.status == Some(0)
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_file(path: &Path, contents: &str) {
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(path, contents).unwrap();
	}

	fn fixture() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		write_file(&dir.path().join("tests/Boundary/T.java"), "test");
		write_file(&dir.path().join("tests/Partitioning/T.java"), "test");
		write_file(&dir.path().join("programs/original/Main.java"), "orig");
		write_file(&dir.path().join("programs/mutant-1/Main.java"), "mutant");
		dir
	}

	#[test]
	fn lists_tests_and_progs_sorted_excluding_original() {
		let dir = fixture();
		let assignment = JunitAssignment::new(dir.path()).unwrap();
		assert_eq!(assignment.tests(), &[Test::from("Boundary"), Test::from("Partitioning")]);
		assert_eq!(assignment.progs(), &[Prog::from("mutant-1")]);
	}

	#[test]
	fn num_tests_parses_ant_junit_summary() {
		let dir = fixture();
		let assignment = JunitAssignment::new(dir.path()).unwrap();
		assert_eq!(assignment.num_tests("Tests run: 12, Failures: 0"), 12);
		assert_eq!(assignment.num_tests("no summary line here"), 20);
	}

	#[test]
	fn normalizes_scores_per_formula() {
		let dir = fixture();
		let assignment = JunitAssignment::new(dir.path()).unwrap();
		assert_eq!(assignment.normalize_prog_score(0.0, 0.0), 0.0);
		assert_eq!(assignment.normalize_prog_score(1.0, 1.0), 2.5);
		assert_eq!(assignment.normalize_test_score(0.0, 0.0, 12), 0.0);
	}

	#[tokio::test]
	async fn detect_new_tests_returns_full_list_without_a_previous_submission() {
		let dir = fixture();
		let assignment = JunitAssignment::new(dir.path()).unwrap();
		let new_tests = assignment.detect_new_tests(dir.path(), None).await;
		assert_eq!(new_tests, assignment.tests());
	}
}
