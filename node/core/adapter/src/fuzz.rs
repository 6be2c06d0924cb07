use crate::error::AdapterError;
use crate::process::run_shell;
use crate::{assignment_name, diff_policy, AssignmentAdapter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tourney_primitives::{Outcome, Prog, Test, TestResult};

/// Fuzzer-style assignment, ported from `fuzz_assignment.py`. Expects
/// `source_dir/src/<prog>` (excluding `original` and `include`) and a
/// single synthetic test named `fuzzer`, since test cases are generated at
/// compile time rather than checked in.
pub struct FuzzAssignment {
	source_dir: PathBuf,
	name: String,
	tests: Vec<Test>,
	progs: Vec<Prog>,
}

impl FuzzAssignment {
	const TEST_TIMEOUT: Duration = Duration::from_secs(30);
	const FUZZ_GEN_TIMEOUT: Duration = Duration::from_secs(300);

	pub fn new(source_dir: impl Into<PathBuf>) -> Result<Self, AdapterError> {
		let source_dir = source_dir.into();
		let src_dir = source_dir.join("src");
		let mut progs: Vec<String> = std::fs::read_dir(&src_dir)
			.map_err(|source| AdapterError::Io { path: src_dir.clone(), source })?
			.filter_map(|e| e.ok())
			.map(|e| e.file_name().to_string_lossy().into_owned())
			.filter(|name| name != "original" && name != "include")
			.collect();
		progs.sort();

		let name = assignment_name(&source_dir);
		Ok(Self { source_dir, name, tests: vec![Test::from("fuzzer")], progs: progs.into_iter().map(Prog::from).collect() })
	}
}

#[async_trait]
impl AssignmentAdapter for FuzzAssignment {
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
		if let Err(e) = run_shell("make clean", submission_dir, Duration::from_secs(60)).await {
			return Outcome::err(format!("make clean failed: {e}"));
		}
		if let Err(e) = run_shell("rm -rf tests/*", submission_dir, Duration::from_secs(10)).await {
			return Outcome::err(format!("clearing tests failed: {e}"));
		}

		for folder in ["fuzzer", "poc"] {
			crate::fs_util::remove_dir_if_exists(&work_dir.join(folder)).await.ok();
			if let Err(e) = crate::fs_util::copy_dir_all(&submission_dir.join(folder), &work_dir.join(folder)).await {
				return Outcome::err(format!("failed to copy {folder}: {e}"));
			}
		}

		for prog in &self.progs {
			crate::fs_util::remove_dir_if_exists(&work_dir.join("src").join(prog.as_str())).await.ok();
			if let Err(e) = crate::fs_util::copy_dir_all(
				&submission_dir.join("src").join(prog.as_str()),
				&work_dir.join("src").join(prog.as_str()),
			)
			.await
			{
				return Outcome::err(format!("failed to copy prog {prog}: {e}"));
			}
		}

		if let Err(e) = run_shell("make clean", work_dir, Duration::from_secs(60)).await {
			return Outcome::err(format!("make clean on destination failed: {e}"));
		}

		Outcome::ok("Preparation successful")
	}

	async fn compile_prog(&self, work_dir: &Path, prog: &Prog) -> Outcome {
		let command = format!("CFLAGS=\"-DDEBUG_NO_PRINTF\" make VERSIONS={prog}");
		match run_shell(&command, work_dir, Duration::from_secs(120)).await {
			Ok(finished) if finished.status == Some(0) => Outcome::ok(""),
			Ok(finished) => Outcome::err(finished.output),
			Err(e) => Outcome::err(format!("failed to run make: {e}")),
		}
	}

	async fn compile_test(&self, work_dir: &Path, _test: &Test) -> Outcome {
		match run_shell("./run_fuzzer.sh", work_dir, Self::FUZZ_GEN_TIMEOUT).await {
			Ok(finished) if finished.timed_out => {
				Outcome::err("Generating tests with ./run_fuzzer.sh timed out after 5 minutes".to_string())
			}
			Ok(finished) if finished.status == Some(0) => Outcome::ok(""),
			Ok(finished) => Outcome::err(finished.output),
			Err(e) => Outcome::err(format!("failed to run fuzzer: {e}")),
		}
	}

	async fn run_test(&self, _test: &Test, prog: &Prog, work_dir: &Path, use_poc: bool) -> (TestResult, String) {
		let command =
			if use_poc { format!("./run_tests.sh {prog} --use-poc") } else { format!("./run_tests.sh {prog}") };

		match run_shell(&command, work_dir, Self::TEST_TIMEOUT).await {
			Ok(finished) if finished.timed_out => (TestResult::Timeout, "Took longer than 30 seconds to run".to_string()),
			Ok(finished) if finished.status == Some(0) => (TestResult::NoBugsDetected, finished.output),
			// the exact AddressSanitizer exit codes; 134 is SIGABRT
			Ok(finished) if matches!(finished.status, Some(1) | Some(134)) => (TestResult::BugFound, finished.output),
			Ok(finished) => {
				(TestResult::UnexpectedReturnCode, format!("Exit code: {:?}\n{}", finished.status, finished.output))
			}
			Err(e) => (TestResult::UnexpectedReturnCode, format!("failed to run test: {e}")),
		}
	}

	fn num_tests(&self, _traces: &str) -> u32 {
		// not needed for this assignment kind, which does not use a suite-size term
		0
	}

	async fn detect_new_tests(&self, _new_submission: &Path, _old_submission: Option<&Path>) -> Vec<Test> {
		// fuzzers generate random tests every run regardless of source changes
		self.tests.clone()
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
			let command = format!(
				"diff -r {}/src/{prog} {}/src/{prog}",
				new_submission.display(),
				old_submission.display()
			);
			let identical = matches!(
				run_shell(&command, Path::new("/"), Duration::from_secs(30)).await,
				Ok(finished) if finished.status == Some(0)
			);
			if !identical {
				new_progs.push(prog.clone());
			}
		}
		new_progs
	}

	async fn prep_test_stage(&self, tester_dir: &Path, testee_dir: &Path, stage_dir: &Path) -> std::io::Result<()> {
		crate::fs_util::relink(&tester_dir.join("fuzzer"), &stage_dir.join("fuzzer")).await?;
		crate::fs_util::relink(&testee_dir.join("bin"), &stage_dir.join("bin")).await?;
		Ok(())
	}

	async fn progs_identical(&self, a: &Prog, b: &Prog, submission_dir: &Path) -> bool {
		let command = format!("diff -rw {a} {b}");
		matches!(
			run_shell(&command, &submission_dir.join("src"), Duration::from_secs(30)).await,
			Ok(finished) if finished.status == Some(0)
		)
	}

	async fn check_diff(&self, submission_dir: &Path, prog: &Prog) -> Outcome {
		let command = format!("diff -rw original {prog}");
		match run_shell(&command, &submission_dir.join("src"), Duration::from_secs(30)).await {
			Ok(finished) => diff_policy::check_diff_policy(&finished.output),
			Err(e) => Outcome::err(format!("failed to run diff: {e}")),
		}
	}

	async fn raw_diff(&self, submission_dir: &Path, prog: &Prog) -> String {
		let command = format!("diff -rw original {prog}");
		match run_shell(&command, &submission_dir.join("src"), Duration::from_secs(30)).await {
			Ok(finished) => finished.output,
			Err(e) => format!("failed to run diff: {e}"),
		}
	}

	fn normalize_test_score(&self, raw: f64, best_raw: f64, _suite_size: u32) -> f64 {
		if best_raw == 0.0 {
			return 0.0;
		}
		((raw / best_raw) * 2.5 * 100.0).round() / 100.0
	}

	fn normalize_prog_score(&self, raw: f64, best_raw: f64) -> f64 {
		if best_raw == 0.0 {
			return 0.0;
		}
		((raw / best_raw) * 2.5 * 100.0).round() / 100.0
	}
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
		write_file(&dir.path().join("src/original/prog.c"), "orig");
		write_file(&dir.path().join("src/include/common.h"), "header");
		write_file(&dir.path().join("src/mutant-1/prog.c"), "mutant");
		dir
	}

	#[test]
	fn lists_a_single_synthetic_test_and_sorted_progs() {
		let dir = fixture();
		let assignment = FuzzAssignment::new(dir.path()).unwrap();
		assert_eq!(assignment.tests(), &[Test::from("fuzzer")]);
		assert_eq!(assignment.progs(), &[Prog::from("mutant-1")]);
	}

	#[tokio::test]
	async fn detect_new_tests_is_always_the_full_list() {
		let dir = fixture();
		let assignment = FuzzAssignment::new(dir.path()).unwrap();
		let tests = assignment.detect_new_tests(dir.path(), Some(dir.path())).await;
		assert_eq!(tests, assignment.tests());
	}
}
