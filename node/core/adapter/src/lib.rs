// Copyright (C) The tourney Authors.
// This file is part of tourney.

// tourney is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// tourney is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with tourney.  If not, see <http://www.gnu.org/licenses/>.

//! The capability contract the tournament core depends on to compile,
//! diff and run submitter code, plus the two concrete implementations
//! ported from `original_source/tournament/config/assignments/{ant,fuzz}_assignment.py`.

mod diff_policy;
mod error;
mod fs_util;
mod fuzz;
mod junit;
mod process;

pub use error::AdapterError;
pub use fs_util::{copy_dir_all, remove_dir_if_exists};
pub use fuzz::FuzzAssignment;
pub use junit::JunitAssignment;

use async_trait::async_trait;
use std::path::Path;
use tourney_primitives::{Outcome, Prog, Test, TestResult};

/// Everything the scheduler and validator need from an assignment, in
/// terms of spec.md §4.1. External processes do the actual compiling and
/// testing; this trait only shapes how the core talks to them.
#[async_trait]
pub trait AssignmentAdapter: Send + Sync {
	/// The ordered list of tests in the assignment.
	fn tests(&self) -> &[Test];

	/// The ordered list of programs under test, excluding `original`.
	fn progs(&self) -> &[Prog];

	/// The assignment's name, derived from its source directory.
	fn name(&self) -> &str;

	/// The path to the reference source tree for this assignment.
	fn source_dir(&self) -> &Path;

	/// Copy the relevant files from `submission_dir` into `work_dir`, which
	/// is assumed to already be a copy of [`source_dir`](Self::source_dir).
	async fn prep_submission(&self, submission_dir: &Path, work_dir: &Path) -> Outcome;

	/// Compile a single prog. May be a no-op if the assignment's build
	/// system compiles lazily at test time.
	async fn compile_prog(&self, work_dir: &Path, prog: &Prog) -> Outcome;

	/// Compile a single test. May be a no-op for the same reason.
	async fn compile_test(&self, work_dir: &Path, test: &Test) -> Outcome;

	/// Run one (test, prog) pair, enforcing a per-invocation timeout.
	/// `use_poc` swaps in a submitter-supplied proof-of-concept input to
	/// deterministically confirm a bug exists.
	async fn run_test(&self, test: &Test, prog: &Prog, work_dir: &Path, use_poc: bool) -> (TestResult, String);

	/// Parse adapter-specific traces to count individual test cases run.
	fn num_tests(&self, traces: &str) -> u32;

	/// Tests that differ between `new_submission` and `old_submission`.
	/// The full list is returned if `old_submission` is `None`.
	async fn detect_new_tests(&self, new_submission: &Path, old_submission: Option<&Path>) -> Vec<Test>;

	/// Progs that differ between `new_submission` and `old_submission`.
	async fn detect_new_progs(&self, new_submission: &Path, old_submission: Option<&Path>) -> Vec<Prog>;

	/// Populate `stage_dir` with the tester's tests and the testee's progs.
	async fn prep_test_stage(&self, tester_dir: &Path, testee_dir: &Path, stage_dir: &Path) -> std::io::Result<()>;

	/// Whether two progs within the same submission are byte-identical.
	async fn progs_identical(&self, a: &Prog, b: &Prog, submission_dir: &Path) -> bool;

	/// Reject progs whose diff from `original` exceeds policy.
	async fn check_diff(&self, submission_dir: &Path, prog: &Prog) -> Outcome;

	/// The raw `diff -rw original <prog>` text, for the `get-diffs` CSV
	/// export. Unlike [`check_diff`](Self::check_diff) this never applies
	/// policy, so the CSV can list every prog regardless of verdict.
	async fn raw_diff(&self, submission_dir: &Path, prog: &Prog) -> String;

	/// Normalize a submitter's raw test score against the best in the
	/// tournament, scaled per spec.md §8's formula for this assignment.
	fn normalize_test_score(&self, raw: f64, best_raw: f64, suite_size: u32) -> f64;

	/// Normalize a submitter's raw prog score against the best in the
	/// tournament.
	fn normalize_prog_score(&self, raw: f64, best_raw: f64) -> f64;
}

pub(crate) fn assignment_name(source_dir: &Path) -> String {
	source_dir
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| source_dir.display().to_string())
}

/// Build the concrete adapter named by an `AssignmentConfig`'s
/// `assignment_type`. Kept in this crate rather than `tourney-config` to
/// avoid a dependency cycle: config only describes which adapter to build.
pub fn build_adapter(assignment_type: &str, source_assg_dir: &Path) -> Result<Box<dyn AssignmentAdapter>, AdapterError> {
	match assignment_type {
		"junit_assignment" => Ok(Box::new(JunitAssignment::new(source_assg_dir)?)),
		"fuzz_assignment" => Ok(Box::new(FuzzAssignment::new(source_assg_dir)?)),
		other => Err(AdapterError::UnknownAssignmentType(other.to_string())),
	}
}
