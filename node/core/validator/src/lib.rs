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

//! The five-stage submission validation pipeline, ported from
//! `original_source/tournament/submission.py` and
//! `submission_validation.py`. Each stage is a standalone `async fn`
//! invoked from a distinct CI step; stage ordering is enforced by the
//! flags in `tourney-node-core-flags`, not by in-process state, since in
//! production each stage runs as a separate process invocation.

mod error;

pub use error::ValidationError;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tourney_config::paths::StateDir;
use tourney_config::ApprovedSubmitters;
use tourney_node_core_adapter::{copy_dir_all, remove_dir_if_exists, AssignmentAdapter};
use tourney_node_core_flags::{get_flag, set_flag, SubmissionFlag, TourneyFlag};
use tourney_primitives::{Prog, Submitter, TestResult};

const LOG_TARGET: &str = "validator";
const STALE_SUBMISSION_SECS: i64 = 15 * 60;
const SIZE_CAP_BYTES: u64 = 150 * 1000 * 1000;

/// The submitter's working copy during validation, at
/// `submissions/pre_validation/<submitter>`. Kept as a distinct type from
/// the queue's `staged/` directories so call sites can't confuse the two
/// "staging" concepts the original conflates.
#[derive(Debug, Clone)]
pub struct StagingDir(PathBuf);

impl StagingDir {
	pub fn for_submitter(state_dir: &StateDir, submitter: &Submitter) -> Self {
		Self(state_dir.get_pre_validation_dir(submitter))
	}

	pub fn path(&self) -> &Path {
		&self.0
	}

	fn exists(&self) -> bool {
		self.0.is_dir()
	}
}

/// Stage 1: CHECK_ELIG. Rejects if the daemon is offline, the assignment
/// name doesn't match, the submitter isn't approved, or a still-fresh
/// prior submission is mid-validation. On success, seeds the staging
/// directory with a clean copy of the reference tree and the submitter's
/// files, then sets `ELIG`.
pub async fn check_eligibility(
	state_dir: &StateDir,
	approved: &ApprovedSubmitters,
	adapter: &dyn AssignmentAdapter,
	submitted_assg_name: &str,
	submitter_or_id: &str,
	submission_dir: &Path,
	now: DateTime<Utc>,
) -> Result<Submitter, ValidationError> {
	if !get_flag(state_dir.root(), &TourneyFlag::Alive).success {
		return Err(ValidationError::NotAlive);
	}
	if submitted_assg_name != adapter.name() {
		return Err(ValidationError::AssignmentMismatch {
			submitted: submitted_assg_name.to_string(),
			configured: adapter.name().to_string(),
		});
	}
	let submitter = approved
		.resolve(submitter_or_id)
		.ok_or_else(|| ValidationError::UnknownSubmitter(submitter_or_id.to_string()))?;

	let staging = StagingDir::for_submitter(state_dir, &submitter);
	if staging.exists() {
		let age_secs = dir_age_secs(staging.path(), now)?;
		if age_secs < STALE_SUBMISSION_SECS {
			return Err(ValidationError::SubmissionInFlight { remaining_secs: STALE_SUBMISSION_SECS - age_secs });
		}
		// a prior submission that never finished validating; safe to discard
		remove_dir_if_exists(staging.path()).await.map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;
	}

	copy_dir_all(adapter.source_dir(), staging.path())
		.await
		.map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;

	let outcome = adapter.prep_submission(submission_dir, staging.path()).await;
	if !outcome.success {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::PreparationFailed(outcome.traces));
	}

	set_flag(staging.path(), &SubmissionFlag::Elig, true, "").map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;
	tracing::info!(target: LOG_TARGET, %submitter, "submitter is eligible");
	Ok(submitter)
}

/// Stage 2: COMPILE. Compiles `original`, every prog and every test,
/// aggregating traces the way `Outcome`'s `Add` impl concatenates them in
/// the original's `Result += other` chaining.
pub async fn compile(state_dir: &StateDir, adapter: &dyn AssignmentAdapter, submitter: &Submitter) -> Result<(), ValidationError> {
	let staging = StagingDir::for_submitter(state_dir, submitter);
	require_staged(&staging, SubmissionFlag::Elig, "CHECK_ELIG")?;
	clear_own_flag(&staging, SubmissionFlag::Compiled)?;

	let mut success = true;
	let mut traces = String::from("Compiling programs:");
	let original = Prog::from("original");
	for prog in std::iter::once(&original).chain(adapter.progs()) {
		let result = adapter.compile_prog(staging.path(), prog).await;
		success &= result.success;
		traces.push_str(&format!(
			"\n\t{prog} compilation {}",
			if result.success { "SUCCESS".to_string() } else { format!("FAILED.\n{}", result.traces) }
		));
	}

	traces.push_str("\n\nCompiling tests:");
	for test in adapter.tests() {
		let result = adapter.compile_test(staging.path(), test).await;
		success &= result.success;
		traces.push_str(&format!(
			"\n\t{test} compilation {}",
			if result.success { "SUCCESS".to_string() } else { format!("FAILED.\n{}", result.traces) }
		));
	}

	if !success {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::CompilationFailed(traces));
	}

	set_flag(staging.path(), &SubmissionFlag::Compiled, true, "").map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;
	Ok(())
}

/// Stage 3: VALIDATE_TESTS. Every test must report `NoBugsDetected`
/// against `original`. Persists `num_tests.json` on success for the
/// scheduler to fold into `TournamentState`'s suite-size bookkeeping.
pub async fn validate_tests(state_dir: &StateDir, adapter: &dyn AssignmentAdapter, submitter: &Submitter) -> Result<(), ValidationError> {
	let staging = StagingDir::for_submitter(state_dir, submitter);
	require_staged(&staging, SubmissionFlag::Compiled, "COMPILE")?;
	clear_own_flag(&staging, SubmissionFlag::TestsValid)?;

	let original = Prog::from("original");
	let mut num_tests = BTreeMap::new();
	let mut traces = String::from("Validation results:");
	let mut valid = true;

	for test in adapter.tests() {
		let (result, test_traces) = adapter.run_test(test, &original, staging.path(), false).await;
		traces.push_str(&format!("\n\t{test} test {}", describe_test_validation(result, &test_traces)));
		if result != TestResult::NoBugsDetected {
			valid = false;
			continue;
		}
		num_tests.insert(test.as_str().to_string(), adapter.num_tests(&test_traces));
	}

	if !valid {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::TestValidationFailed(traces));
	}

	let num_tests_path = staging.path().join(state_dir.num_tests_file_name());
	let json = serde_json::to_string_pretty(&num_tests).map_err(|source| ValidationError::SerializeNumTests { path: num_tests_path.clone(), source })?;
	tokio::fs::write(&num_tests_path, json).await.map_err(|source| ValidationError::Io { path: num_tests_path, source })?;

	set_flag(staging.path(), &SubmissionFlag::TestsValid, true, "").map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;
	Ok(())
}

/// Stage 4: VALIDATE_PROGS. Each prog must be unique within the
/// submission and, tested with a proof-of-concept input (`use_poc=true`),
/// every test must report `BugFound` against it.
pub async fn validate_progs(state_dir: &StateDir, adapter: &dyn AssignmentAdapter, submitter: &Submitter) -> Result<(), ValidationError> {
	let staging = StagingDir::for_submitter(state_dir, submitter);
	require_staged(&staging, SubmissionFlag::TestsValid, "VALIDATE_TESTS")?;
	clear_own_flag(&staging, SubmissionFlag::ProgsValid)?;

	let mut traces = String::from("Validation results:");
	let mut valid = true;
	let mut seen: Vec<&Prog> = Vec::new();

	for prog in adapter.progs() {
		let mut duplicate = None;
		for earlier in &seen {
			if adapter.progs_identical(prog, earlier, staging.path()).await {
				duplicate = Some((*earlier).clone());
				break;
			}
		}
		if let Some(earlier) = duplicate {
			traces.push_str(&format!("\n\t{prog} FAIL - identical to previously submitted prog '{earlier}'"));
			valid = false;
			continue;
		}
		seen.push(prog);

		for test in adapter.tests() {
			let (result, test_traces) = adapter.run_test(test, prog, staging.path(), true).await;
			traces.push_str(&format!("\n\t{prog} {test} test {}", describe_prog_validation(result, &test_traces)));
			if result != TestResult::BugFound {
				valid = false;
			}
		}
	}

	if !valid {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::ProgValidationFailed(traces));
	}

	set_flag(staging.path(), &SubmissionFlag::ProgsValid, true, "").map_err(|source| ValidationError::Io { path: staging.0.clone(), source })?;
	Ok(())
}

/// Stage 5: SUBMIT. Re-checks the submission window, enforces the 150 MiB
/// size cap, then enqueues the submission via
/// [`tourney_node_core_queue::enqueue_submission`], which renames the
/// staging dir into the queue and only then creates `SUBMISSION_READY` —
/// so the scheduler never observes a half-moved submission.
pub async fn submit(
	state_dir: &StateDir,
	approved: &ApprovedSubmitters,
	submitter: &Submitter,
	now: DateTime<Utc>,
) -> Result<PathBuf, ValidationError> {
	let staging = StagingDir::for_submitter(state_dir, submitter);
	require_staged(&staging, SubmissionFlag::ProgsValid, "VALIDATE_PROGS")?;

	let window = approved.window_for(submitter, now);
	if !window.may_submit() {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::SubmissionWindowClosed(tourney_primitives::format_trace(&now)));
	}

	if let Err((size_description, breakdown)) = check_size_cap(staging.path()).await {
		remove_dir_if_exists(staging.path()).await.ok();
		return Err(ValidationError::SizeLimitExceeded { size_description, breakdown });
	}

	let staged_path = tourney_node_core_queue::enqueue_submission(state_dir, submitter, staging.path(), now).await?;
	tracing::info!(target: LOG_TARGET, %submitter, "submission accepted");
	Ok(staged_path)
}

fn require_staged(staging: &StagingDir, required: SubmissionFlag, stage_name: &'static str) -> Result<(), ValidationError> {
	if !staging.exists() {
		return Err(ValidationError::StagingDirMissing);
	}
	if !get_flag(staging.path(), &required).success {
		return Err(ValidationError::StagePrecondition { stage: stage_name });
	}
	Ok(())
}

fn clear_own_flag(staging: &StagingDir, flag: SubmissionFlag) -> Result<(), ValidationError> {
	set_flag(staging.path(), &flag, false, "").map_err(|source| ValidationError::Io { path: staging.0.clone(), source })
}

fn dir_age_secs(path: &Path, now: DateTime<Utc>) -> Result<i64, ValidationError> {
	let metadata = std::fs::metadata(path).map_err(|source| ValidationError::Io { path: path.to_path_buf(), source })?;
	let modified = metadata.modified().map_err(|source| ValidationError::Io { path: path.to_path_buf(), source })?;
	let modified: DateTime<Utc> = modified.into();
	Ok((now - modified).num_seconds())
}

/// Recursively measure `dir`'s size; if over the cap, also build a
/// breakdown of its top-level subdirectories by size, matching the
/// original's `du -d 2` diagnostic.
async fn check_size_cap(dir: &Path) -> Result<(), (String, String)> {
	let dir = dir.to_path_buf();
	tokio::task::spawn_blocking(move || {
		let total = dir_size(&dir);
		if total <= SIZE_CAP_BYTES {
			return Ok(());
		}

		let mut subdir_sizes: Vec<(String, u64)> = Vec::new();
		if let Ok(entries) = std::fs::read_dir(&dir) {
			for entry in entries.filter_map(|e| e.ok()) {
				if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
					subdir_sizes.push((entry.file_name().to_string_lossy().into_owned(), dir_size(&entry.path())));
				}
			}
		}
		subdir_sizes.sort_by(|a, b| b.1.cmp(&a.1));
		subdir_sizes.truncate(10);
		let breakdown = subdir_sizes.iter().map(|(name, size)| format!("{size:>12}  {name}")).collect::<Vec<_>>().join("\n");

		Err((format!("{:.1}MB", total as f64 / 1_000_000.0), breakdown))
	})
	.await
	.expect("size cap check task panicked")
}

fn dir_size(dir: &Path) -> u64 {
	walkdir::WalkDir::new(dir)
		.into_iter()
		.filter_map(|e| e.ok())
		.filter(|e| e.file_type().is_file())
		.filter_map(|e| e.metadata().ok())
		.map(|m| m.len())
		.sum()
}

fn describe_test_validation(result: TestResult, traces: &str) -> String {
	match result {
		TestResult::Timeout => "FAIL    - Timeout when run against original program".to_string(),
		TestResult::NoBugsDetected => "SUCCESS - No bugs detected in original program".to_string(),
		TestResult::BugFound => format!("FAIL    - Test falsely reports error in original code\n{traces}"),
		TestResult::UnexpectedReturnCode => format!("FAIL    - Unrecognised return code found\n{traces}"),
		other => format!("ERROR   - unexpected test result: {other}"),
	}
}

fn describe_prog_validation(result: TestResult, traces: &str) -> String {
	match result {
		TestResult::Timeout => "FAIL    - Timeout".to_string(),
		TestResult::NoBugsDetected => "FAIL    - Test suite does not detect error".to_string(),
		TestResult::BugFound => "SUCCESS - Test suite detects error".to_string(),
		TestResult::UnexpectedReturnCode => format!("FAIL    - Unrecognised return code found\n{traces}"),
		other => format!("ERROR   - unexpected test result: {other}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use tourney_config::SubmitterEntry;
	use tourney_node_core_adapter::JunitAssignment;

	fn assignment_dir() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("tests/T1")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/original")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/P1")).unwrap();
		dir
	}

	fn approved(submitter: &str) -> ApprovedSubmitters {
		let mut submitters = BTreeMap::new();
		submitters.insert(submitter.to_string(), SubmitterEntry { student_id: None, extension_granted: false });
		ApprovedSubmitters {
			submission_deadline: DateTime::<Utc>::MAX_UTC,
			submission_extensions_deadline: DateTime::<Utc>::MAX_UTC,
			submitters,
		}
	}

	#[tokio::test]
	async fn check_eligibility_rejects_when_daemon_offline() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let state_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_root.path());
		let approved = approved("alice");
		let submission_dir = tempfile::tempdir().unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let err = check_eligibility(&state_dir, &approved, &adapter, adapter.name(), "alice", submission_dir.path(), now)
			.await
			.unwrap_err();
		assert!(matches!(err, ValidationError::NotAlive));
	}

	#[tokio::test]
	async fn check_eligibility_rejects_unknown_assignment_name() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let state_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_root.path());
		set_flag(state_dir.root(), &TourneyFlag::Alive, true, "").unwrap();
		let approved = approved("alice");
		let submission_dir = tempfile::tempdir().unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let err = check_eligibility(&state_dir, &approved, &adapter, "not-the-assignment", "alice", submission_dir.path(), now)
			.await
			.unwrap_err();
		assert!(matches!(err, ValidationError::AssignmentMismatch { .. }));
	}

	#[tokio::test]
	async fn check_eligibility_succeeds_and_seeds_staging_dir() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let state_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_root.path());
		set_flag(state_dir.root(), &TourneyFlag::Alive, true, "").unwrap();
		let approved = approved("alice");

		let submission_dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(submission_dir.path().join("tests/T1")).unwrap();
		std::fs::create_dir_all(submission_dir.path().join("programs/P1")).unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let submitter = check_eligibility(&state_dir, &approved, &adapter, adapter.name(), "alice", submission_dir.path(), now)
			.await
			.unwrap();
		assert_eq!(submitter, Submitter::from("alice"));

		let staging = StagingDir::for_submitter(&state_dir, &submitter);
		assert!(get_flag(staging.path(), &SubmissionFlag::Elig).success);
		assert!(staging.path().join("tests/T1").is_dir());
	}

	#[tokio::test]
	async fn compile_requires_elig_flag_first() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let state_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_root.path());
		let submitter = Submitter::from("alice");

		let err = compile(&state_dir, &adapter, &submitter).await.unwrap_err();
		assert!(matches!(err, ValidationError::StagingDirMissing));
	}

	#[tokio::test]
	async fn submit_rejects_when_window_closed() {
		let state_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_root.path());
		let submitter = Submitter::from("alice");
		let staging = StagingDir::for_submitter(&state_dir, &submitter);
		tokio::fs::create_dir_all(staging.path()).await.unwrap();
		set_flag(staging.path(), &SubmissionFlag::ProgsValid, true, "").unwrap();

		let mut approved = approved("alice");
		approved.submission_deadline = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
		approved.submission_extensions_deadline = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let err = submit(&state_dir, &approved, &submitter, now).await.unwrap_err();
		assert!(matches!(err, ValidationError::SubmissionWindowClosed(_)));
	}
}
