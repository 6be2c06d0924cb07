use crate::error::SchedulerError;
use crate::scratch::ScratchPool;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tourney_config::paths::StateDir;
use tourney_node_core_adapter::AssignmentAdapter;
use tourney_node_core_state::TournamentState;
use tourney_primitives::{Prog, Submitter, Test, TestSet};

const LOG_TARGET: &str = "scheduler::processing";

/// Run one (tester, testee) head-to-head pass: re-run a `(test, prog)` cell
/// iff `test` is in `new_tests` or `prog` is in `new_progs`, else copy the
/// prior value forward unchanged. Grounded on
/// `processing/main.py::run_tests`.
async fn run_tests_for_pair(
	pool: Arc<ScratchPool>,
	adapter: Arc<dyn AssignmentAdapter>,
	tester_dir: std::path::PathBuf,
	testee_dir: std::path::PathBuf,
	tester: Submitter,
	testee: Submitter,
	new_tests: Vec<Test>,
	new_progs: Vec<Prog>,
	prior: Arc<TournamentState>,
) -> Result<(Submitter, Submitter, TestSet), SchedulerError> {
	let guard = pool.acquire(adapter.as_ref()).await.map_err(|source| SchedulerError::Io { path: tester_dir.clone(), source })?;
	adapter
		.prep_test_stage(&tester_dir, &testee_dir, guard.path())
		.await
		.map_err(|source| SchedulerError::Io { path: guard.path().to_path_buf(), source })?;

	let mut test_set = TestSet::new();
	for test in adapter.tests() {
		let mut progs = BTreeMap::new();
		for prog in adapter.progs() {
			let result = if new_tests.contains(test) || new_progs.contains(prog) {
				let (result, _traces) = adapter.run_test(test, prog, guard.path(), false).await;
				tracing::debug!(target: LOG_TARGET, %tester, %testee, %test, %prog, %result, "ran head-to-head pair");
				result
			} else {
				prior.get(&tester, &testee, test, prog)
			};
			progs.insert(prog.clone(), result);
		}
		test_set.insert(test.clone(), progs);
	}

	Ok((tester, testee, test_set))
}

/// Dispatch every other submitter's head-to-head jobs for `submitter`'s new
/// submission across the scratch-dir worker pool, merging results back into
/// `state` as they complete. Grounded on
/// `processing/main.py::run_submission`'s two `pool.map` calls, collapsed
/// into a single `JoinSet` since nothing distinguishes a "new tests" job
/// from a "new progs" job once they're just async tasks sharing the pool.
pub async fn run_submission(
	state_dir: &StateDir,
	adapter: Arc<dyn AssignmentAdapter>,
	pool: Arc<ScratchPool>,
	state: &mut TournamentState,
	submitter: &Submitter,
	new_tests: Vec<Test>,
	new_progs: Vec<Prog>,
) -> Result<(), SchedulerError> {
	let other_submitters: Vec<Submitter> =
		state.valid_submitters(state_dir).into_iter().filter(|other| other != submitter).collect();
	let prior = Arc::new(state.clone());
	let submitter_dir = state_dir.get_tourney_dir(submitter);

	let mut jobs = JoinSet::new();
	for other in &other_submitters {
		let other_dir = state_dir.get_tourney_dir(other);

		jobs.spawn(run_tests_for_pair(
			pool.clone(),
			adapter.clone(),
			submitter_dir.clone(),
			other_dir.clone(),
			submitter.clone(),
			other.clone(),
			new_tests.clone(),
			Vec::new(),
			prior.clone(),
		));
		jobs.spawn(run_tests_for_pair(
			pool.clone(),
			adapter.clone(),
			other_dir,
			submitter_dir.clone(),
			other.clone(),
			submitter.clone(),
			Vec::new(),
			new_progs.clone(),
			prior.clone(),
		));
	}

	while let Some(outcome) = jobs.join_next().await {
		let (tester, testee, test_set) = outcome.map_err(|e| SchedulerError::WorkerPanicked(e.to_string()))??;
		state.set(&tester, &testee, test_set);
	}

	Ok(())
}

/// Absorb one staged submission: detect what changed against the submitter's
/// previous one, swap it into place, re-run the affected head-to-head
/// cells, and persist state. Returns the head-to-head run's wall-clock time
/// in seconds, for the next snapshot's `time_to_process_last_submission_secs`.
pub async fn process_submission(
	state_dir: &StateDir,
	adapter: Arc<dyn AssignmentAdapter>,
	pool: Arc<ScratchPool>,
	state: &mut TournamentState,
	submitter: &Submitter,
	submitted_at: DateTime<Utc>,
	staged_dir: &Path,
) -> Result<u64, SchedulerError> {
	let tourney_dest = state_dir.get_tourney_dir(submitter);
	let old_submission = tourney_dest.is_dir().then(|| tourney_dest.clone());

	let new_tests = adapter.detect_new_tests(staged_dir, old_submission.as_deref()).await;
	let new_progs = adapter.detect_new_progs(staged_dir, old_submission.as_deref()).await;

	tourney_node_core_adapter::remove_dir_if_exists(&tourney_dest)
		.await
		.map_err(|source| SchedulerError::Io { path: tourney_dest.clone(), source })?;
	tokio::fs::rename(staged_dir, &tourney_dest)
		.await
		.map_err(|source| SchedulerError::Io { path: tourney_dest.clone(), source })?;

	let start = std::time::Instant::now();

	state.set_time_of_submission(submitter, submitted_at);
	state.set_test_suite_sizes(submitter, read_num_tests(state_dir, submitter).await?);

	run_submission(state_dir, adapter, pool, state, submitter, new_tests, new_progs).await?;

	state.save(state_dir)?;
	Ok(start.elapsed().as_secs())
}

async fn read_num_tests(state_dir: &StateDir, submitter: &Submitter) -> Result<BTreeMap<Test, u32>, SchedulerError> {
	let path = state_dir.get_tourney_dir(submitter).join(state_dir.num_tests_file_name());
	let contents = match tokio::fs::read_to_string(&path).await {
		Ok(contents) => contents,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
		Err(source) => return Err(SchedulerError::Io { path, source }),
	};
	serde_json::from_str(&contents).map_err(|source| SchedulerError::Json { path, source })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scratch::ScratchPool;
	use async_trait::async_trait;
	use tourney_primitives::{Outcome, TestResult};

	/// A deterministic stand-in for a real assignment: `run_test` always
	/// reports `BugFound`, so a recomputed cell is distinguishable from one
	/// whose prior (different) value was merely carried forward.
	struct FakeAdapter {
		source_dir: std::path::PathBuf,
		tests: Vec<Test>,
		progs: Vec<Prog>,
	}

	#[async_trait]
	impl AssignmentAdapter for FakeAdapter {
		fn tests(&self) -> &[Test] {
			&self.tests
		}
		fn progs(&self) -> &[Prog] {
			&self.progs
		}
		fn name(&self) -> &str {
			"fake"
		}
		fn source_dir(&self) -> &Path {
			&self.source_dir
		}
		async fn prep_submission(&self, _submission_dir: &Path, _work_dir: &Path) -> Outcome {
			Outcome::ok("")
		}
		async fn compile_prog(&self, _work_dir: &Path, _prog: &Prog) -> Outcome {
			Outcome::ok("")
		}
		async fn compile_test(&self, _work_dir: &Path, _test: &Test) -> Outcome {
			Outcome::ok("")
		}
		async fn run_test(&self, _test: &Test, _prog: &Prog, _work_dir: &Path, _use_poc: bool) -> (TestResult, String) {
			(TestResult::BugFound, String::new())
		}
		fn num_tests(&self, _traces: &str) -> u32 {
			0
		}
		async fn detect_new_tests(&self, _new_submission: &Path, _old_submission: Option<&Path>) -> Vec<Test> {
			self.tests.clone()
		}
		async fn detect_new_progs(&self, _new_submission: &Path, _old_submission: Option<&Path>) -> Vec<Prog> {
			self.progs.clone()
		}
		async fn prep_test_stage(&self, _tester_dir: &Path, _testee_dir: &Path, _stage_dir: &Path) -> std::io::Result<()> {
			Ok(())
		}
		async fn progs_identical(&self, _a: &Prog, _b: &Prog, _submission_dir: &Path) -> bool {
			false
		}
		async fn check_diff(&self, _submission_dir: &Path, _prog: &Prog) -> Outcome {
			Outcome::ok("")
		}
		async fn raw_diff(&self, _submission_dir: &Path, _prog: &Prog) -> String {
			String::new()
		}
		fn normalize_test_score(&self, _raw: f64, _best_raw: f64, _suite_size: u32) -> f64 {
			0.0
		}
		fn normalize_prog_score(&self, _raw: f64, _best_raw: f64) -> f64 {
			0.0
		}
	}

	#[tokio::test]
	async fn only_cells_touching_the_new_set_are_recomputed() {
		let source_dir = tempfile::tempdir().unwrap();
		let adapter: Arc<dyn AssignmentAdapter> = Arc::new(FakeAdapter {
			source_dir: source_dir.path().to_path_buf(),
			tests: vec![Test::from("t1"), Test::from("t2")],
			progs: vec![Prog::from("p1")],
		});

		let submitters = vec![Submitter::from("alice"), Submitter::from("bob")];
		let mut state = TournamentState::new(&submitters, adapter.tests(), adapter.progs());
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"), TestResult::NoBugsDetected);
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t2"), &Prog::from("p1"), TestResult::NoBugsDetected);
		let prior = Arc::new(state);

		let scratch_root = tempfile::tempdir().unwrap();
		let pool = ScratchPool::new(scratch_root.path().to_path_buf(), 1);

		let (_, _, test_set) = run_tests_for_pair(
			pool,
			adapter,
			source_dir.path().to_path_buf(),
			source_dir.path().to_path_buf(),
			Submitter::from("alice"),
			Submitter::from("bob"),
			vec![Test::from("t1")],
			vec![],
			prior,
		)
		.await
		.unwrap();

		assert_eq!(test_set[&Test::from("t1")][&Prog::from("p1")], TestResult::BugFound, "t1 is new, so it must be rerun");
		assert_eq!(
			test_set[&Test::from("t2")][&Prog::from("p1")],
			TestResult::NoBugsDetected,
			"t2 is unaffected, so its prior value must be carried forward"
		);
	}
}
