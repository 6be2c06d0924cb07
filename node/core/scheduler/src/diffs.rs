use crate::error::SchedulerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tourney_config::paths::StateDir;
use tourney_node_core_adapter::AssignmentAdapter;
use tourney_node_core_snapshot::Snapshot;
use tourney_node_core_state::TournamentState;
use tourney_primitives::{Prog, Submitter};

const INVALID_MARKERS: [&str; 6] = ["Y", "y", "True", "true", "X", "x"];
const VALID_MARKERS: [&str; 3] = ["N", "n", ""];

#[derive(Debug, Serialize)]
struct DiffRow {
	submitter: String,
	mutant: String,
	num_tests_evaded: u32,
	diff: String,
	#[serde(rename = "invalid?")]
	invalid: String,
}

#[derive(Debug, Deserialize)]
struct DiffRowIn {
	submitter: String,
	mutant: String,
	#[serde(rename = "invalid?")]
	invalid: String,
}

/// Export every valid submitter's prog diffs against `original`, one row
/// per `(submitter, prog)`, sorted by how many tests that prog evaded
/// (descending) so the most suspicious mutants surface first for manual
/// review. Ported from `processing/main.py::get_diffs`.
pub async fn get_diffs(state_dir: &StateDir, adapter: &dyn AssignmentAdapter) -> Result<usize, SchedulerError> {
	let results_path = state_dir.results_file();
	let snapshot = Snapshot::load(&results_path)?;

	let mut rows = Vec::new();
	for (submitter, result) in &snapshot.results {
		let submission_dir = state_dir.get_tourney_dir(submitter);
		if !submission_dir.is_dir() {
			continue;
		}
		for prog in adapter.progs() {
			let num_tests_evaded = result.progs.get(prog).copied().unwrap_or(0);
			let diff = adapter.raw_diff(&submission_dir, prog).await;
			rows.push(DiffRow { submitter: submitter.to_string(), mutant: prog.to_string(), num_tests_evaded, diff, invalid: String::new() });
		}
	}

	rows.sort_by(|a, b| b.num_tests_evaded.cmp(&a.num_tests_evaded));

	let diff_path = state_dir.diff_file();
	let mut writer = csv::Writer::from_path(&diff_path).map_err(|source| SchedulerError::Csv { path: diff_path.clone(), source })?;
	for row in &rows {
		writer.serialize(row).map_err(|source| SchedulerError::Csv { path: diff_path.clone(), source })?;
	}
	writer.flush().map_err(|source| SchedulerError::Io { path: diff_path, source })?;

	Ok(rows.len())
}

/// Read back an operator-annotated `submitter_prog_diffs.csv` and zero the
/// score of every prog marked invalid, via `TournamentState::invalidate_prog`,
/// then republish the snapshot. Ported from
/// `processing/main.py::rescore_invalid_progs`.
pub async fn rescore_invalid_progs(
	state_dir: &StateDir,
	adapter: &dyn AssignmentAdapter,
	approved: &[Submitter],
	now: DateTime<Utc>,
) -> Result<usize, SchedulerError> {
	let diff_path = state_dir.diff_file();
	let mut reader = csv::Reader::from_path(&diff_path).map_err(|source| SchedulerError::Csv { path: diff_path.clone(), source })?;

	let mut state = TournamentState::load(state_dir, approved, adapter.tests(), adapter.progs())?;
	let mut num_invalid = 0;

	for record in reader.deserialize() {
		let row: DiffRowIn = record.map_err(|source| SchedulerError::Csv { path: diff_path.clone(), source })?;
		if INVALID_MARKERS.contains(&row.invalid.as_str()) {
			state.invalidate_prog(&Submitter::from(row.submitter.as_str()), &Prog::from(row.mutant.as_str()));
			num_invalid += 1;
		} else if !VALID_MARKERS.contains(&row.invalid.as_str()) {
			return Err(SchedulerError::UnrecognisedInvalidMarker { value: row.invalid, submitter: row.submitter, prog: row.mutant });
		}
	}

	state.save(state_dir)?;
	Snapshot::build(&state, adapter, state_dir, now, 0).write(state_dir, false)?;
	Ok(num_invalid)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use tourney_node_core_adapter::JunitAssignment;
	use tourney_primitives::{Test, TestResult};

	fn assignment_dir() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("tests/T1")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/original")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/p1")).unwrap();
		dir
	}

	#[tokio::test]
	async fn get_diffs_sorts_by_tests_evaded_descending() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let submitters = vec![Submitter::from("alice"), Submitter::from("bob")];
		let tests = vec![Test::from("T1")];
		let progs = vec![Prog::from("p1")];

		let mut state = TournamentState::new(&submitters, &tests, &progs);
		// bob's p1 evades alice's T1 (NoBugsDetected == evasion); alice's p1 is caught.
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("T1"), &Prog::from("p1"), TestResult::NoBugsDetected);
		state.set_cell(&Submitter::from("bob"), &Submitter::from("alice"), &Test::from("T1"), &Prog::from("p1"), TestResult::BugFound);

		let state_dir_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_dir_root.path());
		std::fs::create_dir_all(state_dir.get_tourney_dir(&Submitter::from("alice"))).unwrap();
		std::fs::create_dir_all(state_dir.get_tourney_dir(&Submitter::from("bob"))).unwrap();

		let report_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let snapshot = Snapshot::build(&state, &adapter, &state_dir, report_time, 0);
		snapshot.write(&state_dir, false).unwrap();

		let num_rows = get_diffs(&state_dir, &adapter).await.unwrap();
		assert_eq!(num_rows, 2);

		let mut reader = csv::Reader::from_path(state_dir.diff_file()).unwrap();
		let records: Vec<DiffRowIn> = reader.deserialize().map(|r| r.unwrap()).collect();
		assert_eq!(records[0].submitter, "bob", "bob's prog evaded a test, so it must sort first");
	}

	#[tokio::test]
	async fn rescore_invalid_progs_zeroes_flagged_mutants() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let submitters = vec![Submitter::from("alice"), Submitter::from("bob")];
		let tests = vec![Test::from("T1")];
		let progs = vec![Prog::from("p1")];

		let mut state = TournamentState::new(&submitters, &tests, &progs);
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("T1"), &Prog::from("p1"), TestResult::NoBugsDetected);

		let state_dir_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_dir_root.path());
		state.save(&state_dir).unwrap();

		let mut writer = csv::Writer::from_path(state_dir.diff_file()).unwrap();
		writer.write_record(["submitter", "mutant", "num_tests_evaded", "diff", "invalid?"]).unwrap();
		writer.write_record(["bob", "p1", "1", "some diff", "Y"]).unwrap();
		writer.flush().unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
		let num_invalid = rescore_invalid_progs(&state_dir, &adapter, &submitters, now).await.unwrap();
		assert_eq!(num_invalid, 1);

		let reloaded = TournamentState::load(&state_dir, &submitters, &tests, &progs).unwrap();
		assert_eq!(
			reloaded.get(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("T1"), &Prog::from("p1")),
			TestResult::BugFound
		);
	}

	#[tokio::test]
	async fn unrecognised_marker_is_rejected() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let submitters = vec![Submitter::from("alice")];

		let state_dir_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_dir_root.path());
		TournamentState::new(&submitters, &[], &[]).save(&state_dir).unwrap();

		let mut writer = csv::Writer::from_path(state_dir.diff_file()).unwrap();
		writer.write_record(["submitter", "mutant", "num_tests_evaded", "diff", "invalid?"]).unwrap();
		writer.write_record(["alice", "p1", "0", "diff", "maybe"]).unwrap();
		writer.flush().unwrap();

		let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
		let err = rescore_invalid_progs(&state_dir, &adapter, &submitters, now).await.unwrap_err();
		assert!(matches!(err, SchedulerError::UnrecognisedInvalidMarker { .. }));
	}
}
