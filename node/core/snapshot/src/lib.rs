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

//! Reduces [`TournamentState`] to a per-submitter scoreboard, ported from
//! `original_source/tournament/state/tourney_snapshot.py`.

mod error;

pub use error::SnapshotError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tourney_config::paths::StateDir;
use tourney_node_core_adapter::AssignmentAdapter;
use tourney_node_core_state::TournamentState;
use tourney_primitives::{Prog, Submitter, Test};

/// A single submitter's reduced results within a [`Snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterResult {
	pub latest_submission_date: Option<DateTime<Utc>>,
	/// Bugs detected per test, summed over every testee and prog.
	pub tests: BTreeMap<Test, u32>,
	/// Tests evaded per prog, summed over every tester.
	pub progs: BTreeMap<Prog, u32>,
	pub average_tests_per_suite: f64,
	pub average_bugs_detected: f64,
	pub average_tests_evaded: f64,
	pub normalised_test_score: f64,
	pub normalised_prog_score: f64,
}

/// The published scoreboard: a reduced, write-only view of tournament
/// state regenerated after every successful submission and on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
	pub snapshot_date: DateTime<Utc>,
	pub time_to_process_last_submission_secs: u64,
	pub num_submitters: usize,
	pub results: BTreeMap<Submitter, SubmitterResult>,
	pub best_average_bugs_detected: f64,
	pub best_average_tests_evaded: f64,
}

impl Snapshot {
	/// Build a snapshot from the current tournament state, applying
	/// per-assignment normalization and the top-score re-normalization
	/// described in spec.md §4.6 step 4.
	pub fn build(
		state: &TournamentState,
		adapter: &dyn AssignmentAdapter,
		state_dir: &StateDir,
		report_time: DateTime<Utc>,
		time_to_process_last_submission_secs: u64,
	) -> Self {
		let valid_submitters = state.valid_submitters(state_dir);
		let mut results = BTreeMap::new();

		for submitter in state.submitters() {
			let Some(submitter_state) = state.submitter_state(submitter) else { continue };

			let average_tests_per_suite = if submitter_state.test_suite_sizes.is_empty() {
				1.0
			} else {
				let total: u32 = submitter_state.test_suite_sizes.values().sum();
				f64::from(total) / submitter_state.test_suite_sizes.len() as f64
			};

			let mut tests = BTreeMap::new();
			let mut total_bugs_detected = 0u32;
			for test in adapter.tests() {
				let count = state.bugs_detected(submitter, test, adapter.progs());
				tests.insert(test.clone(), count);
				total_bugs_detected += count;
			}
			let average_bugs_detected = total_bugs_detected as f64 / adapter.tests().len().max(1) as f64;

			let mut progs = BTreeMap::new();
			let mut total_tests_evaded = 0u32;
			for prog in adapter.progs() {
				let count = state.tests_evaded(submitter, prog, &valid_submitters);
				progs.insert(prog.clone(), count);
				total_tests_evaded += count;
			}
			let average_tests_evaded = total_tests_evaded as f64 / adapter.progs().len().max(1) as f64;

			results.insert(
				submitter.clone(),
				SubmitterResult {
					latest_submission_date: submitter_state.latest_submission,
					tests,
					progs,
					average_tests_per_suite,
					average_bugs_detected,
					average_tests_evaded,
					normalised_test_score: 0.0,
					normalised_prog_score: 0.0,
				},
			);
		}

		let best_average_bugs_detected =
			results.values().map(|r| r.average_bugs_detected).fold(0.0, f64::max);
		let best_average_tests_evaded =
			results.values().map(|r| r.average_tests_evaded).fold(0.0, f64::max);

		let mut snapshot = Snapshot {
			snapshot_date: report_time,
			time_to_process_last_submission_secs,
			num_submitters: valid_submitters.len(),
			results,
			best_average_bugs_detected,
			best_average_tests_evaded,
		};

		snapshot.compute_normalised_scores(adapter);
		snapshot
	}

	fn compute_normalised_scores(&mut self, adapter: &dyn AssignmentAdapter) {
		for result in self.results.values_mut() {
			result.normalised_test_score = adapter.normalize_test_score(
				result.average_bugs_detected,
				self.best_average_bugs_detected,
				result.average_tests_per_suite.round().max(1.0) as u32,
			);
			result.normalised_prog_score =
				adapter.normalize_prog_score(result.average_tests_evaded, self.best_average_tests_evaded);
		}

		// re-normalize so the top test score is exactly 2.5
		let top_test_score = self.results.values().map(|r| r.normalised_test_score).fold(0.0, f64::max);
		if top_test_score > 0.0 {
			let scale = 2.5 / top_test_score;
			for result in self.results.values_mut() {
				result.normalised_test_score = (result.normalised_test_score * scale * 100.0).round() / 100.0;
			}
		}
	}

	/// Write the snapshot JSON atomically, replacing the previously
	/// published one. When `with_timestamp` is set, also archive a copy
	/// under `snapshot_<timestamp>.json` for historical audit.
	pub fn write(&self, state_dir: &StateDir, with_timestamp: bool) -> Result<(), SnapshotError> {
		write_atomic(&state_dir.results_file(), self)?;
		if with_timestamp {
			write_atomic(&state_dir.get_snapshot_file_path(&self.snapshot_date), self)?;
		}
		Ok(())
	}

	pub fn load(path: &Path) -> Result<Self, SnapshotError> {
		let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
		serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse { path: path.to_path_buf(), source })
	}

	/// Write the per-student CSV export: test counts, prog counts, both
	/// normalized scores, their sum, and the sum rounded to the nearest 0.5.
	pub fn write_csv(&self, path: &Path, adapter: &dyn AssignmentAdapter) -> Result<(), SnapshotError> {
		let mut writer =
			csv::Writer::from_path(path).map_err(|source| SnapshotError::Csv { path: path.to_path_buf(), source })?;

		let mut header = vec!["Student".to_string()];
		header.extend(adapter.tests().iter().map(|t| t.to_string()));
		header.extend(adapter.progs().iter().map(|p| p.to_string()));
		header.push("normalised_test_score".to_string());
		header.push("normalised_prog_score".to_string());
		header.push("total".to_string());
		header.push("total_rounded_to_nearest_half".to_string());
		writer.write_record(&header).map_err(|source| SnapshotError::Csv { path: path.to_path_buf(), source })?;

		for (submitter, result) in &self.results {
			let total = result.normalised_test_score + result.normalised_prog_score;
			let total_rounded = (total * 2.0).round() / 2.0;

			let mut row = vec![submitter.to_string()];
			row.extend(adapter.tests().iter().map(|t| result.tests.get(t).copied().unwrap_or(0).to_string()));
			row.extend(adapter.progs().iter().map(|p| result.progs.get(p).copied().unwrap_or(0).to_string()));
			row.push(result.normalised_test_score.to_string());
			row.push(result.normalised_prog_score.to_string());
			row.push(total.to_string());
			row.push(total_rounded.to_string());
			writer.write_record(&row).map_err(|source| SnapshotError::Csv { path: path.to_path_buf(), source })?;
		}

		writer.flush().map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })
	}
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	std::fs::create_dir_all(dir).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
	let mut tmp =
		tempfile::NamedTempFile::new_in(dir).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
	let json = serde_json::to_string_pretty(value).expect("snapshot always serializes");
	tmp.write_all(json.as_bytes()).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
	tmp.persist(path).map_err(|e| SnapshotError::Io { path: path.to_path_buf(), source: e.error })?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use tourney_node_core_adapter::JunitAssignment;
	use tourney_primitives::TestResult;

	fn assignment_dir() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("tests/T1")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/original")).unwrap();
		std::fs::create_dir_all(dir.path().join("programs/P1")).unwrap();
		dir
	}

	#[test]
	fn best_scores_and_top_test_score_renormalized_to_2_5() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();

		let submitters = vec![Submitter::from("alice"), Submitter::from("bob")];
		let tests = vec![Test::from("T1")];
		let progs = vec![Prog::from("P1")];
		let mut state = TournamentState::new(&submitters, &tests, &progs);
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("T1"), &Prog::from("P1"), TestResult::BugFound);
		state.set_cell(&Submitter::from("bob"), &Submitter::from("alice"), &Test::from("T1"), &Prog::from("P1"), TestResult::BugFound);

		let state_dir_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_dir_root.path());
		std::fs::create_dir_all(state_dir.get_tourney_dir(&Submitter::from("alice"))).unwrap();
		std::fs::create_dir_all(state_dir.get_tourney_dir(&Submitter::from("bob"))).unwrap();

		let report_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let snapshot = Snapshot::build(&state, &adapter, &state_dir, report_time, 3);

		assert_eq!(snapshot.num_submitters, 2);
		assert_eq!(snapshot.best_average_bugs_detected, 1.0);
		let alice = &snapshot.results[&Submitter::from("alice")];
		assert_eq!(alice.normalised_test_score, 2.5);
	}

	#[test]
	fn write_then_load_round_trips() {
		let assg_dir = assignment_dir();
		let adapter = JunitAssignment::new(assg_dir.path()).unwrap();
		let submitters = vec![Submitter::from("alice")];
		let state = TournamentState::new(&submitters, &[], &[]);
		let state_dir_root = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(state_dir_root.path());

		let report_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let snapshot = Snapshot::build(&state, &adapter, &state_dir, report_time, 0);
		snapshot.write(&state_dir, false).unwrap();

		let reloaded = Snapshot::load(&state_dir.results_file()).unwrap();
		assert_eq!(reloaded.snapshot_date, report_time);
	}
}
