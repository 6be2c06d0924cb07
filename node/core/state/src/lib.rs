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

//! The central tournament state matrix, ported from
//! `original_source/tournament/state/tourney_state.py`: a
//! `state[tester][testee][test][prog] -> TestResult` mapping plus
//! per-submitter metadata, persisted as JSON and reloaded across daemon
//! restarts.

mod error;

pub use error::StateError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tourney_config::paths::StateDir;
use tourney_primitives::{default_testset, Prog, Submitter, Test, TestResult, TestSet};

const LOG_TARGET: &str = "state";

/// Per-submitter metadata and results, keyed by testee within `results`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitterState {
	pub latest_submission: Option<DateTime<Utc>>,
	pub test_suite_sizes: BTreeMap<Test, u32>,
	pub results: BTreeMap<Submitter, TestSet>,
}

/// The tournament's full state: every approved submitter's metadata and
/// its `TestSet` against every other approved submitter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TournamentState {
	submitters: BTreeMap<Submitter, SubmitterState>,
}

impl TournamentState {
	/// Build fresh state for `approved`, with every (tester, testee) pair
	/// other than the diagonal populated with a `NOT_TESTED` test set.
	pub fn new(approved: &[Submitter], tests: &[Test], progs: &[Prog]) -> Self {
		let mut submitters = BTreeMap::new();
		for tester in approved {
			let mut results = BTreeMap::new();
			for testee in approved {
				if tester != testee {
					results.insert(testee.clone(), default_testset(tests, progs));
				}
			}
			submitters.insert(tester.clone(), SubmitterState { latest_submission: None, test_suite_sizes: BTreeMap::new(), results });
		}
		Self { submitters }
	}

	/// Load state from disk if present, reconciling it against the current
	/// approved-submitter list and test/prog lists: submitters who were
	/// previously untracked (or whose opponent was) get a fresh default
	/// test set instead of a missing entry, exactly as
	/// `initialise_state_from_file` does.
	pub fn load(state_dir: &StateDir, approved: &[Submitter], tests: &[Test], progs: &[Prog]) -> Result<Self, StateError> {
		let path = state_dir.tourney_state_file();
		if !path.exists() {
			return Ok(Self::new(approved, tests, progs));
		}

		let contents =
			std::fs::read_to_string(&path).map_err(|source| StateError::Io { path: path.clone(), source })?;
		let from_file: TournamentState =
			serde_json::from_str(&contents).map_err(|source| StateError::Parse { path: path.clone(), source })?;

		let mut submitters = BTreeMap::new();
		for tester in approved {
			let prior = from_file.submitters.get(tester);
			let mut results = BTreeMap::new();
			for testee in approved {
				if tester == testee {
					continue;
				}
				let carried = prior.and_then(|p| p.results.get(testee)).cloned();
				results.insert(testee.clone(), carried.unwrap_or_else(|| default_testset(tests, progs)));
			}
			submitters.insert(
				tester.clone(),
				SubmitterState {
					latest_submission: prior.and_then(|p| p.latest_submission),
					test_suite_sizes: prior.map(|p| p.test_suite_sizes.clone()).unwrap_or_default(),
					results,
				},
			);
		}

		Ok(Self { submitters })
	}

	/// Write state atomically: write to a tempfile in the same directory,
	/// then rename over the target, so a crash mid-write never leaves a
	/// truncated state file.
	pub fn save(&self, state_dir: &StateDir) -> Result<(), StateError> {
		let path = state_dir.tourney_state_file();
		write_atomic(&path, &self)
	}

	/// Submitters who have at least one accepted submission on disk.
	pub fn valid_submitters(&self, state_dir: &StateDir) -> Vec<Submitter> {
		self.submitters
			.keys()
			.filter(|s| state_dir.get_tourney_dir(s).is_dir())
			.cloned()
			.collect()
	}

	pub fn submitters(&self) -> impl Iterator<Item = &Submitter> {
		self.submitters.keys()
	}

	pub fn submitter_state(&self, submitter: &Submitter) -> Option<&SubmitterState> {
		self.submitters.get(submitter)
	}

	pub fn set_time_of_submission(&mut self, submitter: &Submitter, time: DateTime<Utc>) {
		if let Some(state) = self.submitters.get_mut(submitter) {
			state.latest_submission = Some(time);
		}
	}

	pub fn set_test_suite_sizes(&mut self, submitter: &Submitter, sizes: BTreeMap<Test, u32>) {
		if let Some(state) = self.submitters.get_mut(submitter) {
			state.test_suite_sizes = sizes;
		}
	}

	pub fn set(&mut self, tester: &Submitter, testee: &Submitter, testset: TestSet) {
		if let Some(state) = self.submitters.get_mut(tester) {
			state.results.insert(testee.clone(), testset);
		}
	}

	pub fn get(&self, tester: &Submitter, testee: &Submitter, test: &Test, prog: &Prog) -> TestResult {
		self.submitters
			.get(tester)
			.and_then(|s| s.results.get(testee))
			.and_then(|testset| testset.get(test))
			.and_then(|progs| progs.get(prog))
			.copied()
			.unwrap_or(TestResult::NotTested)
	}

	/// Set a single `(test, prog)` cell for `tester`'s results against
	/// `testee`, creating the cell if absent.
	pub fn set_cell(&mut self, tester: &Submitter, testee: &Submitter, test: &Test, prog: &Prog, result: TestResult) {
		if let Some(state) = self.submitters.get_mut(tester) {
			state.results.entry(testee.clone()).or_default().entry(test.clone()).or_default().insert(prog.clone(), result);
		}
	}

	/// Mark every cell where `submitter`'s `prog` evaded detection as
	/// `BugFound`, zeroing its score. Used by the post-tournament
	/// diff-audit workflow (`rescore_invalid_progs`) once an operator has
	/// flagged a prog as an invalid mutant in `submitter_prog_diffs.csv`.
	pub fn invalidate_prog(&mut self, submitter: &Submitter, prog: &Prog) {
		for state in self.submitters.values_mut() {
			let Some(testset) = state.results.get_mut(submitter) else { continue };
			for progs in testset.values_mut() {
				if let Some(result) = progs.get_mut(prog) {
					if result.is_evasion() {
						*result = TestResult::BugFound;
					}
				}
			}
		}
	}

	/// Count of `(tester, test)` cells with a detection outcome across
	/// every testee and prog.
	pub fn bugs_detected(&self, tester: &Submitter, test: &Test, progs: &[Prog]) -> u32 {
		let Some(state) = self.submitters.get(tester) else { return 0 };
		let mut count = 0;
		for testset in state.results.values() {
			let Some(prog_results) = testset.get(test) else { continue };
			for prog in progs {
				if prog_results.get(prog).is_some_and(|r| r.is_detection()) {
					count += 1;
				}
			}
		}
		count
	}

	/// Count of `(tester, test)` pairs where `testee`'s `prog` evaded
	/// detection.
	pub fn tests_evaded(&self, testee: &Submitter, prog: &Prog, testers: &[Submitter]) -> u32 {
		let mut count = 0;
		for tester in testers {
			if tester == testee {
				continue;
			}
			let Some(state) = self.submitters.get(tester) else { continue };
			let Some(testset) = state.results.get(testee) else { continue };
			for progs in testset.values() {
				if progs.get(prog).is_some_and(|r| r.is_evasion()) {
					count += 1;
				}
			}
		}
		count
	}
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	std::fs::create_dir_all(dir).map_err(|source| StateError::Io { path: path.to_path_buf(), source })?;
	let mut tmp =
		tempfile::NamedTempFile::new_in(dir).map_err(|source| StateError::Io { path: path.to_path_buf(), source })?;
	let json = serde_json::to_string_pretty(value).expect("state always serializes");
	tmp.write_all(json.as_bytes()).map_err(|source| StateError::Io { path: path.to_path_buf(), source })?;
	tmp.persist(path).map_err(|e| StateError::Io { path: path.to_path_buf(), source: e.error })?;
	tracing::debug!(target: LOG_TARGET, ?path, "wrote state file");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalidate_prog_zeroes_evaded_cells_for_that_submitter_only() {
		let mut state = TournamentState::new(&submitters(), &tests(), &progs());
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"), TestResult::NoBugsDetected);
		state.invalidate_prog(&Submitter::from("bob"), &Prog::from("p1"));
		assert_eq!(
			state.get(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1")),
			TestResult::BugFound
		);
	}

	fn submitters() -> Vec<Submitter> {
		vec![Submitter::from("alice"), Submitter::from("bob")]
	}

	fn tests() -> Vec<Test> {
		vec![Test::from("t1")]
	}

	fn progs() -> Vec<Prog> {
		vec![Prog::from("p1")]
	}

	#[test]
	fn new_state_has_no_diagonal_entries() {
		let state = TournamentState::new(&submitters(), &tests(), &progs());
		let alice = state.submitter_state(&Submitter::from("alice")).unwrap();
		assert!(!alice.results.contains_key(&Submitter::from("alice")));
		assert!(alice.results.contains_key(&Submitter::from("bob")));
	}

	#[test]
	fn unpopulated_cells_default_to_not_tested() {
		let state = TournamentState::new(&submitters(), &tests(), &progs());
		let result = state.get(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"));
		assert_eq!(result, TestResult::NotTested);
	}

	#[test]
	fn save_then_load_round_trips_and_reconciles_new_submitters() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());

		let mut state = TournamentState::new(&submitters(), &tests(), &progs());
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"), TestResult::BugFound);
		state.save(&state_dir).unwrap();

		let mut expanded_submitters = submitters();
		expanded_submitters.push(Submitter::from("carol"));
		let reloaded = TournamentState::load(&state_dir, &expanded_submitters, &tests(), &progs()).unwrap();

		assert_eq!(
			reloaded.get(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1")),
			TestResult::BugFound
		);
		assert!(reloaded.submitter_state(&Submitter::from("carol")).is_some());
	}

	#[test]
	fn bugs_detected_counts_across_testees_and_progs() {
		let mut state = TournamentState::new(&submitters(), &tests(), &progs());
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"), TestResult::BugFound);
		assert_eq!(state.bugs_detected(&Submitter::from("alice"), &Test::from("t1"), &progs()), 1);
	}

	#[test]
	fn tests_evaded_counts_across_testers() {
		let mut state = TournamentState::new(&submitters(), &tests(), &progs());
		state.set_cell(&Submitter::from("alice"), &Submitter::from("bob"), &Test::from("t1"), &Prog::from("p1"), TestResult::NoBugsDetected);
		assert_eq!(state.tests_evaded(&Submitter::from("bob"), &Prog::from("p1"), &submitters()), 1);
	}
}
