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

//! State tracked as the presence (or absence) of a file, ported from
//! `tournament/flags.py`. A flag is true iff its file exists; setting it
//! false deletes the file.

use std::fs;
use std::path::Path;
use tourney_primitives::Outcome;

/// A flag backed by a single file name relative to whatever directory it is
/// checked in.
pub trait Flag {
	fn file_name(&self) -> &'static str;
}

/// Flags tracking the scheduler daemon's own lifecycle, rooted at the
/// tournament's state directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourneyFlag {
	/// The daemon is online and polling.
	Alive,
	/// The daemon should shut down on its next poll cycle.
	Shutdown,
}

impl TourneyFlag {
	pub const ALL: [TourneyFlag; 2] = [TourneyFlag::Alive, TourneyFlag::Shutdown];
}

impl Flag for TourneyFlag {
	fn file_name(&self) -> &'static str {
		match self {
			TourneyFlag::Alive => ".alive",
			TourneyFlag::Shutdown => ".shutdown",
		}
	}
}

/// Flags enforcing the order submission validation stages must run in:
/// `elig` before `compiled` before `tests_valid` before `progs_valid`
/// before `submission_ready`, rooted at a single submission's staging dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionFlag {
	Elig,
	Compiled,
	TestsValid,
	ProgsValid,
	SubmissionReady,
}

impl SubmissionFlag {
	pub const ALL: [SubmissionFlag; 5] = [
		SubmissionFlag::Elig,
		SubmissionFlag::Compiled,
		SubmissionFlag::TestsValid,
		SubmissionFlag::ProgsValid,
		SubmissionFlag::SubmissionReady,
	];
}

impl Flag for SubmissionFlag {
	fn file_name(&self) -> &'static str {
		match self {
			SubmissionFlag::Elig => ".elig",
			SubmissionFlag::Compiled => ".compiled",
			SubmissionFlag::TestsValid => ".tests_valid",
			SubmissionFlag::ProgsValid => ".progs_valid",
			SubmissionFlag::SubmissionReady => ".submission_ready",
		}
	}
}

/// Set `flag` to true by creating its file under `dir` (writing `contents`
/// inside it), or to false by deleting it.
pub fn set_flag(dir: &Path, flag: &impl Flag, value: bool, contents: &str) -> std::io::Result<()> {
	let flag_path = dir.join(flag.file_name());
	if value {
		fs::write(&flag_path, contents)
	} else if flag_path.exists() {
		fs::remove_file(&flag_path)
	} else {
		Ok(())
	}
}

/// Get the value of `flag`: `success` is whether the flag's file exists,
/// `traces` is its trimmed contents.
pub fn get_flag(dir: &Path, flag: &impl Flag) -> Outcome {
	let flag_path = dir.join(flag.file_name());
	match fs::read_to_string(&flag_path) {
		Ok(contents) => Outcome::ok(contents.trim().to_string()),
		Err(_) => Outcome::new(false, String::new()),
	}
}

/// Clear every flag of a kind under `dir`.
pub fn clear_all(dir: &Path, flags: &[impl Flag]) -> std::io::Result<()> {
	for flag in flags {
		set_flag(dir, flag, false, "")?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flag_round_trips_through_the_file_system() {
		let dir = tempfile::tempdir().unwrap();
		assert!(!get_flag(dir.path(), &TourneyFlag::Alive).success);

		set_flag(dir.path(), &TourneyFlag::Alive, true, "pid=123").unwrap();
		let flag = get_flag(dir.path(), &TourneyFlag::Alive);
		assert!(flag.success);
		assert_eq!(flag.traces, "pid=123");

		set_flag(dir.path(), &TourneyFlag::Alive, false, "").unwrap();
		assert!(!get_flag(dir.path(), &TourneyFlag::Alive).success);
	}

	#[test]
	fn clear_all_removes_every_submission_flag() {
		let dir = tempfile::tempdir().unwrap();
		for flag in SubmissionFlag::ALL {
			set_flag(dir.path(), &flag, true, "").unwrap();
		}
		clear_all(dir.path(), &SubmissionFlag::ALL).unwrap();
		for flag in SubmissionFlag::ALL {
			assert!(!get_flag(dir.path(), &flag).success);
		}
	}
}
