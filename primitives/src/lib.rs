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

//! Value types shared by every crate in the workspace: the identifiers that
//! flow through the submission pipeline and the scheduler, and the
//! `TestResult` sum type that is the unit of the whole tournament.

mod outcome;
mod testset;
mod time;

pub use outcome::Outcome;
pub use testset::{default_testset, TestSet};
pub use time::{format_trace, parse_trace, DATETIME_FILE_FORMAT, DATETIME_TRACE_FORMAT};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
	($name:ident) => {
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub String);

		impl $name {
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<&str> for $name {
			fn from(s: &str) -> Self {
				Self(s.to_string())
			}
		}

		impl From<String> for $name {
			fn from(s: String) -> Self {
				Self(s)
			}
		}
	};
}

string_newtype!(Submitter);
string_newtype!(Test);
string_newtype!(Prog);

/// The outcome of running one [`Test`] against one [`Prog`].
///
/// `BugFound` and `Timeout` count as detection; `NoBugsDetected` counts as
/// evasion. The remaining variants are neutral and ignored by scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestResult {
	NoBugsDetected,
	BugFound,
	Timeout,
	NotTested,
	CompilationFailed,
	UnexpectedReturnCode,
}

impl TestResult {
	/// `true` for the two outcomes that count as the tester's test having
	/// detected a bug in the testee's prog.
	pub fn is_detection(self) -> bool {
		matches!(self, TestResult::BugFound | TestResult::Timeout)
	}

	/// `true` when the prog evaded detection outright.
	pub fn is_evasion(self) -> bool {
		matches!(self, TestResult::NoBugsDetected)
	}
}

impl fmt::Display for TestResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TestResult::NoBugsDetected => "NO_BUGS_DETECTED",
			TestResult::BugFound => "BUG_FOUND",
			TestResult::Timeout => "TIMEOUT",
			TestResult::NotTested => "NOT_TESTED",
			TestResult::CompilationFailed => "COMPILATION_FAILED",
			TestResult::UnexpectedReturnCode => "UNEXPECTED_RETURN_CODE",
		};
		write!(f, "{s}")
	}
}
