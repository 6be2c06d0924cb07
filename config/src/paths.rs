use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tourney_primitives::{Submitter, DATETIME_FILE_FORMAT};

/// File paths used by the tournament, all rooted at a single `--state-dir`.
/// Mirrors `tournament/util/paths.py`, minus the hardcoded repo-relative
/// `ROOT_DIR` (the original derives everything from its own source tree
/// location; here the root is an explicit, operator-chosen directory).
#[derive(Debug, Clone)]
pub struct StateDir {
	root: PathBuf,
}

impl StateDir {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn configs_dir(&self) -> PathBuf {
		self.root.join("config")
	}

	pub fn approved_submitters_list(&self) -> PathBuf {
		self.configs_dir().join("approved_submitters.json")
	}

	pub fn submitter_extensions_list(&self) -> PathBuf {
		self.configs_dir().join("submitter_extensions.json")
	}

	pub fn assignment_config(&self) -> PathBuf {
		self.configs_dir().join("assignment_config.json")
	}

	pub fn server_config(&self) -> PathBuf {
		self.configs_dir().join("server_config.json")
	}

	pub fn email_config(&self) -> PathBuf {
		self.configs_dir().join("email_config.json")
	}

	pub fn tourney_state_file(&self) -> PathBuf {
		self.root.join("tourney_state.json")
	}

	pub fn results_file(&self) -> PathBuf {
		self.root.join("tourney_results.json")
	}

	pub fn trace_file(&self) -> PathBuf {
		self.root.join("tournament_traces.log")
	}

	pub fn csv_file(&self) -> PathBuf {
		self.root.join("student_results.csv")
	}

	pub fn diff_file(&self) -> PathBuf {
		self.root.join("submitter_prog_diffs.csv")
	}

	pub fn num_tests_file_name(&self) -> &'static str {
		"num_tests.json"
	}

	pub fn submissions_dir(&self) -> PathBuf {
		self.root.join("submissions")
	}

	pub fn pre_validation_dir(&self) -> PathBuf {
		self.submissions_dir().join("pre_validation")
	}

	pub fn staging_dir(&self) -> PathBuf {
		self.submissions_dir().join("staged")
	}

	pub fn tourney_dir(&self) -> PathBuf {
		self.submissions_dir().join("tourney")
	}

	pub fn head_to_head_dir(&self) -> PathBuf {
		self.submissions_dir().join("head_to_head")
	}

	pub fn alive_flag(&self) -> PathBuf {
		self.root.join(".alive")
	}

	pub fn shutdown_flag(&self) -> PathBuf {
		self.root.join(".shutdown")
	}

	pub fn get_pre_validation_dir(&self, submitter: &Submitter) -> PathBuf {
		self.pre_validation_dir().join(&submitter.0)
	}

	pub fn get_tourney_dir(&self, submitter: &Submitter) -> PathBuf {
		self.tourney_dir().join(&submitter.0)
	}

	pub fn get_snapshot_file_path(&self, report_time: &DateTime<Utc>) -> PathBuf {
		self.root.join(format!("snapshot_{}.json", report_time.format(DATETIME_FILE_FORMAT)))
	}
}
