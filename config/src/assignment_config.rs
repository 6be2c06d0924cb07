use crate::error::ConfigError;
use crate::{load_strict, paths::StateDir};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which assignment type the tournament is configured for, and where its
/// reference source tree lives. Ported from
/// `tournament/config/files/assignment_config.py`; adapter construction
/// itself lives in `tourney-node-core-adapter` to avoid a dependency cycle
/// (this crate only describes *which* adapter to build).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
	pub assignment_type: String,
	pub source_assg_dir: PathBuf,
}

impl AssignmentConfig {
	const ASSIGNMENT_TYPES: &'static [&'static str] = &["junit_assignment", "fuzz_assignment"];

	pub fn default_config() -> Self {
		Self {
			assignment_type: "enter_assignment_type_here".to_string(),
			source_assg_dir: PathBuf::from("/absolute/path/to/assignment"),
		}
	}

	pub fn load(state_dir: &StateDir) -> Result<Self, ConfigError> {
		load_strict(&state_dir.assignment_config(), &Self::default_config())
	}

	/// Check that `assignment_type` names a known adapter and that
	/// `source_assg_dir` exists, matching `check_assignment_valid`.
	pub fn check_valid(&self) -> Result<(), ConfigError> {
		if !Self::ASSIGNMENT_TYPES.contains(&self.assignment_type.as_str()) {
			return Err(ConfigError::Invalid(format!(
				"assignment_type '{}' is not one of {:?}",
				self.assignment_type,
				Self::ASSIGNMENT_TYPES
			)));
		}
		if !self.source_assg_dir.exists() {
			return Err(ConfigError::Invalid(format!(
				"source_assg_dir {} does not exist",
				self.source_assg_dir.display()
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_unknown_assignment_type() {
		let cfg = AssignmentConfig { assignment_type: "nope".into(), source_assg_dir: PathBuf::from("/tmp") };
		assert!(cfg.check_valid().is_err());
	}

	#[test]
	fn load_writes_default_and_errors_on_first_call() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let err = AssignmentConfig::load(&state_dir).unwrap_err();
		assert!(matches!(err, ConfigError::MissingDefaultWritten { .. }));
		assert!(state_dir.assignment_config().exists());
	}
}
