use crate::error::ConfigError;
use crate::{load_strict, paths::StateDir};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tourney_primitives::Submitter;

/// A single approved submitter's entry. `student_id` is an optional alias a
/// CI system may use instead of the submitter's canonical username, ported
/// from `approved_submitters.py::get_submitter_username`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterEntry {
	#[serde(default)]
	pub student_id: Option<String>,
	#[serde(default)]
	pub extension_granted: bool,
}

/// The approved-submitter list and submission deadlines. Ported from
/// `tournament/config/files/approved_submitters.py`, folding the separate
/// `submitter_extensions.py` file's `extension_granted` flag into each
/// submitter's own entry, per spec.md §3's "extensions may grant post-deadline
/// submission rights".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedSubmitters {
	pub submission_deadline: DateTime<Utc>,
	pub submission_extensions_deadline: DateTime<Utc>,
	pub submitters: BTreeMap<String, SubmitterEntry>,
}

/// Whether a submitter may currently submit, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
	pub closed: bool,
	pub extension_granted: bool,
}

impl SubmissionWindow {
	pub fn may_submit(&self) -> bool {
		!self.closed || self.extension_granted
	}
}

impl ApprovedSubmitters {
	pub fn default_config() -> Self {
		let mut submitters = BTreeMap::new();
		submitters.insert("student_a".to_string(), SubmitterEntry { student_id: Some("123456".into()), extension_granted: false });
		submitters.insert("student_b".to_string(), SubmitterEntry { student_id: Some("234567".into()), extension_granted: false });
		Self {
			submission_deadline: DateTime::<Utc>::MAX_UTC,
			submission_extensions_deadline: DateTime::<Utc>::MAX_UTC,
			submitters,
		}
	}

	pub fn load(state_dir: &StateDir) -> Result<Self, ConfigError> {
		load_strict(&state_dir.approved_submitters_list(), &Self::default_config())
	}

	/// Accept either a submitter's canonical username or their `student_id`
	/// alias, matching `get_submitter_username`'s case-insensitive lookup.
	pub fn resolve(&self, submitter_or_id: &str) -> Option<Submitter> {
		let needle = submitter_or_id.to_lowercase();
		self.submitters
			.iter()
			.find(|(name, entry)| {
				name.to_lowercase() == needle
					|| entry.student_id.as_deref().map(|id| id.to_lowercase()) == Some(needle.clone())
			})
			.map(|(name, _)| Submitter::from(name.as_str()))
	}

	pub fn window_for(&self, submitter: &Submitter, now: DateTime<Utc>) -> SubmissionWindow {
		let extension_granted = self
			.submitters
			.get(&submitter.0)
			.map(|entry| entry.extension_granted && now <= self.submission_extensions_deadline)
			.unwrap_or(false);
		SubmissionWindow { closed: now > self.submission_deadline, extension_granted }
	}

	pub fn check_valid(&self) -> Result<(), ConfigError> {
		if self.submitters.len() < 2 {
			return Err(ConfigError::Invalid(
				"there are fewer than 2 approved submitters in approved_submitters.json".to_string(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn fixture() -> ApprovedSubmitters {
		let mut submitters = BTreeMap::new();
		submitters.insert("alice".to_string(), SubmitterEntry { student_id: Some("111".into()), extension_granted: false });
		submitters.insert("bob".to_string(), SubmitterEntry { student_id: None, extension_granted: true });
		ApprovedSubmitters {
			submission_deadline: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
			submission_extensions_deadline: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
			submitters,
		}
	}

	#[test]
	fn resolves_by_student_id() {
		let approved = fixture();
		assert_eq!(approved.resolve("111").unwrap(), Submitter::from("alice"));
		assert_eq!(approved.resolve("ALICE").unwrap(), Submitter::from("alice"));
		assert!(approved.resolve("unknown").is_none());
	}

	#[test]
	fn extension_grants_submission_past_deadline() {
		let approved = fixture();
		let after_deadline = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();

		let alice_window = approved.window_for(&Submitter::from("alice"), after_deadline);
		assert!(alice_window.closed);
		assert!(!alice_window.may_submit());

		let bob_window = approved.window_for(&Submitter::from("bob"), after_deadline);
		assert!(bob_window.closed);
		assert!(bob_window.may_submit());
	}
}
