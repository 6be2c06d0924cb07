use crate::error::ConfigError;
use crate::{load_strict, paths::StateDir};
use serde::{Deserialize, Serialize};
use tourney_primitives::Outcome;

/// Configuration needed to email tournament maintainers crash reports.
/// Ported from `tournament/config/files/email_config.py`; the SMTP
/// connection check that the original performs inline lives in
/// `tourney-emailer` instead, since it is the crate that already depends on
/// `lettre`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
	pub sender: String,
	pub password: String,
	pub smtp_server: String,
	pub port: u16,
	pub crash_report_recipients: Vec<String>,
}

impl EmailConfig {
	pub fn default_config() -> Self {
		Self {
			sender: "tourney-noreply@example.edu".to_string(),
			password: "email_password_goes_here".to_string(),
			smtp_server: "smtp.example.edu".to_string(),
			port: 587,
			crash_report_recipients: vec!["recipient_1@mail.com".to_string(), "recipient_2@mail.com".to_string()],
		}
	}

	pub fn load(state_dir: &StateDir) -> Result<Self, ConfigError> {
		load_strict(&state_dir.email_config(), &Self::default_config())
	}

	pub fn crash_report_recipients(&self) -> String {
		self.crash_report_recipients.join(", ")
	}

	/// Check the email config has been updated with non-default values.
	/// The SMTP connection itself is checked by `tourney-emailer`.
	pub fn check_non_default(&self) -> Outcome {
		if *self != Self::default_config() {
			Outcome::ok(format!("Emails will be sent from: {}", self.sender))
		} else {
			Outcome::err("ERROR: Email has not been configured.\n       Please update email_config.json with the correct details".to_string())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_fails_non_default_check() {
		let config = EmailConfig::default_config();
		assert!(!config.check_non_default().success);
	}

	#[test]
	fn customised_config_passes_non_default_check() {
		let mut config = EmailConfig::default_config();
		config.sender = "real-sender@example.edu".to_string();
		assert!(config.check_non_default().success);
	}
}
