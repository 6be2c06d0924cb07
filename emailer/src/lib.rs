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

//! Crash notification email, ported from
//! `original_source/tournament/reporting/emailer.py`. Invoked from the
//! scheduler's top-level error handler; a no-op when `email_config.json`
//! is still at its bootstrap default.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use thiserror::Error;
use tourney_config::EmailConfig;

const LOG_TARGET: &str = "emailer";

#[derive(Debug, Error)]
pub enum EmailerError {
	#[error("invalid email address '{address}': {source}")]
	InvalidAddress {
		address: String,
		#[source]
		source: lettre::address::AddressError,
	},

	#[error("failed to build crash report message: {0}")]
	Build(#[from] lettre::error::Error),

	#[error("failed to send crash report email: {0}")]
	Send(#[from] lettre::transport::smtp::Error),
}

/// Construct and send a crash report to `crash_report_recipients`, matching
/// `email_crash_report`'s message body verbatim. Returns `Ok(())` without
/// sending anything if `config` has not been edited away from its
/// bootstrap defaults (the original's implicit `NoConfigDefined` guard).
pub fn email_crash_report(config: &EmailConfig, trace_file: &Path, hostname: &str) -> Result<(), EmailerError> {
	if !config.check_non_default().success {
		tracing::warn!(target: LOG_TARGET, "email_config.json is unconfigured, skipping crash report");
		return Ok(());
	}

	let body = format!(
		"Hi,\n\nThe tourney daemon has raised an exception and has been stopped.\n\
		Please correct this error and restart the tournament. Details on this crash can be \
		found at {} on {hostname}.",
		trace_file.display(),
	);

	let mut builder = Message::builder().from(parse_mailbox(&config.sender)?).subject("Tourney crash");
	for recipient in &config.crash_report_recipients {
		builder = builder.to(parse_mailbox(recipient)?);
	}
	let message = builder.body(body)?;

	let credentials = Credentials::new(config.sender.clone(), config.password.clone());
	let mailer = SmtpTransport::starttls_relay(&config.smtp_server)?
		.port(config.port)
		.credentials(credentials)
		.build();

	mailer.send(&message)?;
	tracing::info!(target: LOG_TARGET, recipients = %config.crash_report_recipients(), "sent crash report email");
	Ok(())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailerError> {
	address.parse().map_err(|source| EmailerError::InvalidAddress { address: address.to_string(), source })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_a_no_op() {
		let config = EmailConfig::default_config();
		let result = email_crash_report(&config, Path::new("/tmp/tournament_traces.log"), "ci-runner");
		assert!(result.is_ok());
	}

	#[test]
	fn invalid_sender_address_is_reported() {
		let mut config = EmailConfig::default_config();
		config.sender = "not-an-email".to_string();
		let err = parse_mailbox(&config.sender).unwrap_err();
		assert!(matches!(err, EmailerError::InvalidAddress { .. }));
	}
}
