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

//! The backend and frontend command line interface, ported from
//! `original_source/tournament/cli_commands.py` and
//! `tournament/util/cli_arg_parser.py`. Both parsers are folded into a
//! single binary's `clap::Subcommand`, since nothing in the Rust build
//! forces separate entry points the way the original's `backend: bool` flag
//! toggle did.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tourney_config::paths::StateDir;
use tourney_config::{ApprovedSubmitters, AssignmentConfig, EmailConfig, ServerConfig};
use tourney_node_core_adapter::AssignmentAdapter;
use tourney_node_core_flags::{get_flag, set_flag, TourneyFlag};
use tourney_primitives::Submitter;

#[derive(Parser)]
#[command(name = "tourney", about = "Run and submit to a head-to-head code-testing tournament")]
struct Cli {
	/// Root directory for tournament state, configuration and submissions.
	#[arg(long, global = true, default_value = "./state")]
	state_dir: PathBuf,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Check the configuration of the tournament.
	CheckConfig,
	/// Remove all submissions and reset the tournament state.
	Clean,
	/// Start the tournament daemon and results server.
	StartTournament {
		/// Number of concurrent head-to-head worker slots.
		#[arg(long, default_value_t = 4)]
		worker_slots: usize,
	},
	/// Shut down a running tournament.
	Shutdown {
		/// Message to display while the tournament is shut down.
		#[arg(long, default_value = "")]
		message: String,
	},
	/// Request a fresh snapshot outside of the normal submission flow.
	Report,
	/// Export tournament results in csv format.
	ExportResults,
	/// Generate diffs of submitters' mutants to verify mutants are valid.
	GetDiffs,
	/// Read the diffs file and rescore any invalid progs.
	RescoreInvalidProgs,

	/// Check the submitter is eligible to submit to the tournament.
	CheckEligibility { submitter: String, assg_name: String, dir: PathBuf },
	/// Compile tests and progs in a provided submission.
	Compile { submitter: String },
	/// Validate the tests in a provided submission.
	ValidateTests { submitter: String },
	/// Validate the programs under test in a provided submission.
	ValidateProgs { submitter: String },
	/// Make a submission.
	Submit { submitter: String },
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.init();

	let state_dir = StateDir::new(cli.state_dir);
	match run(state_dir, cli.command).await {
		Ok(message) => {
			println!("{message}");
			ExitCode::SUCCESS
		}
		Err(message) => {
			eprintln!("{message}");
			ExitCode::FAILURE
		}
	}
}

async fn run(state_dir: StateDir, command: Command) -> Result<String, String> {
	match command {
		Command::CheckConfig => check_config(&state_dir),
		Command::Clean => clean(&state_dir),
		Command::StartTournament { worker_slots } => start_tournament(&state_dir, worker_slots).await,
		Command::Shutdown { message } => shutdown(&state_dir, &message),
		Command::Report => report(&state_dir).await,
		Command::ExportResults => export_results(&state_dir).await,
		Command::GetDiffs => get_diffs(&state_dir).await,
		Command::RescoreInvalidProgs => rescore_invalid_progs(&state_dir).await,
		Command::CheckEligibility { submitter, assg_name, dir } => check_eligibility(&state_dir, &submitter, &assg_name, &dir).await,
		Command::Compile { submitter } => compile(&state_dir, &submitter).await,
		Command::ValidateTests { submitter } => validate_tests(&state_dir, &submitter).await,
		Command::ValidateProgs { submitter } => validate_progs(&state_dir, &submitter).await,
		Command::Submit { submitter } => submit(&state_dir, &submitter).await,
	}
}

/// Ported from `tournament/config/__init__.py::configuration_valid`: load
/// every config file, aggregate each one's validity check, and report all
/// failures at once rather than bailing on the first.
fn check_config(state_dir: &StateDir) -> Result<String, String> {
	let mut lines = Vec::new();
	let mut ok = true;

	match AssignmentConfig::load(state_dir) {
		Ok(assignment) => match assignment.check_valid() {
			Ok(()) => lines.push("assignment config: OK".to_string()),
			Err(e) => {
				ok = false;
				lines.push(format!("assignment config: {e}"));
			}
		},
		Err(e) => {
			ok = false;
			lines.push(format!("assignment config: {e}"));
		}
	}

	match ApprovedSubmitters::load(state_dir) {
		Ok(approved) => match approved.check_valid() {
			Ok(()) => lines.push("approved submitters: OK".to_string()),
			Err(e) => {
				ok = false;
				lines.push(format!("approved submitters: {e}"));
			}
		},
		Err(e) => {
			ok = false;
			lines.push(format!("approved submitters: {e}"));
		}
	}

	match ServerConfig::load(state_dir) {
		Ok(server) => {
			let outcome = server.check_server_config();
			ok &= outcome.success;
			lines.push(outcome.traces);
		}
		Err(e) => {
			ok = false;
			lines.push(format!("server config: {e}"));
		}
	}

	lines.push("=================================".to_string());
	lines.push(if ok { "Tournament configuration is valid".to_string() } else { "Tournament has not been configured correctly. Please correct the above errors".to_string() });

	let report = lines.join("\n");
	if ok {
		Ok(report)
	} else {
		Err(report)
	}
}

/// Ported from `tournament/main.py::clean`. Refuses while the daemon is
/// online since it would be racing the scheduler's own reads/writes of the
/// same directories.
fn clean(state_dir: &StateDir) -> Result<String, String> {
	if get_flag(state_dir.root(), &TourneyFlag::Alive).success {
		return Err("Refusing to clean: the tournament is currently online. Shut it down first.".to_string());
	}

	let remove_dir = |path: &std::path::Path| -> Result<(), String> {
		if path.exists() {
			std::fs::remove_dir_all(path).map_err(|e| format!("failed to remove {}: {e}", path.display()))?;
		}
		Ok(())
	};
	let remove_file = |path: &std::path::Path| -> Result<(), String> {
		if path.exists() {
			std::fs::remove_file(path).map_err(|e| format!("failed to remove {}: {e}", path.display()))?;
		}
		Ok(())
	};

	remove_dir(&state_dir.submissions_dir())?;
	remove_file(&state_dir.tourney_state_file())?;
	remove_file(&state_dir.trace_file())?;
	remove_file(&state_dir.results_file())?;
	remove_file(&state_dir.csv_file())?;
	remove_file(&state_dir.diff_file())?;
	remove_file(&state_dir.assignment_config())?;
	remove_file(&state_dir.approved_submitters_list())?;
	remove_file(&state_dir.server_config())?;
	remove_file(&state_dir.email_config())?;

	if let Ok(entries) = std::fs::read_dir(state_dir.configs_dir()) {
		for entry in entries.filter_map(|e| e.ok()) {
			let name = entry.file_name();
			let name = name.to_string_lossy();
			if name.starts_with("snapshot") && name.ends_with(".json") {
				let _ = std::fs::remove_file(entry.path());
			}
		}
	}

	set_flag(state_dir.root(), &TourneyFlag::Alive, false, "").map_err(|e| e.to_string())?;
	set_flag(state_dir.root(), &TourneyFlag::Shutdown, false, "").map_err(|e| e.to_string())?;

	Ok("Tournament state cleaned.".to_string())
}

/// Ported from `tournament/daemon/main.py::start` and
/// `results_server.py::start_server`; unlike the original's two
/// independently forked subprocesses, both the scheduler daemon and the
/// results HTTP server run as concurrent tasks within this one process.
async fn start_tournament(state_dir: &StateDir, worker_slots: usize) -> Result<String, String> {
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	assignment_config.check_valid().map_err(|e| e.to_string())?;
	let approved = ApprovedSubmitters::load(state_dir).map_err(|e| e.to_string())?;
	let server_config = ServerConfig::load(state_dir).map_err(|e| e.to_string())?;
	let email_config = match EmailConfig::load(state_dir) {
		Ok(config) => Some(config),
		Err(e) => {
			tracing::warn!("crash report emails are disabled: {e}");
			None
		}
	};

	let adapter: Arc<dyn AssignmentAdapter> =
		Arc::from(tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?);

	let server_state_dir = state_dir.clone();
	let server_host = server_config.host().to_string();
	let server_port = server_config.port();
	let server_task =
		tokio::spawn(async move { tourney_node_results_server::serve(server_state_dir, &server_host, server_port).await });

	let scheduler_result =
		tourney_node_core_scheduler::run(state_dir, &approved, adapter, email_config.as_ref(), worker_slots, Utc::now).await;

	server_task.abort();
	scheduler_result.map_err(|e| e.to_string())?;
	Ok("Tournament finished.".to_string())
}

fn shutdown(state_dir: &StateDir, message: &str) -> Result<String, String> {
	if !tourney_node_core_scheduler::is_alive(state_dir) {
		return Err("Tournament is already offline".to_string());
	}
	tourney_node_core_scheduler::request_shutdown(state_dir, message).map_err(|e| e.to_string())?;
	Ok("Tournament is shutting down. This may take a while as current processing must be completed.\n\
		Check the tournament traces to see when the tournament has successfully stopped."
		.to_string())
}

async fn report(state_dir: &StateDir) -> Result<String, String> {
	tourney_node_core_queue::enqueue_report_request(state_dir, Utc::now()).await.map_err(|e| e.to_string())?;
	Ok("Report requested; the next daemon poll will republish a snapshot.".to_string())
}

async fn export_results(state_dir: &StateDir) -> Result<String, String> {
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	let snapshot = tourney_node_core_snapshot::Snapshot::load(&state_dir.results_file()).map_err(|e| e.to_string())?;
	snapshot.write_csv(&state_dir.csv_file(), adapter.as_ref()).map_err(|e| e.to_string())?;
	Ok(format!("Results exported to {}", state_dir.csv_file().display()))
}

async fn get_diffs(state_dir: &StateDir) -> Result<String, String> {
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	let num_rows = tourney_node_core_scheduler::get_diffs(state_dir, adapter.as_ref()).await.map_err(|e| e.to_string())?;
	Ok(format!("Wrote {num_rows} rows to {}", state_dir.diff_file().display()))
}

async fn rescore_invalid_progs(state_dir: &StateDir) -> Result<String, String> {
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	let approved = ApprovedSubmitters::load(state_dir).map_err(|e| e.to_string())?;
	let approved_submitters: Vec<Submitter> = approved.submitters.keys().map(|name| Submitter::from(name.as_str())).collect();
	let num_invalid = tourney_node_core_scheduler::rescore_invalid_progs(state_dir, adapter.as_ref(), &approved_submitters, Utc::now())
		.await
		.map_err(|e| e.to_string())?;
	Ok(format!("Rescored {num_invalid} invalid prog(s)."))
}

async fn check_eligibility(state_dir: &StateDir, submitter_or_id: &str, assg_name: &str, dir: &std::path::Path) -> Result<String, String> {
	let approved = ApprovedSubmitters::load(state_dir).map_err(|e| e.to_string())?;
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;

	tourney_node_core_validator::check_eligibility(state_dir, &approved, adapter.as_ref(), assg_name, submitter_or_id, dir, Utc::now())
		.await
		.map(|submitter| format!("Submitter '{submitter}' is eligible for the tournament"))
		.map_err(|e| e.to_string())
}

async fn compile(state_dir: &StateDir, submitter_or_id: &str) -> Result<String, String> {
	let submitter = resolve_submitter(state_dir, submitter_or_id)?;
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	tourney_node_core_validator::compile(state_dir, adapter.as_ref(), &submitter).await.map_err(|e| e.to_string())?;
	Ok(format!("Submission from '{submitter}' compiled successfully"))
}

async fn validate_tests(state_dir: &StateDir, submitter_or_id: &str) -> Result<String, String> {
	let submitter = resolve_submitter(state_dir, submitter_or_id)?;
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	tourney_node_core_validator::validate_tests(state_dir, adapter.as_ref(), &submitter).await.map_err(|e| e.to_string())?;
	Ok(format!("Tests from '{submitter}' are valid"))
}

async fn validate_progs(state_dir: &StateDir, submitter_or_id: &str) -> Result<String, String> {
	let submitter = resolve_submitter(state_dir, submitter_or_id)?;
	let assignment_config = AssignmentConfig::load(state_dir).map_err(|e| e.to_string())?;
	let adapter = tourney_node_core_adapter::build_adapter(&assignment_config.assignment_type, &assignment_config.source_assg_dir).map_err(|e| e.to_string())?;
	tourney_node_core_validator::validate_progs(state_dir, adapter.as_ref(), &submitter).await.map_err(|e| e.to_string())?;
	Ok(format!("Programs under test from '{submitter}' are valid"))
}

async fn submit(state_dir: &StateDir, submitter_or_id: &str) -> Result<String, String> {
	let submitter = resolve_submitter(state_dir, submitter_or_id)?;
	let approved = ApprovedSubmitters::load(state_dir).map_err(|e| e.to_string())?;
	tourney_node_core_validator::submit(state_dir, &approved, &submitter, Utc::now()).await.map_err(|e| e.to_string())?;
	Ok(format!("Submission from '{submitter}' accepted"))
}

fn resolve_submitter(state_dir: &StateDir, submitter_or_id: &str) -> Result<Submitter, String> {
	let approved = ApprovedSubmitters::load(state_dir).map_err(|e| e.to_string())?;
	approved.resolve(submitter_or_id).ok_or_else(|| format!("Submitter '{submitter_or_id}' is not on the approved submitters list."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clean_refuses_while_tournament_is_online() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		set_flag(state_dir.root(), &TourneyFlag::Alive, true, "").unwrap();

		let err = clean(&state_dir).unwrap_err();
		assert!(err.contains("currently online"));
	}

	#[test]
	fn shutdown_refuses_when_already_offline() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let err = shutdown(&state_dir, "bye").unwrap_err();
		assert!(err.contains("already offline"));
	}

	#[test]
	fn check_config_reports_every_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let err = check_config(&state_dir).unwrap_err();
		assert!(err.contains("assignment config"));
		assert!(err.contains("not been configured correctly"));
	}
}
