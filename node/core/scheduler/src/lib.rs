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

//! The tournament daemon: the poll loop, submission processing, and the
//! post-tournament diff-audit workflow, ported from
//! `original_source/tournament/daemon/main.py` and
//! `original_source/tournament/processing/main.py`.

mod diffs;
mod error;
mod processing;
mod scratch;

pub use diffs::{get_diffs, rescore_invalid_progs};
pub use error::SchedulerError;
pub use processing::{process_submission, run_submission};
pub use scratch::ScratchPool;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tourney_config::paths::StateDir;
use tourney_config::{ApprovedSubmitters, EmailConfig};
use tourney_node_core_adapter::AssignmentAdapter;
use tourney_node_core_flags::{get_flag, set_flag, TourneyFlag};
use tourney_node_core_queue::{peek_oldest, QueueEntry};
use tourney_node_core_snapshot::Snapshot;
use tourney_node_core_state::TournamentState;
use tourney_primitives::Submitter;

const LOG_TARGET: &str = "scheduler";
const POLL_EMPTY_QUEUE: Duration = Duration::from_secs(60);

/// `true` iff the daemon is running and has not been asked to shut down.
pub fn is_alive(state_dir: &StateDir) -> bool {
	get_flag(state_dir.root(), &TourneyFlag::Alive).success && !get_flag(state_dir.root(), &TourneyFlag::Shutdown).success
}

/// Ask a running daemon to shut down on its next poll cycle.
pub fn request_shutdown(state_dir: &StateDir, message: &str) -> std::io::Result<()> {
	set_flag(state_dir.root(), &TourneyFlag::Shutdown, true, message)
}

/// Run the daemon's main loop until shut down, until a fatal error occurs,
/// or until the `alive` flag disappears out from under it. `now` is
/// injected for testability; in production it is always `Utc::now`.
pub async fn run(
	state_dir: &StateDir,
	approved: &ApprovedSubmitters,
	adapter: Arc<dyn AssignmentAdapter>,
	email_config: Option<&EmailConfig>,
	worker_slots: usize,
	mut now: impl FnMut() -> DateTime<Utc>,
) -> Result<(), SchedulerError> {
	set_flag(state_dir.root(), &TourneyFlag::Alive, true, "")
		.map_err(|source| SchedulerError::Io { path: state_dir.alive_flag(), source })?;
	set_flag(state_dir.root(), &TourneyFlag::Shutdown, false, "")
		.map_err(|source| SchedulerError::Io { path: state_dir.shutdown_flag(), source })?;

	let approved_submitters: Vec<Submitter> = approved.submitters.keys().map(|name| Submitter::from(name.as_str())).collect();
	let mut state = TournamentState::load(state_dir, &approved_submitters, adapter.tests(), adapter.progs())?;
	let pool = ScratchPool::new(state_dir.head_to_head_dir(), worker_slots);

	Snapshot::build(&state, adapter.as_ref(), state_dir, now(), 0).write(state_dir, false)?;

	let result = run_loop(state_dir, adapter.clone(), pool, &mut state, &mut now).await;

	if let Err(ref e) = result {
		tracing::error!(target: LOG_TARGET, error = %e, "scheduler loop exited with an error");
		if let Some(config) = email_config {
			if let Err(email_err) = tourney_emailer::email_crash_report(config, &state_dir.trace_file(), &hostname()) {
				tracing::warn!(target: LOG_TARGET, error = %email_err, "failed to send crash report email");
			}
		}
	}

	set_flag(state_dir.root(), &TourneyFlag::Alive, false, "")
		.map_err(|source| SchedulerError::Io { path: state_dir.alive_flag(), source })?;
	result
}

async fn run_loop(
	state_dir: &StateDir,
	adapter: Arc<dyn AssignmentAdapter>,
	pool: Arc<ScratchPool>,
	state: &mut TournamentState,
	now: &mut impl FnMut() -> DateTime<Utc>,
) -> Result<(), SchedulerError> {
	loop {
		if get_flag(state_dir.root(), &TourneyFlag::Shutdown).success {
			tracing::info!(target: LOG_TARGET, "shutdown flag set, stopping");
			return Ok(());
		}
		if !get_flag(state_dir.root(), &TourneyFlag::Alive).success {
			tracing::warn!(target: LOG_TARGET, "alive flag disappeared, stopping");
			return Ok(());
		}

		match peek_oldest(state_dir).await? {
			None => tokio::time::sleep(POLL_EMPTY_QUEUE).await,
			Some(QueueEntry::ReportRequest { path, .. }) => {
				let snapshot = Snapshot::build(state, adapter.as_ref(), state_dir, now(), 0);
				snapshot.write(state_dir, true)?;
				tokio::fs::remove_dir_all(&path).await.map_err(|source| SchedulerError::Io { path, source })?;
			}
			Some(QueueEntry::Submission { submitter, submitted_at, path }) => {
				let elapsed_secs =
					process_submission(state_dir, adapter.clone(), pool.clone(), state, &submitter, submitted_at, &path).await?;
				let snapshot = Snapshot::build(state, adapter.as_ref(), state_dir, now(), elapsed_secs);
				snapshot.write(state_dir, false)?;
			}
		}
	}
}

fn hostname() -> String {
	std::env::var("HOSTNAME").unwrap_or_else(|_| "tourney-daemon".to_string())
}
