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

//! The results HTTP server: a single-page live scoreboard re-read from the
//! published snapshot on every request, ported from
//! `original_source/tournament/reporting/results_server.py`.

mod error;

pub use error::ResultsServerError;

use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tourney_config::paths::StateDir;
use tourney_node_core_flags::{get_flag, TourneyFlag};
use tourney_node_core_snapshot::Snapshot;

const LOG_TARGET: &str = "results_server";
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
	state_dir: Arc<StateDir>,
}

#[derive(Template)]
#[template(path = "results.html")]
struct ResultsTemplate {
	snapshot_date: String,
	queued_submissions: usize,
	last_submission_secs: u64,
	rows: Vec<ResultsRow>,
}

struct ResultsRow {
	rank: usize,
	submitter: String,
	test_score: String,
	prog_score: String,
	total: String,
}

/// Build the results router: `GET /` serves the scoreboard, `HEAD` is
/// derived automatically by axum, every other method gets `501 NOT
/// IMPLEMENTED` the way the original handler's `do_POST` did.
fn router(state_dir: StateDir) -> Router {
	let state = AppState { state_dir: Arc::new(state_dir) };
	Router::new().route("/", get(index).fallback(not_implemented)).fallback(not_implemented).with_state(state)
}

async fn index(State(state): State<AppState>) -> Response {
	let results_path = state.state_dir.results_file();
	let snapshot = match Snapshot::load(&results_path) {
		Ok(snapshot) => snapshot,
		Err(e) => {
			tracing::warn!(target: LOG_TARGET, error = %e, "no snapshot published yet");
			return (StatusCode::SERVICE_UNAVAILABLE, "tournament has not produced a snapshot yet").into_response();
		}
	};

	let queued_submissions = count_queued_submissions(&state.state_dir);
	let template = ResultsTemplate {
		snapshot_date: snapshot.snapshot_date.to_rfc2822(),
		queued_submissions,
		last_submission_secs: snapshot.time_to_process_last_submission_secs,
		rows: ranked_rows(&snapshot),
	};

	match template.render() {
		Ok(body) => Html(body).into_response(),
		Err(e) => {
			tracing::error!(target: LOG_TARGET, error = %e, "failed to render results template");
			(StatusCode::INTERNAL_SERVER_ERROR, "failed to render results").into_response()
		}
	}
}

/// Rank submitters by `normalised_test_score + normalised_prog_score`
/// descending; ties share a rank, matching
/// `results_server.py::_table_body_from_results`.
fn ranked_rows(snapshot: &Snapshot) -> Vec<ResultsRow> {
	let mut entries: Vec<(&tourney_primitives::Submitter, f64)> = snapshot
		.results
		.iter()
		.map(|(submitter, result)| (submitter, result.normalised_test_score + result.normalised_prog_score))
		.collect();
	entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

	let mut rows = Vec::with_capacity(entries.len());
	let mut rank = 0;
	let mut prev_score: Option<f64> = None;
	for (position, (submitter, total)) in entries.into_iter().enumerate() {
		if prev_score != Some(total) {
			rank = position + 1;
		}
		prev_score = Some(total);

		let result = &snapshot.results[submitter];
		rows.push(ResultsRow {
			rank,
			submitter: submitter.to_string(),
			test_score: format!("{:.2}", result.normalised_test_score),
			prog_score: format!("{:.2}", result.normalised_prog_score),
			total: format!("{:.2}", total),
		});
	}
	rows
}

/// Count submissions waiting in the queue, ignoring hidden entries (flag
/// files live alongside queue directories under the same root).
fn count_queued_submissions(state_dir: &StateDir) -> usize {
	let Ok(entries) = std::fs::read_dir(state_dir.staging_dir()) else { return 0 };
	entries
		.filter_map(|e| e.ok())
		.filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
		.count()
}

async fn not_implemented() -> impl IntoResponse {
	(StatusCode::NOT_IMPLEMENTED, "this server only implements GET /")
}

/// Serve the scoreboard until the daemon's `alive` flag disappears, then
/// shut down gracefully. Ported from `results_server.py::main` and its
/// `_server_assassin` watchdog thread.
pub async fn serve(state_dir: StateDir, host: &str, port: u16) -> Result<(), ResultsServerError> {
	let watchdog_dir = state_dir.root().to_path_buf();
	let app = router(state_dir);

	let listener = tokio::net::TcpListener::bind((host, port)).await.map_err(ResultsServerError::Bind)?;
	tracing::info!(target: LOG_TARGET, %host, port, "results server listening");

	axum::serve(listener, app).with_graceful_shutdown(watch_alive(watchdog_dir)).await.map_err(ResultsServerError::Bind)
}

async fn watch_alive(root: std::path::PathBuf) {
	loop {
		tokio::time::sleep(WATCHDOG_INTERVAL).await;
		if !get_flag(&root, &TourneyFlag::Alive).success {
			tracing::info!(target: LOG_TARGET, "alive flag disappeared, shutting down results server");
			return;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use chrono::{TimeZone, Utc};
	use tourney_node_core_snapshot::SubmitterResult;
	use tourney_primitives::Submitter;
	use tower::ServiceExt;

	fn snapshot_with(scores: &[(&str, f64, f64)]) -> Snapshot {
		let mut results = std::collections::BTreeMap::new();
		for (name, test_score, prog_score) in scores {
			results.insert(
				Submitter::from(*name),
				SubmitterResult {
					latest_submission_date: None,
					tests: Default::default(),
					progs: Default::default(),
					average_tests_per_suite: 1.0,
					average_bugs_detected: 0.0,
					average_tests_evaded: 0.0,
					normalised_test_score: *test_score,
					normalised_prog_score: *prog_score,
				},
			);
		}
		Snapshot {
			snapshot_date: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
			time_to_process_last_submission_secs: 3,
			num_submitters: results.len(),
			results,
			best_average_bugs_detected: 0.0,
			best_average_tests_evaded: 0.0,
		}
	}

	#[test]
	fn tied_scores_share_a_rank() {
		let snapshot = snapshot_with(&[("alice", 2.0, 1.0), ("bob", 1.5, 1.5), ("carol", 1.0, 1.0)]);
		let rows = ranked_rows(&snapshot);
		let by_name: std::collections::HashMap<_, _> = rows.iter().map(|r| (r.submitter.clone(), r.rank)).collect();
		assert_eq!(by_name["alice"], 1, "alice and bob are tied at 3.0 total, so both rank first");
		assert_eq!(by_name["bob"], 1);
		assert_eq!(by_name["carol"], 3, "carol is strictly lower, so the next rank skips past the tie");
	}

	#[tokio::test]
	async fn get_root_without_a_snapshot_reports_service_unavailable() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let app = router(state_dir);

		let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[tokio::test]
	async fn get_root_renders_the_published_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		snapshot_with(&[("alice", 2.5, 1.0)]).write(&state_dir, false).unwrap();
		let app = router(state_dir);

		let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let html = String::from_utf8(body.to_vec()).unwrap();
		assert!(html.contains("alice"));
	}

	#[tokio::test]
	async fn post_is_rejected_as_not_implemented() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let app = router(state_dir);

		let response =
			app.oneshot(Request::builder().method("POST").uri("/").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
	}
}
