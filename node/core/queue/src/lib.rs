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

//! The FS-backed submission queue, ported from
//! `original_source/tournament/daemon/fs_queue.py`. Each queue entry is a
//! directory under `submissions/staged/`; its mtime is the FIFO order and
//! its name encodes the entry's kind and key fields.

mod error;

pub use error::QueueError;

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tourney_config::paths::StateDir;
use tourney_node_core_flags::{get_flag, set_flag, SubmissionFlag};
use tourney_primitives::{Submitter, DATETIME_FILE_FORMAT};

const SUBMISSION_PREFIX: &str = "submission.";
const REPORT_REQUEST_PREFIX: &str = "report_request.";
const LOG_TARGET: &str = "queue";

/// A single queue entry, parsed from its directory name.
#[derive(Debug, Clone)]
pub enum QueueEntry {
	Submission { submitter: Submitter, submitted_at: DateTime<Utc>, path: PathBuf },
	ReportRequest { requested_at: DateTime<Utc>, path: PathBuf },
}

impl QueueEntry {
	pub fn path(&self) -> &Path {
		match self {
			QueueEntry::Submission { path, .. } => path,
			QueueEntry::ReportRequest { path, .. } => path,
		}
	}

	fn parse(path: PathBuf) -> Option<Self> {
		let name = path.file_name()?.to_string_lossy().into_owned();
		if let Some(rest) = name.strip_prefix(SUBMISSION_PREFIX) {
			// the submitter name may itself contain dots, so split off only
			// the trailing timestamp component
			let (submitter, timestamp) = rest.rsplit_once('.')?;
			let submitted_at = parse_file_timestamp(timestamp)?;
			Some(QueueEntry::Submission { submitter: Submitter::from(submitter), submitted_at, path })
		} else if let Some(timestamp) = name.strip_prefix(REPORT_REQUEST_PREFIX) {
			let requested_at = parse_file_timestamp(timestamp)?;
			Some(QueueEntry::ReportRequest { requested_at, path })
		} else {
			None
		}
	}
}

fn parse_file_timestamp(s: &str) -> Option<DateTime<Utc>> {
	NaiveDateTime::parse_from_str(s, DATETIME_FILE_FORMAT).ok().map(|naive| naive.and_utc())
}

fn format_file_timestamp(time: DateTime<Utc>) -> String {
	time.format(DATETIME_FILE_FORMAT).to_string()
}

fn submission_dir_name(submitter: &Submitter, submitted_at: DateTime<Utc>) -> String {
	format!("{SUBMISSION_PREFIX}{submitter}.{}", format_file_timestamp(submitted_at))
}

fn report_request_dir_name(requested_at: DateTime<Utc>) -> String {
	format!("{REPORT_REQUEST_PREFIX}{}", format_file_timestamp(requested_at))
}

/// Scan the queue directory for the entry with the oldest mtime, skipping
/// hidden files and any submission still being copied into place (i.e.
/// missing its `SUBMISSION_READY` flag).
pub async fn peek_oldest(state_dir: &StateDir) -> Result<Option<QueueEntry>, QueueError> {
	let dir = state_dir.staging_dir();
	let mut candidates = Vec::new();

	let mut entries = match tokio::fs::read_dir(&dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(source) => return Err(QueueError::Io { path: dir, source }),
	};

	while let Some(entry) = entries.next_entry().await.map_err(|source| QueueError::Io { path: dir.clone(), source })? {
		let name = entry.file_name().to_string_lossy().into_owned();
		if name.starts_with('.') {
			continue;
		}
		let metadata =
			entry.metadata().await.map_err(|source| QueueError::Io { path: entry.path(), source })?;
		let modified = metadata.modified().map_err(|source| QueueError::Io { path: entry.path(), source })?;

		let Some(parsed) = QueueEntry::parse(entry.path()) else { continue };
		if let QueueEntry::Submission { ref path, .. } = parsed {
			if !get_flag(path, &SubmissionFlag::SubmissionReady).success {
				tracing::trace!(target: LOG_TARGET, ?path, "submission present but not yet ready");
				continue;
			}
		}
		candidates.push((modified, parsed));
	}

	candidates.sort_by_key(|(modified, _)| *modified);
	Ok(candidates.into_iter().next().map(|(_, entry)| entry))
}

/// Enqueue a staged submission. Removes the submitter's previous
/// unprocessed submissions unless a report request was queued after them
/// (so the intermediate state is still reported before being replaced).
pub async fn enqueue_submission(
	state_dir: &StateDir,
	submitter: &Submitter,
	pre_validation_dir: &Path,
	submitted_at: DateTime<Utc>,
) -> Result<PathBuf, QueueError> {
	remove_stale_occurrences(state_dir, submitter).await?;

	let staged_dir = state_dir.staging_dir().join(submission_dir_name(submitter, submitted_at));
	tokio::fs::rename(pre_validation_dir, &staged_dir)
		.await
		.map_err(|source| QueueError::Io { path: staged_dir.clone(), source })?;
	set_flag(&staged_dir, &SubmissionFlag::SubmissionReady, true, "")
		.map_err(|source| QueueError::Io { path: staged_dir.clone(), source })?;

	tracing::info!(target: LOG_TARGET, %submitter, "submission enqueued");
	Ok(staged_dir)
}

/// Enqueue a report request, causing the scheduler to republish a
/// snapshot without any state changes.
pub async fn enqueue_report_request(state_dir: &StateDir, requested_at: DateTime<Utc>) -> Result<PathBuf, QueueError> {
	let dir = state_dir.staging_dir().join(report_request_dir_name(requested_at));
	tokio::fs::create_dir_all(&dir).await.map_err(|source| QueueError::Io { path: dir.clone(), source })?;
	Ok(dir)
}

/// Remove `entry` from the queue once it has been processed.
pub async fn remove(entry: &QueueEntry) -> Result<(), QueueError> {
	tokio::fs::remove_dir_all(entry.path())
		.await
		.map_err(|source| QueueError::Io { path: entry.path().to_path_buf(), source })
}

async fn remove_stale_occurrences(state_dir: &StateDir, submitter: &Submitter) -> Result<(), QueueError> {
	let dir = state_dir.staging_dir();
	let mut entries = match tokio::fs::read_dir(&dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
		Err(source) => return Err(QueueError::Io { path: dir, source }),
	};

	let mut parsed = Vec::new();
	while let Some(entry) = entries.next_entry().await.map_err(|source| QueueError::Io { path: dir.clone(), source })? {
		if let Some(queue_entry) = QueueEntry::parse(entry.path()) {
			parsed.push(queue_entry);
		}
	}

	let latest_report_request =
		parsed.iter().filter_map(|e| if let QueueEntry::ReportRequest { requested_at, .. } = e { Some(*requested_at) } else { None }).max();

	for entry in &parsed {
		if let QueueEntry::Submission { submitter: s, submitted_at, path } = entry {
			if s != submitter {
				continue;
			}
			let superseded_by_report = latest_report_request.is_some_and(|report_time| report_time > *submitted_at);
			if superseded_by_report {
				continue;
			}
			tokio::fs::remove_dir_all(path).await.map_err(|source| QueueError::Io { path: path.clone(), source })?;
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[tokio::test]
	async fn peek_oldest_skips_unready_submissions() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let staging = state_dir.staging_dir();
		tokio::fs::create_dir_all(&staging).await.unwrap();

		let not_ready = staging.join("submission.alice.2026_01_01__00_00_00");
		tokio::fs::create_dir_all(&not_ready).await.unwrap();

		assert!(peek_oldest(&state_dir).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn peek_oldest_returns_ready_submission() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		let staging = state_dir.staging_dir();
		tokio::fs::create_dir_all(&staging).await.unwrap();

		let ready = staging.join("submission.alice.2026_01_01__00_00_00");
		tokio::fs::create_dir_all(&ready).await.unwrap();
		set_flag(&ready, &SubmissionFlag::SubmissionReady, true, "").unwrap();

		let entry = peek_oldest(&state_dir).await.unwrap().unwrap();
		match entry {
			QueueEntry::Submission { submitter, .. } => assert_eq!(submitter, Submitter::from("alice")),
			_ => panic!("expected a submission entry"),
		}
	}

	#[tokio::test]
	async fn enqueue_submission_removes_prior_unprocessed_submission() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		tokio::fs::create_dir_all(state_dir.staging_dir()).await.unwrap();

		let first_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let second_time = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
		let submitter = Submitter::from("alice");

		let pre_val_1 = dir.path().join("pre_val_1");
		tokio::fs::create_dir_all(&pre_val_1).await.unwrap();
		let first_path = enqueue_submission(&state_dir, &submitter, &pre_val_1, first_time).await.unwrap();
		assert!(first_path.exists());

		let pre_val_2 = dir.path().join("pre_val_2");
		tokio::fs::create_dir_all(&pre_val_2).await.unwrap();
		enqueue_submission(&state_dir, &submitter, &pre_val_2, second_time).await.unwrap();

		assert!(!first_path.exists());
	}

	#[tokio::test]
	async fn report_request_between_two_submissions_preserves_the_first() {
		let dir = tempfile::tempdir().unwrap();
		let state_dir = StateDir::new(dir.path());
		tokio::fs::create_dir_all(state_dir.staging_dir()).await.unwrap();

		let submitter = Submitter::from("alice");
		let first_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
		let report_time = Utc.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();
		let second_time = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();

		let pre_val_1 = dir.path().join("pre_val_1");
		tokio::fs::create_dir_all(&pre_val_1).await.unwrap();
		let first_path = enqueue_submission(&state_dir, &submitter, &pre_val_1, first_time).await.unwrap();

		enqueue_report_request(&state_dir, report_time).await.unwrap();

		let pre_val_2 = dir.path().join("pre_val_2");
		tokio::fs::create_dir_all(&pre_val_2).await.unwrap();
		enqueue_submission(&state_dir, &submitter, &pre_val_2, second_time).await.unwrap();

		assert!(first_path.exists(), "first submission must survive because a report request intervened");
	}
}
