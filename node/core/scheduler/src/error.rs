use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("i/o error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	State(#[from] tourney_node_core_state::StateError),

	#[error(transparent)]
	Snapshot(#[from] tourney_node_core_snapshot::SnapshotError),

	#[error(transparent)]
	Queue(#[from] tourney_node_core_queue::QueueError),

	#[error("failed to parse {path}: {source}")]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to read/write {path}: {source}")]
	Csv {
		path: PathBuf,
		#[source]
		source: csv::Error,
	},

	#[error("unrecognised value '{value}' in the invalid? column for {submitter}/{prog}")]
	UnrecognisedInvalidMarker { value: String, submitter: String, prog: String },

	#[error("a head-to-head worker task panicked: {0}")]
	WorkerPanicked(String),
}
