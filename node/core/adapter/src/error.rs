use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
	#[error("failed to read assignment directory {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("preparing submission failed: {0}")]
	PreparationFailed(String),

	#[error("unknown assignment type '{0}'")]
	UnknownAssignmentType(String),
}
