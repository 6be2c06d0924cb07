use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors are fatal at startup: the operator must fix the
/// named file and retry, matching spec.md §7's "Configuration errors" class.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no config file found at {path}; a default one has been written, please edit it")]
	MissingDefaultWritten { path: PathBuf },

	#[error("failed to read config file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("config file {path} is still set to its default, placeholder values")]
	StillDefault { path: PathBuf },

	#[error("{0}")]
	Invalid(String),
}
