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

//! Typed JSON configuration files, ported from `tournament/config/files/*.py`.
//! Every config struct follows the same bootstrap rule the original
//! establishes: if the file is missing, write a default copy and fail loudly
//! so the operator edits it before the tournament starts.

mod approved_submitters;
mod assignment_config;
mod email_config;
mod error;
pub mod paths;
mod server_config;

pub use approved_submitters::{ApprovedSubmitters, SubmissionWindow, SubmitterEntry};
pub use assignment_config::AssignmentConfig;
pub use email_config::EmailConfig;
pub use error::ConfigError;
pub use server_config::ServerConfig;

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Load a JSON config file, writing `default` and returning
/// [`ConfigError::MissingDefaultWritten`] if it does not yet exist.
/// Matches every `_write_default` / `NoConfigDefined` pair in the original.
pub(crate) fn load_strict<T: DeserializeOwned + Serialize>(
	path: &Path,
	default: &T,
) -> Result<T, ConfigError> {
	if !path.exists() {
		write_default(path, default)?;
		return Err(ConfigError::MissingDefaultWritten { path: path.to_path_buf() });
	}
	read(path)
}

/// Load a JSON config file, writing and using `default` in place if it does
/// not yet exist, without failing. Matches `ServerConfig`'s lenient bootstrap.
pub(crate) fn load_lenient<T: DeserializeOwned + Serialize + Clone>(
	path: &Path,
	default: &T,
) -> Result<T, ConfigError> {
	if !path.exists() {
		tracing::info!(?path, "no config file found, writing default");
		write_default(path, default)?;
		return Ok(default.clone());
	}
	read(path)
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
	let contents = std::fs::read_to_string(path)
		.map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
	serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

fn write_default<T: Serialize>(path: &Path, default: &T) -> Result<(), ConfigError> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
	}
	let contents = serde_json::to_string_pretty(default).expect("config defaults always serialize");
	std::fs::write(path, contents).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}
