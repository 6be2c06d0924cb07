use crate::error::ConfigError;
use crate::{load_lenient, paths::StateDir};
use serde::{Deserialize, Serialize};
use tourney_primitives::Outcome;

/// Configuration for the hosting of the results server. Ported from
/// `tournament/config/files/server_config.py`; unlike the other config
/// files this one is loaded leniently, writing and using a default in place
/// rather than failing the tournament startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
	pub host: String,
	pub port: u16,
}

impl ServerConfig {
	pub fn default_config() -> Self {
		Self { host: "127.0.0.1".to_string(), port: 8080 }
	}

	pub fn load(state_dir: &StateDir) -> Result<Self, ConfigError> {
		load_lenient(&state_dir.server_config(), &Self::default_config())
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Report where the results server will listen on tournament start up.
	pub fn check_server_config(&self) -> Outcome {
		Outcome::ok(format!("Server is listening on {}:{}\n", self.host(), self.port()))
	}
}
