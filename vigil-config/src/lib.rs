//! Configuration for the Vigil agent.
//!
//! Settings come from an optional JSON config file with environment
//! overrides on top, mirroring how the original deployment worked: a
//! config file next to the agent, `VIGIL_SERVER_URL` winning over whatever
//! the file says. A corrupt or missing implicit config file falls back to
//! defaults; only an explicitly requested file is a hard error.

mod loader;

pub use loader::{AgentConfig, ConfigError, ConfigSource, ENV_CONFIG_PATH, ENV_SERVER_URL};
