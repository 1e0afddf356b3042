use crate::resolver::Consistency;

use std::{net::SocketAddr, path::PathBuf};

use serde::Deserialize;

/// Static informations we require to operate
#[derive(Debug, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URI of the ledger database, as specified in
    /// https://www.postgresql.org/docs/current/libpq-connect.html#LIBPQ-CONNSTRING
    pub postgres_uri: String,
    /// An optional custom data directory
    pub data_dir: Option<PathBuf>,
    /// Whether to daemonize the process
    pub daemon: Option<bool>,
    /// What messages to log
    pub log_level: Option<String>,
    /// <ip:port> to bind to
    pub listen: Option<SocketAddr>,
    /// How many connections to the database we may have open at once
    pub max_connections: Option<usize>,
    /// How long a single store access may take, in seconds
    pub query_timeout_secs: Option<u64>,
    /// The address prefix of the network we are serving, eg "kaspatest"
    pub network_prefix: Option<String>,
    /// What to use for requests that don't specify it
    pub consistency: Option<Consistency>,
}

#[derive(PartialEq, Eq, Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Get the absolute path to our default data directory, `~/.kaspa_addrindexd/`
pub fn datadir_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|mut path| {
            path.push(".kaspa_addrindexd");
            path
        })
        .ok_or_else(|| ConfigError("Could not locate the configuration directory.".to_string()))
}

fn config_file_path() -> Result<PathBuf, ConfigError> {
    datadir_path().map(|mut path| {
        path.push("config.toml");
        path
    })
}

impl Config {
    /// Get our static configuration out of a mandatory configuration file.
    ///
    /// We require all settings to be set in the configuration file, and only in the configuration
    /// file. We don't allow to set them via the command line or environment variables to avoid a
    /// futile duplication.
    pub fn from_file(custom_path: Option<PathBuf>) -> Result<Config, ConfigError> {
        let config_file = custom_path.unwrap_or(config_file_path()?);

        let config = std::fs::read(&config_file)
            .map_err(|e| ConfigError(format!("Reading configuration file: {}", e)))
            .and_then(|file_content| {
                toml::from_slice::<Config>(&file_content)
                    .map_err(|e| ConfigError(format!("Parsing configuration file: {}", e)))
            })?;
        config.check()?;

        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_connections == Some(0) {
            return Err(ConfigError(
                "'max_connections' must be at least 1".to_string(),
            ));
        }
        if self.query_timeout_secs == Some(0) {
            return Err(ConfigError(
                "'query_timeout_secs' must be at least 1".to_string(),
            ));
        }
        if let Some(prefix) = &self.network_prefix {
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_lowercase()) {
                return Err(ConfigError(format!(
                    "Invalid network prefix '{}'",
                    prefix
                )));
            }
        }

        Ok(())
    }
}
