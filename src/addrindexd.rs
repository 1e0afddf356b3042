use crate::{
    address::DEFAULT_PREFIX,
    config::{datadir_path, Config, ConfigError},
    resolver::Consistency,
};

use std::{
    fs, net::SocketAddr, os::unix::fs::DirBuilderExt, path::PathBuf, str::FromStr,
    time::Duration,
};

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AddrIndexD {
    // Misc daemon stuff
    pub data_dir: PathBuf,
    pub daemon: bool,
    pub listen: SocketAddr,

    // The ledger database
    pub postgres_config: tokio_postgres::Config,
    pub max_connections: usize,
    pub query_timeout: Duration,

    pub network_prefix: String,
    pub consistency: Consistency,
}

fn create_datadir(datadir_path: &PathBuf) -> Result<(), std::io::Error> {
    let mut builder = fs::DirBuilder::new();
    builder.mode(0o700).recursive(true).create(datadir_path)
}

impl AddrIndexD {
    pub fn from_config(config: Config) -> Result<AddrIndexD, Box<dyn std::error::Error>> {
        let mut data_dir = config.data_dir.unwrap_or(datadir_path()?);
        if !data_dir.as_path().exists() {
            if let Err(e) = create_datadir(&data_dir) {
                return Err(Box::from(ConfigError(format!(
                    "Could not create data dir '{:?}': {}.",
                    data_dir,
                    e.to_string()
                ))));
            }
        }
        data_dir = fs::canonicalize(data_dir)?;
        let daemon = config.daemon.unwrap_or(false);
        let listen = config
            .listen
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8484)));

        let postgres_config = tokio_postgres::Config::from_str(&config.postgres_uri)?;
        let max_connections = config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let query_timeout = config
            .query_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_QUERY_TIMEOUT);

        let network_prefix = config
            .network_prefix
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let consistency = config.consistency.unwrap_or(Consistency::Indexed);

        Ok(AddrIndexD {
            data_dir,
            daemon,
            listen,
            postgres_config,
            max_connections,
            query_timeout,
            network_prefix,
            consistency,
        })
    }

    fn file_from_datadir(&self, file_name: &str) -> PathBuf {
        let data_dir_str = self
            .data_dir
            .to_str()
            .expect("Impossible: the datadir path is valid unicode");

        [data_dir_str, file_name].iter().collect()
    }

    pub fn pid_file(&self) -> PathBuf {
        self.file_from_datadir("kaspa_addrindexd.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.file_from_datadir("log")
    }
}
