use std::fs::File;
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: SocketAddr,
    /// How long a connection blocks on its socket before checking its
    /// outbound queue again.
    pub poll_interval: Duration,
    pub evict_empty_rooms: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8090)),
            poll_interval: Duration::from_millis(50),
            evict_empty_rooms: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config file incorrectly formatted: {0}")]
    Format(#[from] toml::de::Error),
    #[error("poll_interval must be greater than zero")]
    ZeroPollInterval,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_owned(),
            source,
        };

        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(io_error)?;
        Config::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        // Sockets refuse a zero read timeout.
        if config.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(config)
    }
}
