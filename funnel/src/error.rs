use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the server process.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("could not install the interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
