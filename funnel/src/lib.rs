#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate log;

mod config;
pub mod connection;
mod error;
pub mod rooms;
mod server;

pub use config::{Config, ConfigError};
pub use error::FunnelError;
pub use rooms::{Connection, Flow, Frame, Rejection, Rooms};
pub use server::Server;
