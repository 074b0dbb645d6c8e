#[macro_use]
extern crate log;

use std::env;
use std::process;
use std::sync::Arc;
use std::thread;

use env_logger::Env;
use funnel::{Config, FunnelError, Server};

fn run() -> Result<(), FunnelError> {
    let config = match env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => {
            info!("No config file given, using defaults");
            Config::default()
        }
    };

    let server = Arc::new(Server::bind(config)?);

    let (stop, stopped) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop.try_send(());
    })?;

    let acceptor = Arc::clone(&server);
    thread::spawn(move || acceptor.run());

    let _ = stopped.recv();
    info!("Interrupted, shutting down");
    server.shutdown();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}
