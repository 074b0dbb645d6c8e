use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::{Config, ConfigError};
use crate::connection;
use crate::error::FunnelError;
use crate::rooms::Rooms;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Server {
    config: Config,
    listener: TcpListener,
    rooms: Arc<Rooms>,
    // Every connection thread holds a clone; `None` once shutting down.
    sessions: Mutex<Option<Sender<()>>>,
    // Disconnects when the last connection thread has finished.
    drained: Receiver<()>,
}

impl Server {
    pub fn bind(config: Config) -> Result<Server, FunnelError> {
        if config.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval.into());
        }
        let listener = TcpListener::bind(config.host).map_err(|source| FunnelError::Bind {
            addr: config.host,
            source,
        })?;
        info!(
            "Listening on {}",
            listener.local_addr().unwrap_or(config.host)
        );

        let (sessions, drained) = crossbeam_channel::bounded(0);
        Ok(Server {
            rooms: Arc::new(Rooms::new(config.evict_empty_rooms)),
            config,
            listener,
            sessions: Mutex::new(Some(sessions)),
            drained,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn rooms(&self) -> Arc<Rooms> {
        Arc::clone(&self.rooms)
    }

    /// Accepts connections until [`Server::shutdown`] is called, serving each
    /// on its own thread.
    pub fn run(&self) {
        for stream in self.listener.incoming() {
            let session = match *self.sessions.lock() {
                Some(ref sessions) => sessions.clone(),
                None => break,
            };
            match stream {
                Ok(stream) => self.spawn(stream, session),
                Err(e) => warn!("Client accept failed: {}", e),
            }
        }
        debug!("Accept loop finished");
    }

    fn spawn(&self, stream: TcpStream, session: Sender<()>) {
        let rooms = Arc::clone(&self.rooms);
        let poll_interval = self.config.poll_interval;

        let spawned = thread::Builder::new()
            .name("connection".to_owned())
            .spawn(move || {
                if let Err(e) = connection::serve(stream, &rooms, poll_interval) {
                    warn!("Connection ended with an error: {}", e);
                }
                drop(session);
            });
        if let Err(e) = spawned {
            error!("Could not spawn a connection thread: {}", e);
        }
    }

    /// Closes every room, waits a moment for connections to wind down and
    /// stops the accept loop.
    pub fn shutdown(&self) {
        if self.sessions.lock().take().is_none() {
            return;
        }
        self.rooms.close();

        match self.drained.recv_timeout(SHUTDOWN_GRACE) {
            Err(RecvTimeoutError::Timeout) => warn!("Connections still open at shutdown"),
            _ => debug!("All connections finished"),
        }

        // Wake the accept loop so it sees the server is stopping.
        if let Ok(addr) = self.local_addr() {
            let _ = TcpStream::connect(addr);
        }
        info!("Server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn config() -> Config {
        Config {
            host: "127.0.0.1:0".parse().unwrap(),
            ..Config::default()
        }
    }

    #[test]
    fn zero_poll_interval_is_refused_at_bind() {
        let config = Config {
            poll_interval: Duration::ZERO,
            ..config()
        };
        assert!(matches!(
            Server::bind(config),
            Err(FunnelError::Config(ConfigError::ZeroPollInterval))
        ));
    }

    #[test]
    fn shutdown_waits_for_running_sessions() {
        let server = Server::bind(config()).unwrap();
        let session = server.sessions.lock().clone().unwrap();
        let finished = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drop(session);
        });

        let started = Instant::now();
        server.shutdown();
        assert!(started.elapsed() >= Duration::from_millis(100));
        finished.join().unwrap();
        assert!(server.sessions.lock().is_none());
        assert!(matches!(
            server.drained.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
        // A second shutdown is a no-op.
        server.shutdown();
    }
}
