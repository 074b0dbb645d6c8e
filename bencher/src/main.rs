//! Drives a running funnel: opens rooms, seats two players in each and plays
//! a short opening followed by random drags, counting what the server accepts.

#[macro_use]
extern crate log;

use std::env;
use std::net::TcpStream;
use std::process;
use std::time::{Duration, Instant};

use common::{Envelope, RoomReply};
use env_logger::Env;
use rand::Rng;
use serde_json::{json, Value};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;
type BoxError = Box<dyn std::error::Error>;

const OPENING: [(u8, u8); 4] = [(12, 28), (51, 35), (28, 35), (59, 35)];
const RANDOM_DRAGS: usize = 200;
const READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Tally {
    accepted: usize,
    rejected: usize,
    // The server only flips the turn on an accepted move.
    black_to_move: bool,
}

impl Tally {
    fn record(&mut self, accepted: bool) {
        if accepted {
            self.accepted += 1;
            self.black_to_move = !self.black_to_move;
        } else {
            self.rejected += 1;
        }
    }
}

fn open(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<Socket, BoxError> {
    let mut url = base.join(path)?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    let (socket, _) = tungstenite::connect(url.as_str())?;
    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
    }
    Ok(socket)
}

fn lobby(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<(String, String), BoxError> {
    let mut socket = open(base, path, query)?;
    let reply: RoomReply = serde_json::from_str(socket.read()?.to_text()?)?;
    let _ = socket.close(None);
    match reply {
        RoomReply::Joined { room, id, .. } => Ok((room, id)),
        RoomReply::Rejected { message, .. } => Err(message.into()),
    }
}

/// Content of every event waiting on `socket`, stopping at the first read
/// timeout.
fn drain(socket: &mut Socket) -> Result<Vec<Value>, BoxError> {
    let mut events = Vec::new();
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<Envelope<Value>>(&text) {
                Ok(envelope) => events.push(envelope.content),
                Err(e) => warn!("Unreadable event {}: {}", text, e),
            },
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(events)
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn drag(socket: &mut Socket, from: u8, to: u8) -> Result<bool, BoxError> {
    let content = json!({"type": "move", "from": from.to_string(), "to": to.to_string()});
    socket.send(Message::text(content.to_string()))?;
    let rejected = drain(socket)?
        .iter()
        .any(|event| event["type"] == "error");
    Ok(!rejected)
}

fn play_room(base: &Url) -> Result<Tally, BoxError> {
    let (room, white_id) = lobby(base, "chess/new", &[])?;
    let (_, black_id) = lobby(base, "chess/join", &[("room", &room)])?;
    let mut white = open(base, "chess/ws", &[("room", &room), ("user", &white_id)])?;
    drain(&mut white)?;
    let mut black = open(base, "chess/ws", &[("room", &room), ("user", &black_id)])?;
    drain(&mut black)?;
    drain(&mut white)?;

    let mut tally = Tally::default();
    let mut rng = rand::thread_rng();
    let drags = OPENING
        .iter()
        .copied()
        .chain((0..RANDOM_DRAGS).map(|_| (rng.gen_range(0..64), rng.gen_range(0..64))));

    for (from, to) in drags {
        let mover = if tally.black_to_move {
            &mut black
        } else {
            &mut white
        };
        let accepted = drag(mover, from, to)?;
        tally.record(accepted);
    }

    for socket in [&mut white, &mut black] {
        socket.send(Message::text(json!({"type": "cmd", "msg": "quit"}).to_string()))?;
        let _ = socket.close(None);
    }
    Ok(tally)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("USAGE: bencher ws://host:port/ [rooms]");
        process::exit(1);
    }
    let base = match Url::parse(&args[1]) {
        Ok(base) => base,
        Err(e) => {
            error!("Bad server url {}: {}", args[1], e);
            process::exit(1);
        }
    };
    let rooms: usize = args.get(2).and_then(|n| n.parse().ok()).unwrap_or(1);

    let started = Instant::now();
    let mut total = Tally::default();
    for index in 0..rooms {
        match play_room(&base) {
            Ok(tally) => {
                debug!(
                    "Room {}: {} accepted, {} rejected",
                    index, tally.accepted, tally.rejected
                );
                total.accepted += tally.accepted;
                total.rejected += tally.rejected;
            }
            Err(e) => warn!("Room {} failed: {}", index, e),
        }
    }
    info!(
        "{} rooms in {:?}: {} moves accepted, {} rejected",
        rooms,
        started.elapsed(),
        total.accepted,
        total.rejected
    );
}
