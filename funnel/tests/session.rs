use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::RoomReply;
use funnel::{Config, Server};
use serde_json::{json, Value};
use tungstenite::http::StatusCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

type Client = WebSocket<MaybeTlsStream<TcpStream>>;

fn start() -> (Arc<Server>, SocketAddr) {
    let config = Config {
        host: "127.0.0.1:0".parse().unwrap(),
        poll_interval: Duration::from_millis(10),
        evict_empty_rooms: true,
    };
    let server = Arc::new(Server::bind(config).unwrap());
    let addr = server.local_addr().unwrap();
    let acceptor = Arc::clone(&server);
    thread::spawn(move || acceptor.run());
    (server, addr)
}

fn open(addr: SocketAddr, path: &str) -> Client {
    let url = format!("ws://{}{}", addr, path);
    let (client, _) = tungstenite::connect(url.as_str()).unwrap();
    if let MaybeTlsStream::Plain(stream) = client.get_ref() {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
    }
    client
}

fn lobby(addr: SocketAddr, path: &str) -> RoomReply {
    let mut client = open(addr, path);
    let reply = client.read().unwrap();
    serde_json::from_str(reply.to_text().unwrap()).unwrap()
}

fn seat(reply: RoomReply) -> (String, String) {
    match reply {
        RoomReply::Joined { room, id, .. } => (room, id),
        RoomReply::Rejected { message, .. } => panic!("rejected: {}", message),
    }
}

fn session(addr: SocketAddr, room: &str, user: &str) -> Client {
    open(addr, &format!("/chess/ws?room={}&user={}", room, user))
}

/// Next envelope as `(author, content)`.
fn next(client: &mut Client) -> (String, Value) {
    loop {
        match client.read().unwrap() {
            Message::Text(text) => {
                let mut envelope: Value = serde_json::from_str(&text).unwrap();
                let author = envelope["author"].as_str().unwrap().to_owned();
                return (author, envelope["content"].take());
            }
            _ => continue,
        }
    }
}

fn send(client: &mut Client, content: Value) {
    client.send(Message::text(content.to_string())).unwrap();
}

#[test]
fn two_players_meet_and_trade_moves() {
    let (server, addr) = start();
    let (room, white_id) = seat(lobby(addr, "/chess/new"));
    let (joined_room, black_id) = seat(lobby(addr, &format!("/chess/join?room={}", room)));
    assert_eq!(joined_room, room);

    let mut white = session(addr, &room, &white_id);
    let (_, greeting) = next(&mut white);
    assert_eq!(greeting["type"], "state");
    assert_eq!(greeting["color"], "white");

    let mut black = session(addr, &room, &black_id);
    let (_, greeting) = next(&mut black);
    assert_eq!(greeting["color"], "black");
    assert_eq!(
        next(&mut white),
        (black_id.clone(), json!({"type": "cmd", "msg": "connected"}))
    );

    send(&mut white, json!({"type": "move", "from": 12, "to": 28}));
    assert_eq!(
        next(&mut black),
        (
            white_id.clone(),
            json!({"type": "move", "src": "12", "dst": "28", "taken": "false"})
        )
    );

    // Out of turn: only the mover hears about it.
    send(&mut white, json!({"type": "move", "from": "11", "to": "27"}));
    let (author, error) = next(&mut white);
    assert_eq!(author, white_id);
    assert_eq!(error["type"], "error");
    assert_eq!(error["msg"], "not your turn");
    assert_eq!(error["src"], "11");

    // Garbage is dropped without ending the session.
    send(&mut black, json!({"type": "dance"}));
    send(
        &mut black,
        json!({"author": black_id, "content": {"type": "move", "from": "52", "to": "36"}}),
    );
    assert_eq!(next(&mut white).1["dst"], "36");

    send(&mut black, json!({"type": "cmd", "msg": "quit"}));
    assert_eq!(
        next(&mut white),
        (black_id, json!({"type": "cmd", "msg": "disconnected"}))
    );

    server.shutdown();
}

#[test]
fn lobby_turns_away_strangers() {
    let (server, addr) = start();

    let missing = lobby(addr, &format!("/chess/join?room={}", common::RoomId::new()));
    assert_eq!(missing, RoomReply::rejected("room not found"));

    let (room, white_id) = seat(lobby(addr, "/chess/new"));
    seat(lobby(addr, &format!("/chess/join?room={}", room)));
    let full = lobby(addr, &format!("/chess/join?room={}", room));
    assert_eq!(full, RoomReply::rejected("room full"));

    let url = format!(
        "ws://{}/chess/ws?room={}&user={}",
        addr,
        room,
        common::ParticipantId::new()
    );
    match tungstenite::connect(url.as_str()) {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST)
        }
        other => panic!("handshake should be refused, got {:?}", other.map(|_| ())),
    }

    // Wait for the greeting so the first session is registered.
    let mut white = session(addr, &room, &white_id);
    assert_eq!(next(&mut white).1["type"], "state");
    let twice = format!("ws://{}/chess/ws?room={}&user={}", addr, room, white_id);
    assert!(tungstenite::connect(twice.as_str()).is_err());

    server.shutdown();
}

#[test]
fn shutdown_closes_live_sessions() {
    let (server, addr) = start();
    let (room, white_id) = seat(lobby(addr, "/chess/new"));
    let mut white = session(addr, &room, &white_id);
    next(&mut white);

    let started = Instant::now();
    server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    let closed = loop {
        match white.read() {
            Ok(Message::Close(_)) => break true,
            Ok(_) => continue,
            Err(_) => break false,
        }
    };
    assert!(closed);
    assert!(server.rooms().is_empty());
}
