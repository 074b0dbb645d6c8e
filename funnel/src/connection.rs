//! One thread per socket: the handshake picks a route, then the thread either
//! answers a lobby request or pumps a game session until it ends.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{self, ErrorKind};
use std::net::TcpStream;
use std::time::Duration;

use common::{Envelope, Inbound, Outbound, ParticipantId, RoomId, RoomReply};
use crossbeam_channel::Receiver;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::{HandshakeError, Message, WebSocket};

use crate::rooms::{Flow, Frame, Rooms};

/// What the request path asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Create,
    Join(RoomId),
    Session {
        room: RoomId,
        participant: ParticipantId,
    },
}

fn refuse<R: Display>(status: StatusCode, reason: R) -> ErrorResponse {
    let mut response = ErrorResponse::new(serde_json::to_string(&RoomReply::rejected(reason)).ok());
    *response.status_mut() = status;
    response
}

fn param<T>(query: &HashMap<String, String>, name: &str) -> Result<T, ErrorResponse>
where
    T: std::str::FromStr,
{
    query
        .get(name)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| refuse(StatusCode::BAD_REQUEST, format!("missing or invalid `{}`", name)))
}

/// Maps a handshake request onto a [`Route`]. A session request must name a
/// seat that can be connected right now.
pub fn route(request: &Request, rooms: &Rooms) -> Result<Route, ErrorResponse> {
    let query: HashMap<String, String> =
        url::form_urlencoded::parse(request.uri().query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();

    match request.uri().path() {
        "/chess/new" => Ok(Route::Create),
        "/chess/join" => Ok(Route::Join(param(&query, "room")?)),
        "/chess/ws" => {
            let room = param(&query, "room")?;
            let participant = param(&query, "user")?;
            rooms
                .check_reservation(room, participant)
                .map_err(|rejection| refuse(StatusCode::BAD_REQUEST, rejection))?;
            Ok(Route::Session { room, participant })
        }
        path => Err(refuse(StatusCode::NOT_FOUND, format!("no route for {}", path))),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn normal_close() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }
}

/// Sends a normal closure and waits briefly for the peer to answer it.
fn finish(socket: &mut WebSocket<TcpStream>) {
    let _ = socket.close(Some(normal_close()));
    loop {
        match socket.read() {
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => break,
            Err(_) => break,
        }
    }
    let _ = socket.flush();
}

/// Serves one accepted TCP stream to completion.
pub fn serve(stream: TcpStream, rooms: &Rooms, poll_interval: Duration) -> tungstenite::Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_read_timeout(Some(poll_interval))?;

    let mut routed = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        routed = Some(route(request, rooms)?);
        Ok(response)
    };
    let mut handshake = tungstenite::accept_hdr(stream, callback);
    let mut socket = loop {
        match handshake {
            Ok(socket) => break socket,
            Err(HandshakeError::Interrupted(in_progress)) => handshake = in_progress.handshake(),
            Err(HandshakeError::Failure(tungstenite::Error::Http(response))) => {
                info!("Refused {}: {}", peer, response.status());
                return Ok(());
            }
            Err(HandshakeError::Failure(e)) => return Err(e),
        }
    };

    let route = match routed {
        Some(route) => route,
        None => return Ok(()),
    };
    debug!("Connection established: {} -> {:?}", peer, route);

    match route {
        Route::Create => {
            let (room, id) = rooms.create_room();
            reply(&mut socket, &RoomReply::joined(room, id))
        }
        Route::Join(room) => {
            let reply_to = match rooms.join_room(room) {
                Ok(id) => RoomReply::joined(room, id),
                Err(rejection) => {
                    info!("{} could not join {}: {}", peer, room, rejection);
                    RoomReply::rejected(rejection)
                }
            };
            reply(&mut socket, &reply_to)
        }
        Route::Session { room, participant } => session(socket, rooms, room, participant),
    }
}

fn reply(socket: &mut WebSocket<TcpStream>, reply: &RoomReply) -> tungstenite::Result<()> {
    let text = serde_json::to_string(reply).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    socket.send(Message::text(text))?;
    finish(socket);
    Ok(())
}

fn session(
    mut socket: WebSocket<TcpStream>,
    rooms: &Rooms,
    room: RoomId,
    participant: ParticipantId,
) -> tungstenite::Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    if let Err(rejection) = rooms.connect(room, participant, tx) {
        warn!("{} could not connect to {}: {}", participant, room, rejection);
        if let Ok(text) = serde_json::to_string(&Envelope::new(participant, Outbound::error(rejection))) {
            socket.send(Message::text(text))?;
        }
        finish(&mut socket);
        return Ok(());
    }

    let result = pump(&mut socket, rooms, room, participant, &rx);
    rooms.disconnect(room, participant);
    finish(&mut socket);
    result
}

/// Alternates between flushing queued events and reading the next frame. The
/// read times out every poll interval so queued events are never held long.
fn pump(
    socket: &mut WebSocket<TcpStream>,
    rooms: &Rooms,
    room: RoomId,
    participant: ParticipantId,
    outbox: &Receiver<Frame>,
) -> tungstenite::Result<()> {
    loop {
        for frame in outbox.try_iter() {
            match frame {
                Frame::Text(text) => socket.send(Message::text(text))?,
                Frame::Close => {
                    debug!("Closing session of {}", participant);
                    return Ok(());
                }
            }
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Badly formatted binary received from {}: {}", participant, e);
                    continue;
                }
            },
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => continue,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(e),
        };

        let inbound = match Inbound::decode(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Dropping message from {}: {}: \"{}\"", participant, e, text);
                continue;
            }
        };
        debug!("Received from {}: {:?}", participant, inbound);
        if rooms.handle(room, participant, inbound) == Flow::Quit {
            info!("{} quit", participant);
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn lobby_routes() {
        let rooms = Rooms::new(true);
        assert_eq!(route(&request("/chess/new"), &rooms).unwrap(), Route::Create);

        let room = RoomId::new();
        let uri = format!("/chess/join?room={}", room);
        assert_eq!(route(&request(&uri), &rooms).unwrap(), Route::Join(room));
    }

    #[test]
    fn bad_requests_are_refused() {
        let rooms = Rooms::new(true);

        let missing = route(&request("/chess/join"), &rooms).unwrap_err();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let garbled = route(&request("/chess/join?room=nope"), &rooms).unwrap_err();
        assert_eq!(garbled.status(), StatusCode::BAD_REQUEST);

        let unknown = route(&request("/chess/elsewhere"), &rooms).unwrap_err();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sessions_need_a_free_seat() {
        let rooms = Rooms::new(true);
        let (room, white) = rooms.create_room();

        let uri = format!("/chess/ws?room={}&user={}", room, white);
        assert_eq!(
            route(&request(&uri), &rooms).unwrap(),
            Route::Session {
                room,
                participant: white,
            }
        );

        let stranger = format!("/chess/ws?room={}&user={}", room, ParticipantId::new());
        let refused = route(&request(&stranger), &rooms).unwrap_err();
        assert_eq!(refused.status(), StatusCode::BAD_REQUEST);
        let body: RoomReply = serde_json::from_str(refused.body().as_deref().unwrap()).unwrap();
        assert_eq!(body, RoomReply::rejected("user is not in the room"));
    }
}
