//! The session coordinator: every open room, who holds a seat in it and which
//! seats currently have a live connection.
//!
//! Locks are always taken map first, room second. Everything that touches a
//! room's game or reads its membership to broadcast does so under that room's
//! lock, so moves within a room are applied one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use common::{
    glyph, Action, Command, Envelope, Inbound, MoveContext, Outbound, ParticipantId, PieceColour,
    RoomId, StateChange,
};
use crossbeam_channel::Sender;
use engine::board::square_colour;
use engine::{JoinError, Match, MatchState};
use parking_lot::Mutex;
use thiserror::Error;

/// What a connection task is asked to do with its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// The outbound queue of one live WebSocket.
pub type Connection = Sender<Frame>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("room not found")]
    RoomNotFound,
    #[error("room full")]
    RoomFull,
    #[error("user is not in the room")]
    NotInRoom,
    #[error("user already connected")]
    AlreadyConnected,
}

impl From<JoinError> for Rejection {
    fn from(e: JoinError) -> Rejection {
        match e {
            JoinError::RoomFull => Rejection::RoomFull,
        }
    }
}

/// Whether a connection should keep reading after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct Seat {
    id: ParticipantId,
    connection: Option<Connection>,
}

struct Room {
    game: Match,
    seats: Vec<Seat>,
    // Set once the room has been evicted or the server is closing.
    closed: bool,
}

fn encode(author: ParticipantId, event: &Outbound) -> Option<String> {
    match serde_json::to_string(&Envelope::new(author, event)) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Could not encode {:?}: {}", event, e);
            None
        }
    }
}

fn deliver(seat: &Seat, text: &str) {
    if let Some(ref connection) = seat.connection {
        if connection.send(Frame::Text(text.to_owned())).is_err() {
            debug!("Connection of {} is gone", seat.id);
        }
    }
}

impl Room {
    fn new(creator: ParticipantId) -> Room {
        Room {
            game: Match::new(creator),
            seats: vec![Seat {
                id: creator,
                connection: None,
            }],
            closed: false,
        }
    }

    fn seat_mut(&mut self, participant: ParticipantId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|seat| seat.id == participant)
    }

    fn connected(&self) -> usize {
        self.seats
            .iter()
            .filter(|seat| seat.connection.is_some())
            .count()
    }

    /// Nobody is connected and no reservation is worth keeping: seats of an
    /// unfinished game stay until it ends.
    fn evictable(&self) -> bool {
        self.connected() == 0 && matches!(self.game.state(), MatchState::Finished { .. })
    }

    fn send_to(&self, participant: ParticipantId, author: ParticipantId, event: &Outbound) {
        if let Some(text) = encode(author, event) {
            self.seats
                .iter()
                .filter(|seat| seat.id == participant)
                .for_each(|seat| deliver(seat, &text));
        }
    }

    /// Every connected participant except `sender`.
    fn broadcast(&self, sender: ParticipantId, event: &Outbound) {
        if let Some(text) = encode(sender, event) {
            self.seats
                .iter()
                .filter(|seat| seat.id != sender)
                .for_each(|seat| deliver(seat, &text));
        }
    }

    fn broadcast_all(&self, author: ParticipantId, event: &Outbound) {
        if let Some(text) = encode(author, event) {
            self.seats.iter().for_each(|seat| deliver(seat, &text));
        }
    }

    fn snapshot(&self, participant: ParticipantId) -> StateChange {
        let winner = match self.game.state() {
            MatchState::Finished { winner } => Some(winner),
            _ => None,
        };
        StateChange {
            board: self.game.board().serialize(),
            color: self.game.colour_of(participant),
            turn: self.game.turn(),
            winner,
        }
    }

    fn rejected_move(&self, action: Action, reason: impl ToString) -> Outbound {
        let board = self.game.board();
        Outbound::Error {
            msg: reason.to_string(),
            context: Some(MoveContext {
                src: action.from,
                src_color: square_colour(action.from).to_owned(),
                src_piece: glyph(board.square_at(action.from)).to_owned(),
                dst: action.to,
                dst_color: square_colour(action.to).to_owned(),
                dst_piece: glyph(board.square_at(action.to)).to_owned(),
            }),
        }
    }

    fn play(&mut self, participant: ParticipantId, action: Action) {
        let outcome = match self.game.play(participant, action) {
            Ok(outcome) => outcome,
            Err(e) => {
                info!("Rejected {} from {}: {}", action, participant, e);
                let event = self.rejected_move(action, e);
                self.send_to(participant, participant, &event);
                return;
            }
        };

        match outcome.castle {
            Some(castle) => self.broadcast_all(
                participant,
                &Outbound::Castle {
                    k_src: castle.king_from,
                    r_src: castle.rook_from,
                    k_dst: castle.king_to,
                    r_dst: castle.rook_to,
                },
            ),
            None => {
                self.broadcast(
                    participant,
                    &Outbound::Move {
                        src: action.from,
                        dst: action.to,
                        taken: outcome.taken.is_some(),
                    },
                );
                if outcome.taken.is_some() {
                    self.send_to(
                        participant,
                        participant,
                        &Outbound::TakeAck {
                            src: action.from,
                            dst: action.to,
                        },
                    );
                }
            }
        }

        if let Some(winner) = outcome.winner {
            self.broadcast_all(participant, &Outbound::Checkmate { color: winner });
        }
    }

    fn request_reset(&mut self, participant: ParticipantId) {
        let connected = self.connected();
        match self.game.propose_reset(participant, connected) {
            Ok(()) => {
                info!("{} asked for a reset", participant);
                self.broadcast(participant, &Outbound::cmd(Command::ResetReq));
            }
            Err(e) => self.send_to(participant, participant, &Outbound::error(e)),
        }
    }

    fn acknowledge_reset(&mut self, participant: ParticipantId) {
        if let Err(e) = self.game.acknowledge_reset(participant) {
            self.send_to(participant, participant, &Outbound::error(e));
            return;
        }
        info!("{} accepted the reset", participant);
        match serde_json::to_string(&self.game.board().serialize()) {
            Ok(board) => self.broadcast_all(
                participant,
                &Outbound::Cmd {
                    msg: Command::ResetAck,
                    board: Some(board),
                },
            ),
            Err(e) => error!("Could not encode the reset board: {}", e),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        for seat in self.seats.iter_mut() {
            if let Some(connection) = seat.connection.take() {
                let _ = connection.send(Frame::Close);
            }
        }
    }
}

pub struct Rooms {
    rooms: Mutex<HashMap<RoomId, Arc<Mutex<Room>>>>,
    evict_empty: bool,
}

impl Rooms {
    pub fn new(evict_empty: bool) -> Rooms {
        Rooms {
            rooms: Mutex::new(HashMap::new()),
            evict_empty,
        }
    }

    fn room(&self, room: RoomId) -> Result<Arc<Mutex<Room>>, Rejection> {
        self.rooms
            .lock()
            .get(&room)
            .cloned()
            .ok_or(Rejection::RoomNotFound)
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a room whose creator holds the white seat.
    pub fn create_room(&self) -> (RoomId, ParticipantId) {
        let room = RoomId::new();
        let creator = ParticipantId::new();
        self.rooms
            .lock()
            .insert(room, Arc::new(Mutex::new(Room::new(creator))));
        info!("Room {} created by {}", room, creator);
        (room, creator)
    }

    pub fn join_room(&self, room_id: RoomId) -> Result<ParticipantId, Rejection> {
        let room = self.room(room_id)?;
        let mut room = room.lock();
        if room.closed {
            return Err(Rejection::RoomNotFound);
        }

        let participant = ParticipantId::new();
        room.game.join(participant)?;
        room.seats.push(Seat {
            id: participant,
            connection: None,
        });
        info!("{} joined room {}", participant, room_id);
        Ok(participant)
    }

    /// Whether `participant` could connect to `room` right now.
    pub fn check_reservation(
        &self,
        room_id: RoomId,
        participant: ParticipantId,
    ) -> Result<(), Rejection> {
        let room = self.room(room_id)?;
        let mut room = room.lock();
        if room.closed {
            return Err(Rejection::RoomNotFound);
        }
        match room.seat_mut(participant) {
            None => Err(Rejection::NotInRoom),
            Some(seat) if seat.connection.is_some() => Err(Rejection::AlreadyConnected),
            Some(_) => Ok(()),
        }
    }

    /// Attaches a live connection to a reservation. The others are told the
    /// player arrived and the player is sent the current position.
    pub fn connect(
        &self,
        room_id: RoomId,
        participant: ParticipantId,
        connection: Connection,
    ) -> Result<PieceColour, Rejection> {
        let room = self.room(room_id)?;
        let mut room = room.lock();
        if room.closed {
            return Err(Rejection::RoomNotFound);
        }

        let seat = room.seat_mut(participant).ok_or(Rejection::NotInRoom)?;
        if seat.connection.is_some() {
            return Err(Rejection::AlreadyConnected);
        }
        seat.connection = Some(connection);

        let colour = room
            .game
            .colour_of(participant)
            .ok_or(Rejection::NotInRoom)?;
        info!("{} connected to room {} as {}", participant, room_id, colour);

        room.broadcast(participant, &Outbound::cmd(Command::Connected));
        let snapshot = Outbound::State(room.snapshot(participant));
        room.send_to(participant, participant, &snapshot);
        Ok(colour)
    }

    /// Runs one decoded message from `participant` against its room.
    pub fn handle(&self, room_id: RoomId, participant: ParticipantId, inbound: Inbound) -> Flow {
        let room = match self.room(room_id) {
            Ok(room) => room,
            Err(_) => return Flow::Quit,
        };
        let mut room = room.lock();
        if room.closed {
            return Flow::Quit;
        }

        match inbound {
            Inbound::Quit => return Flow::Quit,
            Inbound::Acknowledge => {
                room.broadcast(participant, &Outbound::cmd(Command::Acknowledge))
            }
            Inbound::ResetRequest => room.request_reset(participant),
            Inbound::ResetAck => room.acknowledge_reset(participant),
            Inbound::Move(action) => room.play(participant, action),
        }
        Flow::Continue
    }

    /// Sends `event` to every connected participant of `room` except `sender`.
    pub fn broadcast(&self, sender: ParticipantId, room: RoomId, event: &Outbound) {
        if let Ok(room) = self.room(room) {
            room.lock().broadcast(sender, event);
        }
    }

    pub fn broadcast_all(&self, author: ParticipantId, room: RoomId, event: &Outbound) {
        if let Ok(room) = self.room(room) {
            room.lock().broadcast_all(author, event);
        }
    }

    /// Drops the live connection of `participant` but keeps their seat. A
    /// finished room is evicted once nobody is connected to it.
    pub fn disconnect(&self, room_id: RoomId, participant: ParticipantId) {
        let room = match self.room(room_id) {
            Ok(room) => room,
            Err(_) => return,
        };

        let evictable = {
            let mut guard = room.lock();
            match guard.seat_mut(participant) {
                Some(seat) if seat.connection.is_some() => seat.connection = None,
                _ => return,
            }
            info!("{} disconnected from room {}", participant, room_id);
            guard.broadcast(participant, &Outbound::cmd(Command::Disconnected));
            guard.evictable()
        };
        if !(evictable && self.evict_empty) {
            return;
        }

        let mut rooms = self.rooms.lock();
        let evict = match rooms.get(&room_id) {
            Some(current) if Arc::ptr_eq(current, &room) => {
                let mut current = current.lock();
                if current.evictable() {
                    current.close();
                    true
                } else {
                    false
                }
            }
            _ => false,
        };
        if evict {
            rooms.remove(&room_id);
            info!("Room {} evicted", room_id);
        }
    }

    /// Closes every live connection and forgets every room.
    pub fn close(&self) {
        let drained: Vec<_> = self.rooms.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        info!("Closing {} rooms", drained.len());
        for (_, room) in drained {
            room.lock().close();
        }
    }
}
