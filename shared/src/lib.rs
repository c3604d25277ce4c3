//! Wire protocol shared by the arena server and its clients.
//!
//! Every message on the stream is one fixed 16-byte little-endian record with
//! no framing or length prefix. Clients send [`Command`] records, the server
//! answers with [`Update`] records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size in bytes of every record in both directions.
pub const RECORD_SIZE: usize = 16;

/// The world is the unit disk; positions are clamped to this radius.
pub const WORLD_RADIUS: f32 = 1.0;
/// Fighter travel speed in world units per second.
pub const FIGHTER_SPEED: f32 = 1.0;
/// Size given to freshly spawned fighters.
pub const FIGHTER_SIZE: f32 = 10.0;
/// Broadcast and simulation cadence in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 30;
/// Admission cap on simultaneously connected players.
pub const DEFAULT_MAX_PLAYERS: usize = 100;

const COMMAND_MOVE: u8 = 0;
const COMMAND_SPELL: u8 = 1;

const UPDATE_FIGHTER: u8 = 0;
const UPDATE_SPELL: u8 = 1;
const UPDATE_SEND_ID: u8 = 2;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("record must be {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },
    #[error("unknown command type {0}")]
    UnknownCommandType(u8),
    #[error("unknown update type {0}")]
    UnknownUpdateType(u8),
    #[error("record encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

// Field order is the wire layout; bincode writes fixed-width little-endian
// values and arrays without a length prefix.
#[derive(Debug, Serialize, Deserialize)]
struct CommandRecord {
    actor: i32,
    target_x: f32,
    target_y: f32,
    command_type: u8,
    padding: [u8; 3],
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateRecord {
    id: i32,
    x: f32,
    y: f32,
    update_type: u8,
    belongs_to: u8,
    padding: [u8; 2],
}

fn check_size(bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.len() != RECORD_SIZE {
        return Err(ProtocolError::RecordSize {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// What a client asks its fighter to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Walk toward the given world position.
    Move { x: f32, y: f32 },
    /// Aim a spell at the given world position.
    Spell { x: f32, y: f32 },
}

/// A decoded client -> server record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    /// Wire index of the player issuing the command.
    pub actor: i32,
    pub action: Action,
}

impl Command {
    pub fn new(actor: i32, action: Action) -> Self {
        Self { actor, action }
    }

    /// Decodes exactly one record. The command type tag is interpreted here
    /// and nowhere else.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_size(bytes)?;
        let record: CommandRecord = bincode::deserialize(bytes)?;

        let (x, y) = (record.target_x, record.target_y);
        let action = match record.command_type {
            COMMAND_MOVE => Action::Move { x, y },
            COMMAND_SPELL => Action::Spell { x, y },
            other => return Err(ProtocolError::UnknownCommandType(other)),
        };

        Ok(Self {
            actor: record.actor,
            action,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let (command_type, target_x, target_y) = match self.action {
            Action::Move { x, y } => (COMMAND_MOVE, x, y),
            Action::Spell { x, y } => (COMMAND_SPELL, x, y),
        };
        let record = CommandRecord {
            actor: self.actor,
            target_x,
            target_y,
            command_type,
            padding: [0; 3],
        };
        Ok(bincode::serialize(&record)?)
    }
}

/// A server -> client record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    /// Current position of a fighter.
    Fighter { id: i32, x: f32, y: f32 },
    /// Spell target of a fighter.
    Spell { id: i32, x: f32, y: f32 },
    /// Tells the recipient which player id is its own.
    SendId { id: i32 },
}

impl Update {
    /// Appends one encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let record = match *self {
            Update::Fighter { id, x, y } => UpdateRecord {
                id,
                x,
                y,
                update_type: UPDATE_FIGHTER,
                belongs_to: 0,
                padding: [0; 2],
            },
            Update::Spell { id, x, y } => UpdateRecord {
                id,
                x,
                y,
                update_type: UPDATE_SPELL,
                belongs_to: 0,
                padding: [0; 2],
            },
            Update::SendId { id } => UpdateRecord {
                id,
                x: 0.0,
                y: 0.0,
                update_type: UPDATE_SEND_ID,
                belongs_to: 1,
                padding: [0; 2],
            },
        };
        bincode::serialize_into(out, &record)?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(RECORD_SIZE);
        self.encode_into(&mut out)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_size(bytes)?;
        let record: UpdateRecord = bincode::deserialize(bytes)?;

        let (id, x, y) = (record.id, record.x, record.y);
        match record.update_type {
            UPDATE_FIGHTER => Ok(Update::Fighter { id, x, y }),
            UPDATE_SPELL => Ok(Update::Spell { id, x, y }),
            UPDATE_SEND_ID => Ok(Update::SendId { id }),
            other => Err(ProtocolError::UnknownUpdateType(other)),
        }
    }
}
