//! Fixed-size control messages.
//!
//! A message occupies [`MESSAGE_LANES`] lanes of a ring-buffer slot:
//!
//! ```text
//! | sender | target | command | priority | timestamp | payload_type | a | b | c |
//! ```

use crate::schema::property::message_lane;
use crate::schema::MESSAGE_LANES;
use crate::types::Rect;

/// Target id that addresses every worker
pub const BROADCAST: u32 = u32::MAX;

/// What the receiver is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    /// Suspend scanning until `Resume`
    Pause,
    Resume,
    /// A new target was selected; payload carries the entity id
    TargetAcquired,
    TargetLost,
    /// Ask the path worker for a route; payload carries the destination
    PathRequest,
    /// The path property holds a fresh route
    PathReady,
    /// Cached regions are stale and need a full rescan
    Invalidate,
    Shutdown,
    Other(u32),
}

impl Command {
    pub fn to_lane(self) -> u32 {
        match self {
            Command::Ping => 0,
            Command::Pause => 1,
            Command::Resume => 2,
            Command::TargetAcquired => 3,
            Command::TargetLost => 4,
            Command::PathRequest => 5,
            Command::PathReady => 6,
            Command::Invalidate => 7,
            Command::Shutdown => 8,
            Command::Other(v) => v,
        }
    }

    pub fn from_lane(lane: u32) -> Self {
        match lane {
            0 => Command::Ping,
            1 => Command::Pause,
            2 => Command::Resume,
            3 => Command::TargetAcquired,
            4 => Command::TargetLost,
            5 => Command::PathRequest,
            6 => Command::PathReady,
            7 => Command::Invalidate,
            8 => Command::Shutdown,
            v => Command::Other(v),
        }
    }
}

/// How the three payload lanes are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PayloadType {
    #[default]
    None,
    /// `(x, y, z)` as `i32`
    Position,
    /// Entity id in lane `a`
    Entity,
    /// `f32` bit pattern in lane `a`
    Scalar,
    /// `x` and `y` in `a` and `b`, width and height packed as two `u16` in `c`
    Region,
    Other(u32),
}

impl PayloadType {
    pub fn to_lane(self) -> u32 {
        match self {
            PayloadType::None => 0,
            PayloadType::Position => 1,
            PayloadType::Entity => 2,
            PayloadType::Scalar => 3,
            PayloadType::Region => 4,
            PayloadType::Other(v) => v,
        }
    }

    pub fn from_lane(lane: u32) -> Self {
        match lane {
            0 => PayloadType::None,
            1 => PayloadType::Position,
            2 => PayloadType::Entity,
            3 => PayloadType::Scalar,
            4 => PayloadType::Region,
            v => PayloadType::Other(v),
        }
    }
}

/// Typed payload of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Payload {
    pub kind: PayloadType,
    pub values: [u32; 3],
}

impl Payload {
    pub const fn none() -> Self {
        Self {
            kind: PayloadType::None,
            values: [0; 3],
        }
    }

    pub const fn position(x: i32, y: i32, z: i32) -> Self {
        Self {
            kind: PayloadType::Position,
            values: [x as u32, y as u32, z as u32],
        }
    }

    pub const fn entity(id: u32) -> Self {
        Self {
            kind: PayloadType::Entity,
            values: [id, 0, 0],
        }
    }

    pub fn scalar(value: f32) -> Self {
        Self {
            kind: PayloadType::Scalar,
            values: [value.to_bits(), 0, 0],
        }
    }

    pub fn region(rect: Rect) -> Self {
        let size = ((rect.width as u32 & 0xFFFF) << 16) | (rect.height as u32 & 0xFFFF);
        Self {
            kind: PayloadType::Region,
            values: [rect.x as u32, rect.y as u32, size],
        }
    }

    /// Decode a position payload
    pub fn as_position(&self) -> Option<(i32, i32, i32)> {
        (self.kind == PayloadType::Position).then(|| {
            (
                self.values[0] as i32,
                self.values[1] as i32,
                self.values[2] as i32,
            )
        })
    }

    pub fn as_entity(&self) -> Option<u32> {
        (self.kind == PayloadType::Entity).then_some(self.values[0])
    }

    pub fn as_scalar(&self) -> Option<f32> {
        (self.kind == PayloadType::Scalar).then(|| f32::from_bits(self.values[0]))
    }

    pub fn as_region(&self) -> Option<Rect> {
        (self.kind == PayloadType::Region).then(|| {
            Rect::new(
                self.values[0] as i32,
                self.values[1] as i32,
                (self.values[2] >> 16) as i32,
                (self.values[2] & 0xFFFF) as i32,
            )
        })
    }
}

/// A decoded ring-buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub sender: u32,
    /// Worker id or [`BROADCAST`]
    pub target: u32,
    pub command: Command,
    pub priority: u32,
    /// Milliseconds since the segment was created
    pub timestamp: u32,
    pub payload: Payload,
}

impl Message {
    /// Whether a worker with id `worker_id` should receive this message
    pub fn is_for(&self, worker_id: u32) -> bool {
        self.target == worker_id || self.target == BROADCAST
    }

    pub fn is_broadcast(&self) -> bool {
        self.target == BROADCAST
    }

    pub fn to_lanes(&self) -> [u32; MESSAGE_LANES] {
        let mut lanes = [0u32; MESSAGE_LANES];
        lanes[message_lane::SENDER] = self.sender;
        lanes[message_lane::TARGET] = self.target;
        lanes[message_lane::COMMAND] = self.command.to_lane();
        lanes[message_lane::PRIORITY] = self.priority;
        lanes[message_lane::TIMESTAMP] = self.timestamp;
        lanes[message_lane::PAYLOAD_TYPE] = self.payload.kind.to_lane();
        lanes[message_lane::PAYLOAD_A] = self.payload.values[0];
        lanes[message_lane::PAYLOAD_B] = self.payload.values[1];
        lanes[message_lane::PAYLOAD_C] = self.payload.values[2];
        lanes
    }

    pub fn from_lanes(lanes: &[u32; MESSAGE_LANES]) -> Self {
        Self {
            sender: lanes[message_lane::SENDER],
            target: lanes[message_lane::TARGET],
            command: Command::from_lane(lanes[message_lane::COMMAND]),
            priority: lanes[message_lane::PRIORITY],
            timestamp: lanes[message_lane::TIMESTAMP],
            payload: Payload {
                kind: PayloadType::from_lane(lanes[message_lane::PAYLOAD_TYPE]),
                values: [
                    lanes[message_lane::PAYLOAD_A],
                    lanes[message_lane::PAYLOAD_B],
                    lanes[message_lane::PAYLOAD_C],
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_codes_survive() {
        assert_eq!(Command::from_lane(77), Command::Other(77));
        assert_eq!(Command::Other(77).to_lane(), 77);
        assert_eq!(PayloadType::from_lane(9), PayloadType::Other(9));
    }

    #[test]
    fn test_message_lane_layout() {
        let msg = Message {
            sender: 1,
            target: BROADCAST,
            command: Command::PathRequest,
            priority: 2,
            timestamp: 1234,
            payload: Payload::position(-5, 10, 0),
        };

        let lanes = msg.to_lanes();
        assert_eq!(lanes[message_lane::TARGET], u32::MAX);
        assert_eq!(lanes[message_lane::PAYLOAD_A], (-5i32) as u32);
        assert_eq!(Message::from_lanes(&lanes), msg);
        assert_eq!(msg.payload.as_position(), Some((-5, 10, 0)));
        assert!(msg.is_for(3));
    }

    #[test]
    fn test_payload_accessors_check_kind() {
        let p = Payload::scalar(0.75);
        assert_eq!(p.as_scalar(), Some(0.75));
        assert_eq!(p.as_entity(), None);
        assert_eq!(Payload::entity(9).as_entity(), Some(9));

        let region = Rect::new(10, -4, 300, 200);
        assert_eq!(Payload::region(region).as_region(), Some(region));
    }
}
