//! Property declarations and their lane footprints.
//!
//! Every property is declared once, in order, and compiled into a flat lane
//! layout by [`SchemaCompiler`](super::SchemaCompiler). All sizes are counted
//! in 32-bit lanes.

use serde::{Deserialize, Serialize};

/// Lanes in a control-channel message slot
pub const MESSAGE_LANES: usize = 9;

/// Delivery bookkeeping lanes kept per control-channel slot
pub const DELIVERY_LANES: usize = 2;

/// Lanes in a path waypoint record `(x, y, z)`
pub const WAYPOINT_LANES: usize = 3;

/// Busy marker carried by a version lane while a write is in flight.
///
/// Published versions never have this bit set.
pub const VERSION_BUSY_BIT: u32 = 1 << 31;

/// Mask applied to published version numbers
pub const VERSION_MASK: u32 = !VERSION_BUSY_BIT;

pub mod array_header {
    //! Indices into an array property's header, relative to its offset.

    pub const COUNT: usize = 0;
    pub const VERSION: usize = 1;
    pub const UPDATE_COUNTER: usize = 2;
    /// Only present when the array is declared `timestamped`
    pub const LAST_UPDATE_TIMESTAMP: usize = 3;
}

pub mod path_header {
    //! Indices into a path property's scalar header, relative to its offset.

    pub const STATUS: usize = 0;
    pub const WAYPOINT_COUNT: usize = 1;
    pub const TOTAL_DISTANCE: usize = 2;
    pub const REMAINING_DISTANCE: usize = 3;
    pub const START_X: usize = 4;
    pub const START_Y: usize = 5;
    pub const START_Z: usize = 6;
    pub const END_X: usize = 7;
    pub const END_Y: usize = 8;
    pub const END_Z: usize = 9;
    pub const TARGET_ID: usize = 10;
    pub const CURRENT_INDEX: usize = 11;
    pub const VERSION: usize = 12;

    pub const LANES: usize = 13;
}

pub mod ring_header {
    //! Indices into a ring-buffer property's header, relative to its offset.

    pub const WRITE_INDEX: usize = 0;
    pub const READ_INDEX: usize = 1;
    pub const COUNT: usize = 2;
    pub const LOCK: usize = 3;

    pub const LANES: usize = 4;
}

pub mod ring_trailer {
    //! Indices into the lanes following a ring buffer's message slots.
    //!
    //! The trailer starts with the lanes below and continues with one
    //! [`DELIVERY_LANES`](super::DELIVERY_LANES) record per slot.

    /// Bitmask of attached channel handles
    pub const MEMBERS: usize = 0;

    pub const LANES: usize = 1;
}

pub mod delivery_lane {
    //! Indices into a slot's delivery record.

    /// Member bits a broadcast has not reached yet
    pub const PENDING: usize = 0;
    /// Polls by other workers that skipped a unicast message
    pub const SKIPS: usize = 1;
}

pub mod message_lane {
    //! Indices into a control-channel message slot.

    pub const SENDER: usize = 0;
    pub const TARGET: usize = 1;
    pub const COMMAND: usize = 2;
    pub const PRIORITY: usize = 3;
    pub const TIMESTAMP: usize = 4;
    pub const PAYLOAD_TYPE: usize = 5;
    pub const PAYLOAD_A: usize = 6;
    pub const PAYLOAD_B: usize = 7;
    pub const PAYLOAD_C: usize = 8;
}

/// Scalar or string field type inside a struct or array record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    I32,
    U32,
    /// Stored as its IEEE-754 bit pattern
    F32,
    /// Stored as 0 or 1
    Bool,
    /// Fixed run of character codes, zero padded
    Str { max_length: u32 },
}

impl FieldType {
    /// Number of lanes this field occupies
    pub fn lanes(&self) -> usize {
        match self {
            FieldType::I32 | FieldType::U32 | FieldType::F32 | FieldType::Bool => 1,
            FieldType::Str { max_length } => *max_length as usize,
        }
    }

    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::I32 => "i32",
            FieldType::U32 => "u32",
            FieldType::F32 => "f32",
            FieldType::Bool => "bool",
            FieldType::Str { .. } => "str",
        }
    }
}

/// A named field of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn i32(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::I32)
    }

    pub fn u32(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::U32)
    }

    pub fn f32(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::F32)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn string(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, FieldType::Str { max_length })
    }
}

/// Total lanes of a record made of `fields`
pub fn record_lanes(fields: &[FieldDecl]) -> usize {
    fields.iter().map(|f| f.ty.lanes()).sum()
}

/// The closed set of property kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Fixed fields followed by a trailing version lane
    Struct { fields: Vec<FieldDecl> },
    /// Same layout as `Struct`; written by the orchestrator, read by workers
    ConfigStruct { fields: Vec<FieldDecl> },
    /// Header plus up to `max_count` fixed-size records
    Array {
        record: Vec<FieldDecl>,
        max_count: u32,
        #[serde(default)]
        timestamped: bool,
    },
    /// Scalar path header plus up to `max_waypoints` `(x, y, z)` records
    Path { max_waypoints: u32 },
    /// Control-channel ring buffer with `max_messages` message slots
    RingBuffer { max_messages: u32 },
}

impl PropertyKind {
    /// Number of lanes the property occupies in the segment
    pub fn lanes(&self) -> usize {
        match self {
            PropertyKind::Struct { fields } | PropertyKind::ConfigStruct { fields } => {
                record_lanes(fields) + 1
            }
            PropertyKind::Array {
                record,
                max_count,
                timestamped,
            } => {
                let header = if *timestamped { 4 } else { 3 };
                header + record_lanes(record) * *max_count as usize
            }
            PropertyKind::Path { max_waypoints } => {
                path_header::LANES + WAYPOINT_LANES * *max_waypoints as usize
            }
            PropertyKind::RingBuffer { max_messages } => {
                ring_header::LANES
                    + (MESSAGE_LANES + DELIVERY_LANES) * *max_messages as usize
                    + ring_trailer::LANES
            }
        }
    }

    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Struct { .. } => "struct",
            PropertyKind::ConfigStruct { .. } => "config_struct",
            PropertyKind::Array { .. } => "array",
            PropertyKind::Path { .. } => "path",
            PropertyKind::RingBuffer { .. } => "ring_buffer",
        }
    }

    /// Stable numeric tag mixed into the layout fingerprint
    pub(crate) fn tag(&self) -> u32 {
        match self {
            PropertyKind::Struct { .. } => 1,
            PropertyKind::ConfigStruct { .. } => 2,
            PropertyKind::Array { .. } => 3,
            PropertyKind::Path { .. } => 4,
            PropertyKind::RingBuffer { .. } => 5,
        }
    }
}

/// One entry of the ordered declaration list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl PropertyDecl {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn structure(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self::new(name, PropertyKind::Struct { fields })
    }

    pub fn config(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self::new(name, PropertyKind::ConfigStruct { fields })
    }

    pub fn array(name: impl Into<String>, record: Vec<FieldDecl>, max_count: u32) -> Self {
        Self::new(
            name,
            PropertyKind::Array {
                record,
                max_count,
                timestamped: false,
            },
        )
    }

    pub fn timestamped_array(
        name: impl Into<String>,
        record: Vec<FieldDecl>,
        max_count: u32,
    ) -> Self {
        Self::new(
            name,
            PropertyKind::Array {
                record,
                max_count,
                timestamped: true,
            },
        )
    }

    pub fn path(name: impl Into<String>, max_waypoints: u32) -> Self {
        Self::new(name, PropertyKind::Path { max_waypoints })
    }

    pub fn ring_buffer(name: impl Into<String>, max_messages: u32) -> Self {
        Self::new(name, PropertyKind::RingBuffer { max_messages })
    }
}

/// The declaration list used by the automation client's workers
pub fn default_schema() -> Vec<PropertyDecl> {
    vec![
        PropertyDecl::structure(
            "playerPos",
            vec![FieldDecl::i32("x"), FieldDecl::i32("y"), FieldDecl::i32("z")],
        ),
        PropertyDecl::structure(
            "playerState",
            vec![
                FieldDecl::u32("hp"),
                FieldDecl::u32("maxHp"),
                FieldDecl::bool("inCombat"),
                FieldDecl::f32("heading"),
                FieldDecl::string("zone", 32),
            ],
        ),
        PropertyDecl::config(
            "botConfig",
            vec![
                FieldDecl::bool("enabled"),
                FieldDecl::u32("scanIntervalMs"),
                FieldDecl::f32("matchThreshold"),
                FieldDecl::string("profile", 16),
            ],
        ),
        PropertyDecl::timestamped_array(
            "uiRegions",
            vec![
                FieldDecl::i32("x"),
                FieldDecl::i32("y"),
                FieldDecl::i32("width"),
                FieldDecl::i32("height"),
                FieldDecl::u32("kind"),
                FieldDecl::f32("confidence"),
            ],
            64,
        ),
        PropertyDecl::array(
            "detectedText",
            vec![
                FieldDecl::u32("regionIndex"),
                FieldDecl::string("text", 24),
            ],
            16,
        ),
        PropertyDecl::array(
            "targets",
            vec![
                FieldDecl::u32("id"),
                FieldDecl::i32("x"),
                FieldDecl::i32("y"),
                FieldDecl::i32("z"),
                FieldDecl::f32("score"),
            ],
            32,
        ),
        PropertyDecl::path("currentPath", 256),
        PropertyDecl::ring_buffer("controlChannel", 64),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_lanes_include_version() {
        let kind = PropertyKind::Struct {
            fields: vec![FieldDecl::i32("x"), FieldDecl::string("name", 8)],
        };
        assert_eq!(kind.lanes(), 1 + 8 + 1);
    }

    #[test]
    fn test_array_lanes() {
        let record = vec![FieldDecl::i32("a"), FieldDecl::f32("b")];
        let plain = PropertyKind::Array {
            record: record.clone(),
            max_count: 10,
            timestamped: false,
        };
        let stamped = PropertyKind::Array {
            record,
            max_count: 10,
            timestamped: true,
        };
        assert_eq!(plain.lanes(), 3 + 20);
        assert_eq!(stamped.lanes(), 4 + 20);
    }

    #[test]
    fn test_path_and_ring_lanes() {
        assert_eq!(PropertyKind::Path { max_waypoints: 4 }.lanes(), 13 + 12);
        assert_eq!(
            PropertyKind::RingBuffer { max_messages: 2 }.lanes(),
            4 + 18 + 1 + 4
        );
    }

    #[test]
    fn test_decl_deserializes_from_toml() {
        let text = r#"
            name = "playerPos"
            kind = "struct"
            fields = [
                { name = "x", type = "i32" },
                { name = "label", type = "str", max_length = 12 },
            ]
        "#;
        let decl: PropertyDecl = toml::from_str(text).unwrap();
        assert_eq!(decl.name, "playerPos");
        assert_eq!(
            decl.kind,
            PropertyKind::Struct {
                fields: vec![FieldDecl::i32("x"), FieldDecl::string("label", 12)],
            }
        );
    }
}
