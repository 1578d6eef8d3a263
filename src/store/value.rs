//! Decoded property values.
//!
//! Equality and hashing compare floats by bit pattern, so two values are equal
//! exactly when they encode to the same lanes. Consumers use this (or the
//! version lane) to decide whether something changed.

use crate::error::{Result, StateBusError};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A single decoded field
#[derive(Debug, Clone)]
pub enum FieldValue {
    I32(i32),
    U32(u32),
    F32(f32),
    Bool(bool),
    Str(String),
}

impl FieldValue {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            FieldValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::I32(_) => "i32",
            FieldValue::U32(_) => "u32",
            FieldValue::F32(_) => "f32",
            FieldValue::Bool(_) => "bool",
            FieldValue::Str(_) => "str",
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::I32(a), FieldValue::I32(b)) => a == b,
            (FieldValue::U32(a), FieldValue::U32(b)) => a == b,
            (FieldValue::F32(a), FieldValue::F32(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FieldValue::I32(v) => v.hash(state),
            FieldValue::U32(v) => v.hash(state),
            FieldValue::F32(v) => v.to_bits().hash(state),
            FieldValue::Bool(v) => v.hash(state),
            FieldValue::Str(v) => v.hash(state),
        }
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I32(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U32(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::F32(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// Named fields of a struct property or of one array element.
///
/// Fields missing from a record are written as zero; decoded records always
/// carry every declared field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(FieldValue::as_i32)
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(FieldValue::as_u32)
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(FieldValue::as_f32)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A point of a path, in game map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Waypoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Waypoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Path search state as published by the path worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PathStatus {
    #[default]
    Idle,
    Searching,
    Found,
    Following,
    Arrived,
    Failed,
    /// A status lane outside the named range; writes reject the lanes that
    /// have a named variant
    Other(u32),
}

impl PathStatus {
    pub fn to_lane(self) -> u32 {
        match self {
            PathStatus::Idle => 0,
            PathStatus::Searching => 1,
            PathStatus::Found => 2,
            PathStatus::Following => 3,
            PathStatus::Arrived => 4,
            PathStatus::Failed => 5,
            PathStatus::Other(v) => v,
        }
    }

    pub fn from_lane(lane: u32) -> Self {
        match lane {
            0 => PathStatus::Idle,
            1 => PathStatus::Searching,
            2 => PathStatus::Found,
            3 => PathStatus::Following,
            4 => PathStatus::Arrived,
            5 => PathStatus::Failed,
            v => PathStatus::Other(v),
        }
    }
}

/// A decoded path property
#[derive(Debug, Clone, Default)]
pub struct PathValue {
    pub status: PathStatus,
    pub total_distance: f32,
    pub remaining_distance: f32,
    pub start: Waypoint,
    pub end: Waypoint,
    pub target_id: u32,
    pub current_index: u32,
    pub waypoints: Vec<Waypoint>,
}

impl PartialEq for PathValue {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.total_distance.to_bits() == other.total_distance.to_bits()
            && self.remaining_distance.to_bits() == other.remaining_distance.to_bits()
            && self.start == other.start
            && self.end == other.end
            && self.target_id == other.target_id
            && self.current_index == other.current_index
            && self.waypoints == other.waypoints
    }
}

impl Eq for PathValue {}

impl Hash for PathValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.status.hash(state);
        self.total_distance.to_bits().hash(state);
        self.remaining_distance.to_bits().hash(state);
        self.start.hash(state);
        self.end.hash(state);
        self.target_id.hash(state);
        self.current_index.hash(state);
        self.waypoints.hash(state);
    }
}

/// A decoded property of any kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    /// Value of a struct or config-struct property
    Struct(Record),
    /// Elements of an array property
    Array(Vec<Record>),
    Path(PathValue),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Struct(_) => "struct",
            PropertyValue::Array(_) => "array",
            PropertyValue::Path(_) => "path",
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            PropertyValue::Struct(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Record]> {
        match self {
            PropertyValue::Array(records) => Some(records),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&PathValue> {
        match self {
            PropertyValue::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Record> for PropertyValue {
    fn from(r: Record) -> Self {
        PropertyValue::Struct(r)
    }
}

impl From<Vec<Record>> for PropertyValue {
    fn from(records: Vec<Record>) -> Self {
        PropertyValue::Array(records)
    }
}

impl From<PathValue> for PropertyValue {
    fn from(p: PathValue) -> Self {
        PropertyValue::Path(p)
    }
}

/// Result of a versioned read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub value: PropertyValue,
    /// Published version observed by the read
    pub version: u32,
    /// False when the retry bound was exhausted without a stable version
    pub consistent: bool,
}

impl Snapshot {
    /// Turn an inconsistent snapshot into an error
    pub fn require_consistent(self, property: &str) -> Result<Self> {
        if self.consistent {
            Ok(self)
        } else {
            Err(StateBusError::InconsistentSnapshot(property.to_string()))
        }
    }
}

/// Result of a batched read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSnapshot {
    /// Snapshots in request order
    pub entries: Vec<(String, Snapshot)>,
    /// True when no version moved across the whole batch
    pub consistent: bool,
}

impl BatchSnapshot {
    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, snapshot)| snapshot)
    }
}

/// Result of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Version published by the write
    pub version: u32,
    /// Records or waypoints dropped by the capacity clamp
    pub truncated: usize,
}
