//! Statically compiled layout of the shared segment.
//!
//! Properties are declared once, in order, as a closed set of kinds
//! ([`PropertyKind`]). [`SchemaCompiler`] turns the declaration list into a
//! [`CompiledSchema`]: a lane offset and size per property plus the total
//! segment size.
//!
//! ```text
//! lane 0                                                       total_lanes
//! | playerPos | playerState | botConfig | uiRegions ... | controlChannel |
//!   x y z ver   hp .. zone ver            cnt ver upd ts rec rec ...
//! ```
//!
//! Every worker mapping the segment must compile the same declaration list;
//! compare [`CompiledSchema::fingerprint`] to detect drift.

pub mod compiled;
pub mod compiler;
pub mod property;

pub use compiled::{CompiledSchema, PropertyDescriptor};
pub use compiler::SchemaCompiler;
pub use property::{
    default_schema, FieldDecl, FieldType, PropertyDecl, PropertyKind, DELIVERY_LANES,
    MESSAGE_LANES, VERSION_BUSY_BIT, VERSION_MASK, WAYPOINT_LANES,
};
