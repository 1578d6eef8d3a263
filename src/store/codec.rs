//! Lane encoding and decoding per property kind.
//!
//! [`check`] validates a value against its descriptor without touching the
//! segment, so a rejected write never leaves a half-written payload behind.
//! [`write`] and [`decode`] never touch the version lane; bracketing is the
//! store's job.

use super::value::{FieldValue, PathStatus, PathValue, PropertyValue, Record, Waypoint};
use crate::error::{Result, StateBusError};
use crate::schema::property::{array_header, path_header, record_lanes};
use crate::schema::{FieldDecl, FieldType, PropertyDescriptor, PropertyKind, WAYPOINT_LANES};
use crate::segment::SharedSegment;

// ==================== Validation ====================

/// Validate that `value` can be written to the property described by `desc`
pub fn check(desc: &PropertyDescriptor, value: &PropertyValue) -> Result<()> {
    match (&desc.kind, value) {
        (PropertyKind::Struct { fields }, PropertyValue::Struct(record))
        | (PropertyKind::ConfigStruct { fields }, PropertyValue::Struct(record)) => {
            check_record(&desc.name, fields, record)
        }
        (PropertyKind::Array { record: fields, .. }, PropertyValue::Array(records)) => records
            .iter()
            .try_for_each(|record| check_record(&desc.name, fields, record)),
        (PropertyKind::Path { .. }, PropertyValue::Path(path)) => match path.status {
            // A known status smuggled through Other would decode differently
            PathStatus::Other(lane) if PathStatus::from_lane(lane) != path.status => {
                Err(StateBusError::kind_mismatch(
                    &desc.name,
                    format!("status lane {} must use its named variant", lane),
                ))
            }
            _ => Ok(()),
        },
        (PropertyKind::RingBuffer { .. }, _) => Err(StateBusError::kind_mismatch(
            &desc.name,
            "ring buffers are accessed through ControlChannel",
        )),
        (kind, value) => Err(StateBusError::kind_mismatch(
            &desc.name,
            format!("expected {} value, got {}", kind.name(), value.kind_name()),
        )),
    }
}

fn check_record(property: &str, fields: &[FieldDecl], record: &Record) -> Result<()> {
    for (name, value) in record.iter() {
        let decl = fields.iter().find(|f| f.name == name).ok_or_else(|| {
            StateBusError::kind_mismatch(property, format!("undeclared field '{}'", name))
        })?;

        let matches = matches!(
            (decl.ty, value),
            (FieldType::I32, FieldValue::I32(_))
                | (FieldType::U32, FieldValue::U32(_))
                | (FieldType::F32, FieldValue::F32(_))
                | (FieldType::Bool, FieldValue::Bool(_))
                | (FieldType::Str { .. }, FieldValue::Str(_))
        );
        if !matches {
            return Err(StateBusError::kind_mismatch(
                property,
                format!(
                    "field '{}' is {}, got {}",
                    name,
                    decl.ty.name(),
                    value.type_name()
                ),
            ));
        }

        // Strings are zero-terminated in the segment
        if let FieldValue::Str(text) = value {
            if text.contains('\0') {
                return Err(StateBusError::kind_mismatch(
                    property,
                    format!("field '{}' contains a NUL character", name),
                ));
            }
        }
    }
    Ok(())
}

// ==================== Encoding ====================

/// Write the payload of a checked value, returning how many records or
/// waypoints were dropped by the capacity clamp.
pub fn write(segment: &SharedSegment, desc: &PropertyDescriptor, value: &PropertyValue) -> usize {
    match (&desc.kind, value) {
        (PropertyKind::Struct { fields }, PropertyValue::Struct(record))
        | (PropertyKind::ConfigStruct { fields }, PropertyValue::Struct(record)) => {
            write_record(segment, desc.offset, fields, record);
            0
        }
        (
            PropertyKind::Array {
                record: fields,
                max_count,
                timestamped,
            },
            PropertyValue::Array(records),
        ) => {
            let header = if *timestamped { 4 } else { 3 };
            let stride = record_lanes(fields);
            let count = records.len().min(*max_count as usize);

            for (i, record) in records.iter().take(count).enumerate() {
                write_record(segment, desc.offset + header + i * stride, fields, record);
            }

            segment.store(desc.offset + array_header::COUNT, count as u32);
            segment.fetch_add(desc.offset + array_header::UPDATE_COUNTER, 1);
            if *timestamped {
                segment.store(
                    desc.offset + array_header::LAST_UPDATE_TIMESTAMP,
                    segment.timestamp_ms(),
                );
            }

            records.len() - count
        }
        (PropertyKind::Path { max_waypoints }, PropertyValue::Path(path)) => {
            write_path(segment, desc.offset, *max_waypoints as usize, path)
        }
        _ => 0,
    }
}

fn write_record(segment: &SharedSegment, base: usize, fields: &[FieldDecl], record: &Record) {
    let mut lane = base;
    for field in fields {
        write_field(segment, lane, field.ty, record.get(&field.name));
        lane += field.ty.lanes();
    }
}

fn write_field(segment: &SharedSegment, lane: usize, ty: FieldType, value: Option<&FieldValue>) {
    match (ty, value) {
        (FieldType::I32, Some(FieldValue::I32(v))) => segment.store(lane, *v as u32),
        (FieldType::U32, Some(FieldValue::U32(v))) => segment.store(lane, *v),
        (FieldType::F32, Some(FieldValue::F32(v))) => segment.store(lane, v.to_bits()),
        (FieldType::Bool, Some(FieldValue::Bool(v))) => segment.store(lane, *v as u32),
        (FieldType::Str { max_length }, Some(FieldValue::Str(s))) => {
            write_str(segment, lane, max_length as usize, s)
        }
        (FieldType::Str { max_length }, _) => write_str(segment, lane, max_length as usize, ""),
        _ => segment.store(lane, 0),
    }
}

/// Character codes, clamped to `max_length` and zero padded
fn write_str(segment: &SharedSegment, lane: usize, max_length: usize, s: &str) {
    let mut chars = s.chars();
    for i in 0..max_length {
        let code = chars.next().map_or(0, |c| c as u32);
        segment.store(lane + i, code);
    }
}

fn write_path(
    segment: &SharedSegment,
    base: usize,
    max_waypoints: usize,
    path: &PathValue,
) -> usize {
    use path_header::*;

    let count = path.waypoints.len().min(max_waypoints);

    segment.store(base + STATUS, path.status.to_lane());
    segment.store(base + WAYPOINT_COUNT, count as u32);
    segment.store(base + TOTAL_DISTANCE, path.total_distance.to_bits());
    segment.store(base + REMAINING_DISTANCE, path.remaining_distance.to_bits());
    write_waypoint(segment, base + START_X, path.start);
    write_waypoint(segment, base + END_X, path.end);
    segment.store(base + TARGET_ID, path.target_id);
    segment.store(base + CURRENT_INDEX, path.current_index);

    for (i, wp) in path.waypoints.iter().take(count).enumerate() {
        write_waypoint(segment, base + LANES + i * WAYPOINT_LANES, *wp);
    }

    path.waypoints.len() - count
}

fn write_waypoint(segment: &SharedSegment, lane: usize, wp: Waypoint) {
    segment.store(lane, wp.x as u32);
    segment.store(lane + 1, wp.y as u32);
    segment.store(lane + 2, wp.z as u32);
}

// ==================== Decoding ====================

/// Decode the payload of a property
pub fn decode(segment: &SharedSegment, desc: &PropertyDescriptor) -> Result<PropertyValue> {
    match &desc.kind {
        PropertyKind::Struct { fields } | PropertyKind::ConfigStruct { fields } => Ok(
            PropertyValue::Struct(read_record(segment, desc.offset, fields)),
        ),
        PropertyKind::Array {
            record: fields,
            max_count,
            timestamped,
        } => {
            let header = if *timestamped { 4 } else { 3 };
            let stride = record_lanes(fields);
            // A torn count is clamped here and caught by the version check
            let count = (segment.load(desc.offset + array_header::COUNT) as usize)
                .min(*max_count as usize);

            let records = (0..count)
                .map(|i| read_record(segment, desc.offset + header + i * stride, fields))
                .collect();
            Ok(PropertyValue::Array(records))
        }
        PropertyKind::Path { max_waypoints } => Ok(PropertyValue::Path(read_path(
            segment,
            desc.offset,
            *max_waypoints as usize,
        ))),
        PropertyKind::RingBuffer { .. } => Err(StateBusError::kind_mismatch(
            &desc.name,
            "ring buffers are accessed through ControlChannel",
        )),
    }
}

fn read_record(segment: &SharedSegment, base: usize, fields: &[FieldDecl]) -> Record {
    let mut record = Record::new();
    let mut lane = base;
    for field in fields {
        let value = match field.ty {
            FieldType::I32 => FieldValue::I32(segment.load(lane) as i32),
            FieldType::U32 => FieldValue::U32(segment.load(lane)),
            FieldType::F32 => FieldValue::F32(f32::from_bits(segment.load(lane))),
            FieldType::Bool => FieldValue::Bool(segment.load(lane) != 0),
            FieldType::Str { max_length } => {
                FieldValue::Str(read_str(segment, lane, max_length as usize))
            }
        };
        record.set(field.name.clone(), value);
        lane += field.ty.lanes();
    }
    record
}

/// Read up to `max_length` character codes, stopping at the first zero
fn read_str(segment: &SharedSegment, lane: usize, max_length: usize) -> String {
    (0..max_length)
        .map(|i| segment.load(lane + i))
        .take_while(|&code| code != 0)
        .map(|code| char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn read_path(segment: &SharedSegment, base: usize, max_waypoints: usize) -> PathValue {
    use path_header::*;

    let count = (segment.load(base + WAYPOINT_COUNT) as usize).min(max_waypoints);
    let waypoints = (0..count)
        .map(|i| read_waypoint(segment, base + LANES + i * WAYPOINT_LANES))
        .collect();

    PathValue {
        status: PathStatus::from_lane(segment.load(base + STATUS)),
        total_distance: f32::from_bits(segment.load(base + TOTAL_DISTANCE)),
        remaining_distance: f32::from_bits(segment.load(base + REMAINING_DISTANCE)),
        start: read_waypoint(segment, base + START_X),
        end: read_waypoint(segment, base + END_X),
        target_id: segment.load(base + TARGET_ID),
        current_index: segment.load(base + CURRENT_INDEX),
        waypoints,
    }
}

fn read_waypoint(segment: &SharedSegment, lane: usize) -> Waypoint {
    Waypoint::new(
        segment.load(lane) as i32,
        segment.load(lane + 1) as i32,
        segment.load(lane + 2) as i32,
    )
}
