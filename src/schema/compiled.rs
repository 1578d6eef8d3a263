use super::property::{array_header, path_header, PropertyKind};
use crate::error::{Result, StateBusError};
use std::collections::HashMap;

/// Compiled location of one property inside the segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    /// First lane of the property
    pub offset: usize,
    /// Lanes occupied by the property
    pub size: usize,
}

impl PropertyDescriptor {
    /// Absolute index of the property's version lane.
    ///
    /// Ring buffers have no version lane.
    pub fn version_lane(&self) -> Option<usize> {
        match &self.kind {
            PropertyKind::Struct { .. } | PropertyKind::ConfigStruct { .. } => {
                Some(self.offset + self.size - 1)
            }
            PropertyKind::Array { .. } => Some(self.offset + array_header::VERSION),
            PropertyKind::Path { .. } => Some(self.offset + path_header::VERSION),
            PropertyKind::RingBuffer { .. } => None,
        }
    }

    /// One past the last lane of the property
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Flat lane layout produced by [`SchemaCompiler`](super::SchemaCompiler)
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    /// Descriptors in declaration order
    pub properties: Vec<PropertyDescriptor>,

    /// Total lanes of all properties
    pub total_lanes: usize,

    /// FNV-1a hash of names, kinds, offsets and sizes
    pub fingerprint: u64,

    pub(crate) index: HashMap<String, usize>,
}

impl CompiledSchema {
    /// Look up a property, failing fast on unknown names
    pub fn descriptor(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.properties[i])
            .ok_or_else(|| StateBusError::UnknownProperty(name.to_string()))
    }

    /// Whether the schema declares `name`
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate descriptors in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter()
    }
}
