//! Test data builders for creating segments, stores and channels

use statebus_rs::config::{ChannelConfig, StoreConfig};
use statebus_rs::schema::{default_schema, PropertyDecl};
use statebus_rs::segment::FrameLimits;
use statebus_rs::{ControlChannel, SchemaCompiler, SharedSegment, SharedStateStore};
use std::sync::Arc;

/// Builder for a shared segment with a chosen schema and frame size
pub struct SegmentBuilder {
    decls: Vec<PropertyDecl>,
    limits: FrameLimits,
}

impl SegmentBuilder {
    /// Starts from the default automation schema with a tiny image buffer
    pub fn new() -> Self {
        Self {
            decls: default_schema(),
            limits: FrameLimits {
                max_width: 4,
                max_height: 4,
            },
        }
    }

    pub fn schema(mut self, decls: Vec<PropertyDecl>) -> Self {
        self.decls = decls;
        self
    }

    pub fn frame_size(mut self, max_width: u32, max_height: u32) -> Self {
        self.limits = FrameLimits {
            max_width,
            max_height,
        };
        self
    }

    pub fn build(self) -> Arc<SharedSegment> {
        let schema = SchemaCompiler::compile(&self.decls).expect("test schema compiles");
        Arc::new(SharedSegment::new(schema, self.limits))
    }
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn store(segment: &Arc<SharedSegment>) -> SharedStateStore {
    SharedStateStore::new(segment.clone(), &StoreConfig::default())
}

/// Channel handle on `controlChannel` for `worker_id`
pub fn channel(segment: &Arc<SharedSegment>, worker_id: u32) -> ControlChannel {
    ControlChannel::new(segment.clone(), &ChannelConfig::default(), worker_id)
        .expect("schema declares controlChannel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_builder() {
        let segment = SegmentBuilder::new().frame_size(8, 2).build();
        assert_eq!(segment.limits().pixels(), 16);
        assert!(segment.schema().contains("playerPos"));
    }
}
