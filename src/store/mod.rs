//! Typed read/write engine over the shared segment.
//!
//! Each property carries one version lane used as a sequence lock:
//!
//! 1. the writer sets [`VERSION_BUSY_BIT`] on the version lane
//! 2. the writer stores the payload lanes
//! 3. the writer publishes `previous + 1` with the busy bit cleared
//!
//! A reader loads the version, decodes the payload and loads the version again.
//! A busy or changed version means the payload may be torn, so the read is
//! retried up to `max_read_retries` times before the latest decode is returned
//! flagged inconsistent.
//!
//! Only one thread may write a given property. This is not enforced.

pub mod codec;
pub mod value;

pub use value::{
    BatchSnapshot, FieldValue, PathStatus, PathValue, PropertyValue, Record, Snapshot, Waypoint,
    WriteOutcome,
};

use crate::config::StoreConfig;
use crate::error::{Result, StateBusError};
use crate::schema::{PropertyDescriptor, VERSION_BUSY_BIT, VERSION_MASK};
use crate::segment::{SharedSegment, WaitOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Versioned property store; cheap to clone, one per worker
#[derive(Debug, Clone)]
pub struct SharedStateStore {
    segment: Arc<SharedSegment>,
    max_read_retries: u32,
}

impl SharedStateStore {
    /// Create a store view over `segment`
    pub fn new(segment: Arc<SharedSegment>, config: &StoreConfig) -> Self {
        Self {
            segment,
            max_read_retries: config.max_read_retries,
        }
    }

    pub fn segment(&self) -> &Arc<SharedSegment> {
        &self.segment
    }

    fn descriptor(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.segment.schema().descriptor(name)
    }

    fn version_lane(desc: &PropertyDescriptor) -> Result<usize> {
        desc.version_lane().ok_or_else(|| {
            StateBusError::kind_mismatch(&desc.name, "property has no version lane")
        })
    }

    // ==================== Writes ====================

    /// Mark a write in progress and return the currently published version
    fn begin_write(&self, lane: usize) -> u32 {
        self.segment.fetch_or(lane, VERSION_BUSY_BIT) & VERSION_MASK
    }

    /// Publish `previous + 1`, clearing the busy bit
    fn end_write(&self, lane: usize, previous: u32) -> u32 {
        let next = previous.wrapping_add(1) & VERSION_MASK;
        self.segment.store(lane, next);
        next
    }

    /// Encode `value` into property `name` and bump its version.
    ///
    /// Arrays and paths longer than their capacity are clamped; the dropped
    /// count is reported in [`WriteOutcome::truncated`].
    pub fn set(&self, name: &str, value: &PropertyValue) -> Result<WriteOutcome> {
        let desc = self.descriptor(name)?;
        codec::check(desc, value)?;
        let lane = Self::version_lane(desc)?;

        let previous = self.begin_write(lane);
        let truncated = codec::write(&self.segment, desc, value);
        let version = self.end_write(lane, previous);
        self.segment.notify(lane);

        if truncated > 0 {
            tracing::warn!(
                property = name,
                dropped = truncated,
                "Write exceeded capacity, extra entries dropped"
            );
        }

        Ok(WriteOutcome { version, truncated })
    }

    /// Write several properties: every payload first, then every version bump.
    ///
    /// All values are validated before anything is written.
    pub fn set_many(&self, updates: &[(&str, PropertyValue)]) -> Result<Vec<WriteOutcome>> {
        let mut seen = HashSet::with_capacity(updates.len());
        let mut targets = Vec::with_capacity(updates.len());

        for (name, value) in updates {
            let desc = self.descriptor(name)?;
            codec::check(desc, value)?;
            if !seen.insert(*name) {
                return Err(StateBusError::kind_mismatch(
                    *name,
                    "property appears twice in one batch",
                ));
            }
            targets.push((desc, Self::version_lane(desc)?, value));
        }

        let previous: Vec<u32> = targets
            .iter()
            .map(|(_, lane, _)| self.begin_write(*lane))
            .collect();

        let truncated: Vec<usize> = targets
            .iter()
            .map(|(desc, _, value)| codec::write(&self.segment, desc, value))
            .collect();

        let outcomes: Vec<WriteOutcome> = targets
            .iter()
            .zip(previous)
            .zip(truncated)
            .map(|(((desc, lane, _), prev), truncated)| {
                if truncated > 0 {
                    tracing::warn!(
                        property = desc.name.as_str(),
                        dropped = truncated,
                        "Batched write exceeded capacity, extra entries dropped"
                    );
                }
                WriteOutcome {
                    version: self.end_write(*lane, prev),
                    truncated,
                }
            })
            .collect();

        if let Some((_, lane, _)) = targets.first() {
            self.segment.notify(*lane);
        }

        Ok(outcomes)
    }

    // ==================== Reads ====================

    /// Versioned read of property `name`
    pub fn get(&self, name: &str) -> Result<Snapshot> {
        let desc = self.descriptor(name)?;
        let lane = Self::version_lane(desc)?;
        let mut latest = None;

        for _ in 0..=self.max_read_retries {
            let before = self.segment.load(lane);
            if before & VERSION_BUSY_BIT != 0 {
                std::hint::spin_loop();
                continue;
            }

            let value = codec::decode(&self.segment, desc)?;
            let after = self.segment.load(lane);
            if before == after {
                return Ok(Snapshot {
                    value,
                    version: before,
                    consistent: true,
                });
            }

            latest = Some((value, after & VERSION_MASK));
        }

        tracing::warn!(
            property = name,
            retries = self.max_read_retries,
            "Versioned read did not stabilize, returning inconsistent snapshot"
        );

        let (value, version) = match latest {
            Some(latest) => latest,
            None => (
                codec::decode(&self.segment, desc)?,
                self.segment.load(lane) & VERSION_MASK,
            ),
        };
        Ok(Snapshot {
            value,
            version,
            consistent: false,
        })
    }

    /// Read several properties bracketed by one set of version checks
    pub fn get_many(&self, names: &[&str]) -> Result<BatchSnapshot> {
        let targets = names
            .iter()
            .map(|name| {
                let desc = self.descriptor(name)?;
                Ok((desc, Self::version_lane(desc)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut latest = None;

        for _ in 0..=self.max_read_retries {
            let before: Vec<u32> = targets
                .iter()
                .map(|(_, lane)| self.segment.load(*lane))
                .collect();
            if before.iter().any(|v| v & VERSION_BUSY_BIT != 0) {
                std::hint::spin_loop();
                continue;
            }

            let values = targets
                .iter()
                .map(|(desc, _)| codec::decode(&self.segment, desc))
                .collect::<Result<Vec<_>>>()?;

            let after: Vec<u32> = targets
                .iter()
                .map(|(_, lane)| self.segment.load(*lane))
                .collect();

            let consistent = before == after;
            let batch = Self::assemble(names, values, &after, consistent);
            if consistent {
                return Ok(batch);
            }
            latest = Some(batch);
        }

        tracing::warn!(
            properties = names.len(),
            retries = self.max_read_retries,
            "Batched read did not stabilize, returning inconsistent snapshot"
        );

        match latest {
            Some(batch) => Ok(batch),
            None => {
                let values = targets
                    .iter()
                    .map(|(desc, _)| codec::decode(&self.segment, desc))
                    .collect::<Result<Vec<_>>>()?;
                let versions: Vec<u32> = targets
                    .iter()
                    .map(|(_, lane)| self.segment.load(*lane))
                    .collect();
                Ok(Self::assemble(names, values, &versions, false))
            }
        }
    }

    fn assemble(
        names: &[&str],
        values: Vec<PropertyValue>,
        versions: &[u32],
        consistent: bool,
    ) -> BatchSnapshot {
        let entries = names
            .iter()
            .zip(values)
            .zip(versions)
            .map(|((name, value), version)| {
                (
                    name.to_string(),
                    Snapshot {
                        value,
                        version: version & VERSION_MASK,
                        consistent,
                    },
                )
            })
            .collect();
        BatchSnapshot {
            entries,
            consistent,
        }
    }

    // ==================== Change Detection ====================

    /// Currently published version of property `name`
    pub fn version(&self, name: &str) -> Result<u32> {
        let desc = self.descriptor(name)?;
        let lane = Self::version_lane(desc)?;
        Ok(self.segment.load(lane) & VERSION_MASK)
    }

    /// Whether `name` has been written since `last_version` was observed
    pub fn changed_since(&self, name: &str, last_version: u32) -> Result<bool> {
        Ok(self.version(name)? != last_version)
    }

    /// Block until `name` publishes a version other than `last_version`.
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_change(&self, name: &str, last_version: u32, timeout: Duration) -> Result<bool> {
        let desc = self.descriptor(name)?;
        let lane = Self::version_lane(desc)?;
        let deadline = Instant::now() + timeout;

        loop {
            let current = self.segment.load(lane);
            if current & VERSION_BUSY_BIT == 0 && current != last_version {
                return Ok(true);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            if self.segment.wait(lane, current, remaining) == WaitOutcome::TimedOut {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDecl, PropertyDecl, SchemaCompiler};
    use crate::segment::FrameLimits;
    use std::thread;

    fn test_store() -> SharedStateStore {
        let schema = SchemaCompiler::compile(&[
            PropertyDecl::structure(
                "playerPos",
                vec![FieldDecl::i32("x"), FieldDecl::i32("y"), FieldDecl::i32("z")],
            ),
            PropertyDecl::array("targets", vec![FieldDecl::u32("id")], 2),
            PropertyDecl::path("currentPath", 4),
            PropertyDecl::ring_buffer("ring", 2),
        ])
        .unwrap();
        let segment = Arc::new(SharedSegment::new(
            schema,
            FrameLimits {
                max_width: 1,
                max_height: 1,
            },
        ));
        SharedStateStore::new(segment, &StoreConfig::default())
    }

    fn pos(x: i32, y: i32, z: i32) -> PropertyValue {
        PropertyValue::Struct(Record::new().with("x", x).with("y", y).with("z", z))
    }

    #[test]
    fn test_set_then_get_bumps_version_by_one() {
        let store = test_store();
        let before = store.version("playerPos").unwrap();

        let outcome = store.set("playerPos", &pos(5, 5, 7)).unwrap();
        let snapshot = store.get("playerPos").unwrap();

        assert_eq!(outcome.version, before + 1);
        assert_eq!(snapshot.version, before + 1);
        assert!(snapshot.consistent);
        assert_eq!(snapshot.value, pos(5, 5, 7));
    }

    #[test]
    fn test_unread_property_has_default_value() {
        let store = test_store();
        let snapshot = store.get("playerPos").unwrap();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.value, pos(0, 0, 0));
    }

    #[test]
    fn test_unknown_property() {
        let store = test_store();
        assert!(matches!(
            store.get("nope"),
            Err(StateBusError::UnknownProperty(_))
        ));
        assert!(matches!(
            store.set("nope", &pos(1, 2, 3)),
            Err(StateBusError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_ring_buffer_is_not_a_store_property() {
        let store = test_store();
        assert!(store.get("ring").is_err());
        assert!(store.version("ring").is_err());
    }

    #[test]
    fn test_rejected_write_leaves_version_untouched() {
        let store = test_store();
        let bad = PropertyValue::Struct(Record::new().with("w", 1));
        assert!(store.set("playerPos", &bad).is_err());
        assert_eq!(store.version("playerPos").unwrap(), 0);
    }

    #[test]
    fn test_truncation_reported() {
        let store = test_store();
        let records = (0..3u32).map(|i| Record::new().with("id", i)).collect();
        let outcome = store.set("targets", &PropertyValue::Array(records)).unwrap();
        assert_eq!(outcome.truncated, 1);
        assert_eq!(
            store.get("targets").unwrap().value.as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn test_set_many_and_get_many() {
        let store = test_store();
        let path = PathValue {
            status: PathStatus::Found,
            waypoints: vec![Waypoint::new(1, 2, 3)],
            ..Default::default()
        };

        let outcomes = store
            .set_many(&[
                ("playerPos", pos(1, 2, 3)),
                ("currentPath", PropertyValue::Path(path.clone())),
            ])
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.version == 1));

        let batch = store.get_many(&["playerPos", "currentPath"]).unwrap();
        assert!(batch.consistent);
        assert_eq!(batch.get("playerPos").unwrap().value, pos(1, 2, 3));
        assert_eq!(
            batch.get("currentPath").unwrap().value,
            PropertyValue::Path(path)
        );
    }

    #[test]
    fn test_set_many_validates_before_writing() {
        let store = test_store();
        let result = store.set_many(&[
            ("playerPos", pos(1, 1, 1)),
            ("targets", pos(0, 0, 0)),
        ]);
        assert!(result.is_err());
        assert_eq!(store.version("playerPos").unwrap(), 0);

        let duplicate = store.set_many(&[("playerPos", pos(1, 1, 1)), ("playerPos", pos(2, 2, 2))]);
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_changed_since() {
        let store = test_store();
        let v = store.version("playerPos").unwrap();
        assert!(!store.changed_since("playerPos", v).unwrap());
        store.set("playerPos", &pos(1, 1, 1)).unwrap();
        assert!(store.changed_since("playerPos", v).unwrap());
    }

    #[test]
    fn test_stuck_writer_yields_inconsistent_snapshot() {
        let store = test_store();
        let lane = store
            .segment()
            .schema()
            .descriptor("playerPos")
            .unwrap()
            .version_lane()
            .unwrap();

        // Simulate a writer that died mid-write
        store.segment().fetch_or(lane, VERSION_BUSY_BIT);

        let snapshot = store.get("playerPos").unwrap();
        assert!(!snapshot.consistent);
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn test_wait_for_change() {
        let store = test_store();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.set("playerPos", &pos(9, 9, 9)).unwrap();
            })
        };

        assert!(store
            .wait_for_change("playerPos", 0, Duration::from_secs(5))
            .unwrap());
        writer.join().unwrap();

        assert!(!store
            .wait_for_change("playerPos", 1, Duration::from_millis(10))
            .unwrap());
    }
}
