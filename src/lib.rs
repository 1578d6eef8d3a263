//! # statebus-rs: shared-memory coordination for automation workers
//!
//! A background game-automation client runs several independently scheduled
//! workers (capture, UI-region detection, text recognition, localization,
//! path search, target selection). They share one continuously updated view
//! of game state through a single segment of 32-bit atomic lanes.
//!
//! ## Architecture
//!
//! - **Schema**: property declarations compiled once into a flat lane layout
//! - **Segment**: the atomic lanes, wait/notify, the capture sync block and
//!   the double-buffered image area
//! - **Store**: typed versioned reads and writes over the segment
//! - **Channel**: a spin-locked ring buffer for urgent worker-to-worker events
//! - **Capture**: the frame producer and per-worker frame consumers
//! - **Scan gate**: per-consumer dirty-rectangle policy (partial vs. full scan)
//! - **Worker**: explicit per-worker context and the polling run loop
//!
//! ## Configuration
//!
//! [`BusConfig`] is loaded from TOML or JSON. The default file lives in the
//! platform config directory under `statebus-rs/config.toml`.
//!
//! ## Example
//!
//! ```ignore
//! use statebus_rs::{
//!     BusConfig, FrameProducer, SchemaCompiler, SharedSegment, SharedStateStore,
//!     SyntheticCapture,
//! };
//! use std::sync::Arc;
//!
//! let config = BusConfig::load_or_default(BusConfig::default_path());
//! let schema = SchemaCompiler::compile(&config.schema_decls())?;
//! let segment = Arc::new(SharedSegment::new(schema, config.capture.frame_limits()));
//!
//! let mut producer = FrameProducer::new(
//!     segment.clone(),
//!     Box::new(SyntheticCapture::new(640, 360)),
//!     config.capture.clone(),
//! );
//! std::thread::spawn(move || producer.run());
//!
//! let store = SharedStateStore::new(segment, &config.store);
//! let pos = store.get("playerPos")?;
//! ```

pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod scan_gate;
pub mod schema;
pub mod segment;
pub mod store;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use capture::{CaptureSource, FrameConsumer, FrameProducer, SyntheticCapture};
pub use channel::{Command, ControlChannel, Message, Payload, BROADCAST};
pub use config::BusConfig;
pub use error::{Result, StateBusError};
pub use scan_gate::{ScanDecision, ScanGate};
pub use schema::{CompiledSchema, PropertyDecl, SchemaCompiler};
pub use segment::SharedSegment;
pub use store::{PropertyValue, Record, SharedStateStore, Snapshot};
pub use types::Rect;
pub use worker::{OrchestratorMessage, Worker, WorkerContext, WorkerRunner};
